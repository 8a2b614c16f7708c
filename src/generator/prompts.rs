//! Prompt 模板库：每种任务一份只读模板，运行期只做封闭占位符替换与上下文拼接

use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::roles::RoleKind;
use super::types::TaskKind;

/// 模型输出中期望出现的字段
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// 启发式解析时用于识别章节标题的关键词（小写、无重音）
    pub header_keywords: &'static [&'static str],
    pub description: &'static str,
}

/// 从前序结果中选取的内容
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selector {
    /// 前序节点的完整文本
    Whole,
    /// 前序节点的某个字段
    Field(&'static str),
}

/// 显式声明的上下文依赖：(前序任务, 字段) 对，渲染时按声明顺序解析
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextBinding {
    pub source: TaskKind,
    pub label: &'static str,
    pub selector: Selector,
    /// 前序任务未被构建时（如关闭翻译）跳过该绑定
    pub optional: bool,
}

impl ContextBinding {
    const fn whole(source: TaskKind, label: &'static str) -> Self {
        Self {
            source,
            label,
            selector: Selector::Whole,
            optional: false,
        }
    }

    const fn field(source: TaskKind, label: &'static str, name: &'static str) -> Self {
        Self {
            source,
            label,
            selector: Selector::Field(name),
            optional: false,
        }
    }
}

/// 渲染时可替换的运行参数，只有这四个占位符
#[derive(Debug, Clone, Copy)]
pub struct RenderParams<'a> {
    pub query: &'a str,
    pub max_results: usize,
    pub audience: &'a str,
    pub language: &'a str,
}

impl RenderParams<'_> {
    /// 单遍替换：替换进来的值中若含占位符，保持原样
    pub fn substitute(&self, text: &str) -> String {
        static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"\{(query|max_results|audience|language)\}").expect("valid regex")
        });

        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures<'_>| match &caps[1] {
                "query" => self.query.to_string(),
                "max_results" => self.max_results.to_string(),
                "audience" => self.audience.to_string(),
                _ => self.language.to_string(),
            })
            .into_owned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub task: TaskKind,
    pub role: RoleKind,
    pub opening_instruction: &'static str,
    pub instructions: &'static [&'static str],
    pub constraints: &'static [&'static str],
    pub expected_output: &'static str,
    pub output_fields: &'static [FieldSpec],
    pub context: &'static [ContextBinding],
}

impl PromptTemplate {
    pub fn field_names(&self) -> Vec<&'static str> {
        self.output_fields.iter().map(|f| f.name).collect()
    }

    /// 渲染完整指令
    ///
    /// `context` 为已解析的 (标签, 文本) 对，原样拼接，不做占位符替换。
    pub fn render(&self, params: &RenderParams<'_>, context: &[(&str, &str)]) -> String {
        let mut prompt = String::new();

        prompt.push_str(&params.substitute(self.opening_instruction));
        prompt.push_str("\n\n");

        if !context.is_empty() {
            prompt.push_str("## Research material\n");
            for (label, text) in context {
                prompt.push_str(&format!("### {}\n{}\n\n", label, text.trim()));
            }
        }

        if !self.instructions.is_empty() {
            prompt.push_str("## Instructions\n");
            for (i, line) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, params.substitute(line)));
            }
            prompt.push('\n');
        }

        if !self.constraints.is_empty() {
            prompt.push_str("## Constraints\n");
            for line in self.constraints {
                prompt.push_str(&format!("- {}\n", params.substitute(line)));
            }
            prompt.push('\n');
        }

        prompt.push_str("## Expected output\n");
        prompt.push_str(&params.substitute(self.expected_output));
        prompt.push_str("\nReply with a fenced ```json block containing exactly these keys:\n```json\n{\n");
        let keys = self
            .output_fields
            .iter()
            .map(|f| format!("  \"{}\": \"{}\"", f.name, params.substitute(f.description)))
            .collect::<Vec<_>>()
            .join(",\n");
        prompt.push_str(&keys);
        prompt.push_str("\n}\n```\n");

        prompt
    }
}

const PARSE_QUERY_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "search_query",
        header_keywords: &["search_query", "search query", "optimized query"],
        description: "Optimized arXiv query, in English",
    },
    FieldSpec {
        name: "keywords",
        header_keywords: &["keywords", "key words", "mots-cles"],
        description: "Comma-separated list of the key terms",
    },
    FieldSpec {
        name: "context",
        header_keywords: &["context", "intent"],
        description: "Short description of the research context and intent",
    },
];

const SEARCH_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "search_query",
    header_keywords: &["search_query", "search query", "broadened query", "query"],
    description: "A broader arXiv query, in English",
}];

const ANALYZE_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "paper_analyses",
    header_keywords: &["paper_analyses", "paper analyses", "analyses", "analysis"],
    description: "One entry per paper with arxiv_id, key_points, methodology, main_findings, relevance (1-10) and limitations",
}];

const SUMMARIZE_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "summary_text",
    header_keywords: &["summary", "resume"],
    description: "Summary of the main concepts and findings",
}];

const SYNTHESIZE_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "synthesis_text",
    header_keywords: &["synthesis", "synthese"],
    description: "Comparative synthesis of the approaches and solutions",
}];

const ANSWER_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "answer_text",
    header_keywords: &["answer", "reponse"],
    description: "Your pedagogical answer to the question, in {language}",
}];

const TRANSLATE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "summary_translated",
        header_keywords: &["summary", "resume"],
        description: "{language} version of the summary",
    },
    FieldSpec {
        name: "synthesis_translated",
        header_keywords: &["synthesis", "synthese"],
        description: "{language} version of the comparative synthesis",
    },
];

const FORMAT_FINAL_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "contributions",
    header_keywords: &["contributions", "contribution"],
    description: "Object mapping each arXiv id to a one-line note on the paper's main contribution, in {language}",
}];

const SEARCH_CONTEXT: &[ContextBinding] =
    &[ContextBinding::whole(TaskKind::ParseQuery, "Query analysis")];

const ANALYZE_CONTEXT: &[ContextBinding] =
    &[ContextBinding::whole(TaskKind::Search, "Papers found")];

const SUMMARIZE_CONTEXT: &[ContextBinding] = &[
    ContextBinding::whole(TaskKind::Search, "Papers found"),
    ContextBinding::field(TaskKind::Analyze, "Paper analyses", "paper_analyses"),
    ContextBinding::field(TaskKind::ParseQuery, "Research context", "context"),
];

const SYNTHESIZE_CONTEXT: &[ContextBinding] = &[
    ContextBinding::field(TaskKind::Summarize, "Simplified summary", "summary_text"),
    ContextBinding::field(TaskKind::Analyze, "Paper analyses", "paper_analyses"),
    ContextBinding::whole(TaskKind::Search, "Papers found"),
];

const ANSWER_CONTEXT: &[ContextBinding] = &[
    ContextBinding::field(TaskKind::ParseQuery, "Research context", "context"),
    ContextBinding::field(TaskKind::Analyze, "Paper analyses", "paper_analyses"),
    ContextBinding::field(TaskKind::Summarize, "Simplified summary", "summary_text"),
    ContextBinding::field(TaskKind::Synthesize, "Comparative synthesis", "synthesis_text"),
];

const TRANSLATE_CONTEXT: &[ContextBinding] = &[
    ContextBinding::field(TaskKind::Summarize, "Simplified summary", "summary_text"),
    ContextBinding::field(TaskKind::Synthesize, "Comparative synthesis", "synthesis_text"),
];

const FORMAT_FINAL_CONTEXT: &[ContextBinding] = &[
    ContextBinding::whole(TaskKind::Search, "Papers found"),
    ContextBinding::field(TaskKind::Summarize, "Summary", "summary_text"),
    ContextBinding::field(TaskKind::Synthesize, "Synthesis", "synthesis_text"),
    ContextBinding {
        source: TaskKind::Translate,
        label: "Translation",
        selector: Selector::Whole,
        optional: true,
    },
    ContextBinding::field(TaskKind::AnswerDirectly, "Pedagogical answer", "answer_text"),
];

fn builtin_template(task: TaskKind) -> PromptTemplate {
    match task {
        TaskKind::ParseQuery => PromptTemplate {
            task,
            role: RoleKind::QueryParser,
            opening_instruction: "Analyse this natural-language research question: \"{query}\"",
            instructions: &[
                "Identify the key scientific concepts and technical terms",
                "Extract the relations between these concepts",
                "Write an optimized search query for arXiv",
                "Use boolean operators (AND, OR) where appropriate",
                "Translate the query into English if it is not already in English",
            ],
            constraints: &[
                "The query must be precise and focused",
                "Prefer specific technical terms over general words",
                "Limit the query to 3-5 key terms or concepts",
                "Do not use quotes unless an exact phrase is required",
            ],
            expected_output: "An optimized arXiv search query.",
            output_fields: PARSE_QUERY_FIELDS,
            context: &[],
        },
        TaskKind::Search => PromptTemplate {
            task,
            role: RoleKind::Searcher,
            opening_instruction: "Search arXiv for papers answering the question \"{query}\", using the optimized query below.",
            instructions: &[
                "Use the optimized query to find papers on arXiv",
                "Keep the {max_results} most relevant papers",
                "If fewer than 3 relevant papers are found, propose a slightly broader query",
                "Check that the papers are really relevant to the original question",
            ],
            constraints: &[
                "Papers should cover different aspects of the question when possible",
                "Avoid papers that are too similar to each other",
            ],
            expected_output: "A search query for arXiv.",
            output_fields: SEARCH_FIELDS,
            context: SEARCH_CONTEXT,
        },
        TaskKind::Analyze => PromptTemplate {
            task,
            role: RoleKind::Analyzer,
            opening_instruction: "Analyse in depth each of the scientific papers found for the question \"{query}\".",
            instructions: &[
                "Analyse the abstract of each paper",
                "Identify the key points, methodologies and main results",
                "Rate the relevance of each paper to the original question from 1 to 10",
                "Identify specific concepts and notable contributions",
                "Note any limitations mentioned in the abstracts",
            ],
            constraints: &[
                "Stay factual and objective",
                "Focus on scientific and technical aspects",
                "Keep a critical but balanced perspective",
            ],
            expected_output: "A detailed analysis of each paper.",
            output_fields: ANALYZE_FIELDS,
            context: ANALYZE_CONTEXT,
        },
        TaskKind::Summarize => PromptTemplate {
            task,
            role: RoleKind::Summarizer,
            opening_instruction: "Write a simplified summary of the main concepts and findings of the analysed papers for the question \"{query}\".",
            instructions: &[
                "Condense the essential information of the papers into 5-7 key points",
                "Identify the main concepts that appear in several papers",
                "Explain the major findings or advances",
                "Adapt your explanation for {audience}",
                "Organise the information clearly and progressively",
            ],
            constraints: &[
                "Avoid specialised jargon unless the reader is a domain specialist",
                "Use analogies or examples when they help",
                "Do not exceed 300-400 words",
                "Stay factual and precise, even when simplifying",
            ],
            expected_output: "A simplified summary of the concepts and findings, in English.",
            output_fields: SUMMARIZE_FIELDS,
            context: SUMMARIZE_CONTEXT,
        },
        TaskKind::Synthesize => PromptTemplate {
            task,
            role: RoleKind::Synthesizer,
            opening_instruction: "Write a comparative synthesis of the approaches and solutions presented in the papers found for the question \"{query}\".",
            instructions: &[
                "Compare the methodological approaches of the papers",
                "Identify points of agreement and disagreement between them",
                "Highlight emerging trends in this research area",
                "Assess how the approaches evolved if the papers span different periods",
                "Adapt your analysis for {audience}",
            ],
            constraints: &[
                "Keep a balanced and objective perspective",
                "Stay grounded in the content of the papers",
                "Limit the synthesis to 250-350 words",
                "Do not draw conclusions beyond what the papers present",
            ],
            expected_output: "A comparative synthesis of the approaches and solutions, in English.",
            output_fields: SYNTHESIZE_FIELDS,
            context: SYNTHESIZE_CONTEXT,
        },
        TaskKind::AnswerDirectly => PromptTemplate {
            task,
            role: RoleKind::Professor,
            opening_instruction: "Answer the question \"{query}\" directly and pedagogically.",
            instructions: &[
                "Write a clear, direct and precise answer to the question",
                "Explain the fundamental concepts in an accessible way",
                "Illustrate with concrete examples or analogies when relevant",
                "Structure the answer with an opening, a development and a conclusion",
                "Adapt your language for {audience}",
            ],
            constraints: &[
                "Open with the direct answer to the question before any elaboration",
                "Keep the answer to roughly 300-500 words",
                "Avoid excessive jargon and explain technical terms when needed",
                "Stay scientifically rigorous while remaining accessible",
                "Write in {language}",
            ],
            expected_output: "A pedagogical answer to the user's question.",
            output_fields: ANSWER_FIELDS,
            context: ANSWER_CONTEXT,
        },
        TaskKind::Translate => PromptTemplate {
            task,
            role: RoleKind::Translator,
            opening_instruction: "Translate the summary and the synthesis below into {language} and adapt them to the requested level.",
            instructions: &[
                "Translate the content faithfully into {language}",
                "Adapt the language and the depth of explanation for {audience}",
                "Make sure the scientific terminology is translated correctly",
                "Keep all the important information of the original",
                "Keep the structure and organisation of the information",
            ],
            constraints: &[
                "Avoid word-for-word translations that hurt understanding",
                "Adapt idiomatic expressions to the target language",
                "Keep the original English technical terms in parentheses where useful",
                "The text must read fluently and naturally",
            ],
            expected_output: "The {language} translation of the summary and of the synthesis.",
            output_fields: TRANSLATE_FIELDS,
            context: TRANSLATE_CONTEXT,
        },
        TaskKind::FormatFinal => PromptTemplate {
            task,
            role: RoleKind::Summarizer,
            opening_instruction: "Prepare the recommended-papers list of the final report for the question \"{query}\".",
            instructions: &[
                "For each paper found, write one line summarising its main contribution",
                "Base each line on the paper's abstract and on the analyses",
                "Write the lines in {language}",
            ],
            constraints: &[
                "One sentence per paper, at most 30 words",
                "Use the arXiv ids exactly as given in the paper list",
                "Do not add any preamble such as \"## Final Answer:\"",
            ],
            expected_output: "A one-line contribution note for each paper.",
            output_fields: FORMAT_FINAL_FIELDS,
            context: FORMAT_FINAL_CONTEXT,
        },
    }
}

/// 按任务类型索引的模板表，加载后只读，可在并发运行间通过 `Arc` 共享
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplateStore {
    templates: [PromptTemplate; 8],
}

impl Default for PromptTemplateStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptTemplateStore {
    pub fn builtin() -> Self {
        Self {
            templates: std::array::from_fn(|i| builtin_template(TaskKind::ALL[i])),
        }
    }

    pub fn get(&self, task: TaskKind) -> &PromptTemplate {
        &self.templates[task.index()]
    }
}
