//! 任务流水线引擎：按固定顺序构建任务节点，逐个执行并向后传递上下文

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::arxiv::{PaperRecord, normalize_paper_id, relax_query};
use crate::generator::assembler::{
    AssemblyInput, MAX_LISTED_PAPERS, PaperEntry, TranslatedSections, assemble,
};
use crate::generator::context::PipelineContext;
use crate::generator::extractor::extract;
use crate::generator::prompts::{PromptTemplate, RenderParams, Selector};
use crate::generator::roles::RoleKind;
use crate::generator::types::{PipelineError, RunOptions, StageResult, TaskKind};
use crate::generator::workflow::TimingScope;
use crate::memory::RunSummary;
use crate::utils::text::{clean_text, strip_final_answer};

/// search 阶段输出的字段
pub const SEARCH_STAGE_FIELDS: &[&str] = &["papers", "search_query", "paper_count"];

/// format-final 阶段输出的字段
pub const FORMAT_FINAL_STAGE_FIELDS: &[&str] = &["contributions", "document"];

/// 兜底贡献说明（摘要首句）的最大长度
const FALLBACK_NOTE_CHARS: usize = 200;

/// 模型给出的放宽查询超过该长度时视为无效
const MAX_BROADENED_QUERY_CHARS: usize = 200;

/// 流水线中的一个任务节点
///
/// 结果槽只能写入一次；所有声明的前序节点都有结果之后才能执行。
#[derive(Debug)]
pub struct TaskNode {
    pub kind: TaskKind,
    pub role: RoleKind,
    pub predecessors: Vec<TaskKind>,
    instruction: OnceLock<String>,
    result: OnceLock<StageResult>,
}

impl TaskNode {
    fn new(kind: TaskKind, role: RoleKind, predecessors: Vec<TaskKind>) -> Self {
        Self {
            kind,
            role,
            predecessors,
            instruction: OnceLock::new(),
            result: OnceLock::new(),
        }
    }

    /// 执行时渲染出的完整指令
    pub fn instruction(&self) -> Option<&str> {
        self.instruction.get().map(String::as_str)
    }

    pub fn result(&self) -> Option<&StageResult> {
        self.result.get()
    }

    fn record_instruction(&self, instruction: String) -> &str {
        self.instruction.get_or_init(|| instruction)
    }

    fn set_result(&self, result: StageResult) -> Result<(), PipelineError> {
        self.result
            .set(result)
            .map_err(|_| PipelineError::ResultAlreadySet(self.kind))
    }
}

/// 单次运行的全部状态，只属于发起它的那次调用
#[derive(Debug)]
pub struct PipelineRun {
    pub query: String,
    pub options: RunOptions,
    pub nodes: Vec<TaskNode>,
    papers: Vec<PaperRecord>,
    timing: TimingScope,
}

impl PipelineRun {
    pub fn node(&self, kind: TaskKind) -> Option<&TaskNode> {
        self.nodes.iter().find(|node| node.kind == kind)
    }

    pub fn result(&self, kind: TaskKind) -> Option<&StageResult> {
        self.node(kind).and_then(TaskNode::result)
    }

    /// search 阶段取回的论文
    pub fn papers(&self) -> &[PaperRecord] {
        &self.papers
    }

    /// format-final 阶段组装出的文档
    pub fn document(&self) -> Option<&str> {
        self.result(TaskKind::FormatFinal)
            .map(|result| result.field("document"))
    }

    pub fn timing(&self) -> &TimingScope {
        &self.timing
    }

    fn ensure_ready(&self, node: &TaskNode) -> Result<(), PipelineError> {
        for predecessor in &node.predecessors {
            if self.result(*predecessor).is_none() {
                return Err(PipelineError::MissingPredecessor {
                    node: node.kind,
                    predecessor: *predecessor,
                });
            }
        }
        Ok(())
    }

    /// 按声明顺序解析模板的上下文绑定
    fn resolve_context(
        &self,
        template: &PromptTemplate,
    ) -> Result<Vec<(&str, &str)>, PipelineError> {
        let mut resolved = Vec::with_capacity(template.context.len());
        for binding in template.context {
            let missing = PipelineError::MissingPredecessor {
                node: template.task,
                predecessor: binding.source,
            };
            let Some(node) = self.node(binding.source) else {
                if binding.optional {
                    continue;
                }
                return Err(missing);
            };
            let result = node.result().ok_or(missing)?;
            // 降级结果只有占位文本，不向后传递
            if result.degraded {
                debug!("跳过降级的上下文来源: {}", binding.source);
                continue;
            }
            let text = match binding.selector {
                Selector::Whole => result.raw.as_str(),
                Selector::Field(name) => {
                    let value = result.field(name);
                    if value.trim().is_empty() {
                        result.raw.as_str()
                    } else {
                        value
                    }
                }
            };
            resolved.push((binding.label, text));
        }
        Ok(resolved)
    }
}

/// 单个节点的执行产出
struct StageOutcome {
    result: StageResult,
    papers: Option<Vec<PaperRecord>>,
}

impl From<StageResult> for StageOutcome {
    fn from(result: StageResult) -> Self {
        Self {
            result,
            papers: None,
        }
    }
}

/// 流水线引擎
///
/// 引擎本身无可变状态，可以被多个并发运行共享。
#[derive(Clone)]
pub struct PipelineEngine {
    context: PipelineContext,
}

impl PipelineEngine {
    pub fn new(context: PipelineContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// 构建任务链：固定顺序，翻译节点仅在需要时加入
    pub fn build(&self, query: &str, options: RunOptions) -> PipelineRun {
        let kinds: Vec<TaskKind> = TaskKind::ALL
            .into_iter()
            .filter(|kind| *kind != TaskKind::Translate || options.translate)
            .collect();

        let nodes = kinds
            .iter()
            .map(|&kind| {
                let template = self.context.prompts.get(kind);
                let mut predecessors: Vec<TaskKind> = Vec::new();
                for binding in template.context {
                    if kinds.contains(&binding.source) && !predecessors.contains(&binding.source)
                    {
                        predecessors.push(binding.source);
                    }
                }
                TaskNode::new(kind, template.role, predecessors)
            })
            .collect();

        PipelineRun {
            query: query.trim().to_string(),
            options,
            nodes,
            papers: Vec::new(),
            timing: TimingScope::new(),
        }
    }

    /// 执行一次完整运行
    pub async fn run(&self, query: &str, options: RunOptions) -> Result<PipelineRun, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidOptions("query is empty".to_string()));
        }
        if options.max_results == 0 {
            return Err(PipelineError::InvalidOptions(
                "max_results must be greater than 0".to_string(),
            ));
        }

        let mut run = self.build(query, options);
        let total = run.nodes.len();
        info!(
            "🚀 开始处理问题: \"{}\" (max_results={}, level={}, translate={})",
            run.query, run.options.max_results, run.options.level, run.options.translate
        );

        for index in 0..total {
            let kind = run.nodes[index].kind;
            run.ensure_ready(&run.nodes[index])?;

            info!("🤖 [{}/{}] 执行任务: {}", index + 1, total, kind);
            run.timing.start_phase(kind.key());
            let outcome = self.execute(&run, &run.nodes[index]).await?;
            if let Some(papers) = outcome.papers {
                run.papers = papers;
            }
            run.nodes[index].set_result(outcome.result)?;
            if let Some(duration) = run.timing.end_phase(kind.key()) {
                debug!("✅ 任务 {} 完成，耗时 {:.2}s", kind, duration.as_secs_f64());
            }
        }

        info!("⏱️ 运行结束\n{}", run.timing.generate_timing_report());
        self.remember(&run).await;
        Ok(run)
    }

    async fn execute(&self, run: &PipelineRun, node: &TaskNode) -> Result<StageOutcome, PipelineError> {
        match node.kind {
            TaskKind::ParseQuery => self.parse_query(run, node).await.map(Into::into),
            TaskKind::Search => self.search(run, node).await,
            TaskKind::FormatFinal => self.format_final(run, node).await.map(Into::into),
            _ => self.generate(run, node).await.map(Into::into),
        }
    }

    fn render(
        &self,
        run: &PipelineRun,
        kind: TaskKind,
        extra: &[(&str, &str)],
    ) -> Result<String, PipelineError> {
        let template = self.context.prompts.get(kind);
        let mut context = run.resolve_context(template)?;
        context.extend_from_slice(extra);

        let params = RenderParams {
            query: &run.query,
            max_results: run.options.max_results,
            audience: run.options.level.audience(),
            language: run.options.output_language().english_name(),
        };
        Ok(template.render(&params, &context))
    }

    async fn call_model(&self, role: RoleKind, prompt: &str) -> anyhow::Result<String> {
        let persona = self.context.roles.persona(role).preamble();
        let llm = &self.context.config.llm;
        self.context
            .backend
            .complete(prompt, &persona, llm.temperature, llm.max_tokens)
            .await
    }

    async fn parse_query(&self, run: &PipelineRun, node: &TaskNode) -> Result<StageResult, PipelineError> {
        let template = self.context.prompts.get(node.kind);
        let recalled = self.recall(&run.query).await;
        let recalled_text = recalled.join("\n");
        let extra: Vec<(&str, &str)> = if recalled.is_empty() {
            Vec::new()
        } else {
            vec![("Related previous research", recalled_text.as_str())]
        };

        let prompt = node.record_instruction(self.render(run, node.kind, &extra)?);
        let raw = match self.call_model(node.role, prompt).await {
            Ok(raw) => raw,
            Err(e) => return model_failure(node.kind, &template.field_names(), e),
        };

        let mut result = extract(&raw, template.output_fields);
        if result.field("search_query").trim().is_empty() {
            warn!("⚠️ 未能从模型输出中提取检索式，直接使用原始问题");
            result
                .fields
                .insert("search_query".to_string(), run.query.clone());
            result.primary_text = run.query.clone();
        }
        info!("🧭 优化后的检索式: {}", result.field("search_query"));
        Ok(result)
    }

    async fn search(&self, run: &PipelineRun, node: &TaskNode) -> Result<StageOutcome, PipelineError> {
        let prompt = node.record_instruction(self.render(run, node.kind, &[])?);
        let parsed = run
            .result(TaskKind::ParseQuery)
            .ok_or(PipelineError::MissingPredecessor {
                node: node.kind,
                predecessor: TaskKind::ParseQuery,
            })?;

        let search_query = match parsed.field("search_query").trim() {
            "" => run.query.as_str(),
            q => q,
        };
        let keywords: Vec<String> = parsed
            .field("keywords")
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let max_results = run.options.max_results;
        let categories = &self.context.config.arxiv.categories;
        let wanted = self
            .context
            .config
            .arxiv
            .min_relevant_results
            .min(max_results);

        info!("🔍 检索 arXiv: {}", search_query);
        let mut papers = merge_unique(
            Vec::new(),
            self.context
                .repository
                .search(search_query, max_results, categories)
                .await,
            max_results,
        );
        let mut used_query = search_query.to_string();

        if papers.len() < wanted {
            warn!(
                "⚠️ 仅找到 {} 篇相关论文（期望至少 {} 篇），放宽检索条件后重试一次",
                papers.len(),
                wanted
            );
            match self
                .broaden_query(run, node, prompt, search_query, &keywords, papers.len())
                .await
            {
                Some(broadened) => {
                    info!("🔁 使用放宽后的检索式重试: {}", broadened);
                    let more = self
                        .context
                        .repository
                        .search(&broadened, max_results, categories)
                        .await;
                    papers = merge_unique(papers, more, max_results);
                    used_query = broadened;
                }
                None => warn!("⚠️ 无法构造不同的检索式，跳过重试"),
            }
        }

        if papers.is_empty() {
            return Err(PipelineError::NoPapersFound {
                query: run.query.clone(),
            });
        }
        info!("📚 共获得 {} 篇论文", papers.len());

        let mut fields = BTreeMap::new();
        fields.insert(
            "papers".to_string(),
            serde_json::to_string_pretty(&papers).unwrap_or_default(),
        );
        fields.insert("search_query".to_string(), used_query);
        fields.insert("paper_count".to_string(), papers.len().to_string());
        let result = StageResult::from_fields(fields, SEARCH_STAGE_FIELDS, format_paper_listing(&papers));

        Ok(StageOutcome {
            result,
            papers: Some(papers),
        })
    }

    /// 放宽查询：先请检索角色给出更宽泛的检索式，失败时按规则放宽，最后退回原始问题
    async fn broaden_query(
        &self,
        run: &PipelineRun,
        node: &TaskNode,
        search_prompt: &str,
        current: &str,
        keywords: &[String],
        found: usize,
    ) -> Option<String> {
        let template = self.context.prompts.get(node.kind);
        let prompt = format!(
            "{}\n## Retry\nThe query `{}` returned only {} paper(s). Propose a broader arXiv query \
             that keeps the intent of the question: drop the least essential terms and prefer OR \
             between alternative terms.\n",
            search_prompt, current, found
        );

        match self.call_model(node.role, &prompt).await {
            Ok(raw) => {
                let extracted = extract(&raw, template.output_fields);
                let candidate = extracted.field("search_query").trim();
                if !candidate.is_empty()
                    && candidate != current
                    && !candidate.contains('\n')
                    && candidate.chars().count() <= MAX_BROADENED_QUERY_CHARS
                {
                    return Some(candidate.to_string());
                }
                debug!("模型未给出可用的放宽检索式，改用规则放宽");
            }
            Err(e) => warn!("⚠️ 模型放宽检索式失败，改用规则放宽: {}", e),
        }

        relax_query(current, keywords).or_else(|| {
            let original = run.query.trim();
            (original != current).then(|| original.to_string())
        })
    }

    /// analyze / summarize / synthesize / answer-directly / translate 的通用执行
    async fn generate(&self, run: &PipelineRun, node: &TaskNode) -> Result<StageResult, PipelineError> {
        let template = self.context.prompts.get(node.kind);
        let prompt = node.record_instruction(self.render(run, node.kind, &[])?);

        match self.call_model(node.role, prompt).await {
            Ok(raw) => Ok(extract(&raw, template.output_fields)),
            Err(e) => model_failure(node.kind, &template.field_names(), e),
        }
    }

    async fn format_final(&self, run: &PipelineRun, node: &TaskNode) -> Result<StageResult, PipelineError> {
        let template = self.context.prompts.get(node.kind);
        let prompt = node.record_instruction(self.render(run, node.kind, &[])?);

        let (notes, degraded) = match self.call_model(node.role, prompt).await {
            Ok(raw) => {
                let extracted = extract(&raw, template.output_fields);
                (parse_contributions(extracted.field("contributions"), run.papers()), false)
            }
            Err(e) => {
                warn!("⚠️ 生成论文贡献说明失败，改用摘要首句: {}", e);
                (BTreeMap::new(), true)
            }
        };

        let listed = run.options.max_results.min(MAX_LISTED_PAPERS);
        let contributions: Vec<(&PaperRecord, String)> = run
            .papers()
            .iter()
            .take(listed)
            .map(|paper| {
                let note = notes
                    .get(&paper.id)
                    .map(|note| clean_text(note))
                    .filter(|note| !note.is_empty())
                    .unwrap_or_else(|| paper.first_sentence(FALLBACK_NOTE_CHARS));
                (paper, note)
            })
            .collect();
        let entries: Vec<PaperEntry> = contributions
            .iter()
            .map(|(paper, note)| PaperEntry {
                paper: *paper,
                contribution: note.as_str(),
            })
            .collect();

        let section = |kind: TaskKind, field: &str| {
            run.result(kind)
                .and_then(|result| result.usable_field(field))
                .map(|text| clean_text(strip_final_answer(text)))
                .filter(|text| !text.is_empty())
        };
        let answer = section(TaskKind::AnswerDirectly, "answer_text");
        let summary = section(TaskKind::Summarize, "summary_text");
        let synthesis = section(TaskKind::Synthesize, "synthesis_text");
        // 译文只替换源阶段成功的部分，源阶段降级时保留降级标记
        let translated_section = |source: &Option<String>, field: &str| {
            source
                .as_ref()
                .and_then(|_| section(TaskKind::Translate, field))
        };
        let summary_translated = translated_section(&summary, "summary_translated");
        let synthesis_translated = translated_section(&synthesis, "synthesis_translated");

        let translation_succeeded = run
            .result(TaskKind::Translate)
            .is_some_and(|result| !result.degraded);
        let translated = (run.options.translate && translation_succeeded).then(|| TranslatedSections {
            summary: summary_translated.as_deref(),
            synthesis: synthesis_translated.as_deref(),
        });

        let document = assemble(&AssemblyInput {
            query: &run.query,
            direct_answer: answer.as_deref(),
            summary: summary.as_deref(),
            papers: &entries,
            synthesis: synthesis.as_deref(),
            translated,
            labels: run.options.output_language().document_labels(),
            max_results: run.options.max_results,
        });

        let used_notes: BTreeMap<&str, &str> = contributions
            .iter()
            .map(|(paper, note)| (paper.id.as_str(), note.as_str()))
            .collect();
        let mut fields = BTreeMap::new();
        fields.insert(
            "contributions".to_string(),
            serde_json::to_string_pretty(&used_notes).unwrap_or_default(),
        );
        fields.insert("document".to_string(), document.clone());

        let mut result = StageResult::from_fields(fields, FORMAT_FINAL_STAGE_FIELDS, document);
        result.degraded = degraded;
        Ok(result)
    }

    async fn recall(&self, query: &str) -> Vec<String> {
        let Some(memory) = &self.context.memory else {
            return Vec::new();
        };
        let recalled = memory
            .recall(query, self.context.config.memory.recall_limit)
            .await;
        if !recalled.is_empty() {
            info!("🧠 召回 {} 条历史研究记录", recalled.len());
        }
        recalled
    }

    /// 运行成功后追加一条记忆，失败只记录日志
    async fn remember(&self, run: &PipelineRun) {
        let Some(memory) = &self.context.memory else {
            return;
        };
        let parsed = run.result(TaskKind::ParseQuery);
        let summary = RunSummary {
            query: run.query.clone(),
            search_query: run
                .result(TaskKind::Search)
                .map(|r| r.field("search_query").to_string())
                .unwrap_or_default(),
            keywords: parsed
                .map(|r| {
                    r.field("keywords")
                        .split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            paper_ids: run.papers().iter().map(|p| p.id.clone()).collect(),
            summary: run
                .result(TaskKind::Summarize)
                .and_then(|r| r.usable_field("summary_text"))
                .unwrap_or_default()
                .to_string(),
            recorded_at: Utc::now(),
        };
        memory.record(&summary).await;
    }
}

/// 模型调用失败：关键任务终止运行，其余任务以降级结果继续
fn model_failure(
    kind: TaskKind,
    declared: &[&str],
    error: anyhow::Error,
) -> Result<StageResult, PipelineError> {
    if kind.is_fatal_on_failure() {
        return Err(match kind {
            TaskKind::ParseQuery => PipelineError::QueryInterpretation(error.to_string()),
            _ => PipelineError::Retrieval(error.to_string()),
        });
    }
    warn!("⚠️ 任务 {} 调用模型失败，使用降级结果: {}", kind, error);
    Ok(StageResult::degraded(kind, declared))
}

/// 合并两次检索结果：保持先后顺序，按 ID 去重，截断到上限
fn merge_unique(
    mut papers: Vec<PaperRecord>,
    more: Vec<PaperRecord>,
    max_results: usize,
) -> Vec<PaperRecord> {
    for paper in more {
        if !papers.iter().any(|p| p.id == paper.id) {
            papers.push(paper);
        }
    }
    papers.truncate(max_results);
    papers
}

/// 供下游 prompt 使用的论文清单
pub fn format_paper_listing(papers: &[PaperRecord]) -> String {
    papers
        .iter()
        .enumerate()
        .map(|(i, paper)| {
            let published = paper
                .published
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "## Paper {}\nTitle: {}\nAuthors: {}\nPublished: {}\narXiv ID: {}\nURL: {}\nCategories: {}\n\nAbstract:\n{}\n",
                i + 1,
                paper.title,
                paper.short_authors(),
                published,
                paper.id,
                paper.url,
                paper.categories.join(", "),
                paper.abstract_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 解析贡献说明：优先按 JSON 对象解析，否则逐行查找包含论文 ID 的行
fn parse_contributions(text: &str, papers: &[PaperRecord]) -> BTreeMap<String, String> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        return map
            .into_iter()
            .filter_map(|(id, note)| {
                note.as_str()
                    .map(|note| (normalize_paper_id(&id), note.trim().to_string()))
            })
            .collect();
    }

    let mut notes = BTreeMap::new();
    for line in text.lines() {
        for paper in papers {
            if let Some(pos) = line.find(&paper.id) {
                let note = line[pos + paper.id.len()..]
                    .trim_start_matches(|c: char| {
                        c.is_whitespace() || matches!(c, ':' | '-' | '–' | '*' | '"' | ')' | ']')
                    })
                    .trim_end_matches(['"', ','])
                    .trim();
                if !note.is_empty() {
                    notes.entry(paper.id.clone()).or_insert_with(|| note.to_string());
                }
            }
        }
    }
    notes
}
