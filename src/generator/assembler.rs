//! 最终文档组装，纯函数：相同输入总是得到逐字节相同的输出

use crate::arxiv::PaperRecord;
use crate::i18n::DocumentLabels;

/// 推荐论文列表的硬上限
pub const MAX_LISTED_PAPERS: usize = 5;

const SECTION_RULE: &str = "---";

/// 推荐列表中的一篇论文及其一行贡献说明
#[derive(Debug, Clone, PartialEq)]
pub struct PaperEntry<'a> {
    pub paper: &'a PaperRecord,
    pub contribution: &'a str,
}

/// 翻译后的摘要与综述；单个字段缺失时回退到原文
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TranslatedSections<'a> {
    pub summary: Option<&'a str>,
    pub synthesis: Option<&'a str>,
}

/// 组装输入；`None` 表示对应章节未能生成，输出占位说明而不是省略章节
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyInput<'a> {
    pub query: &'a str,
    pub direct_answer: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub papers: &'a [PaperEntry<'a>],
    pub synthesis: Option<&'a str>,
    /// 仅在请求翻译且翻译成功时提供
    pub translated: Option<TranslatedSections<'a>>,
    pub labels: DocumentLabels,
    pub max_results: usize,
}

pub fn assemble(input: &AssemblyInput<'_>) -> String {
    let labels = &input.labels;
    let translated = input.translated.unwrap_or_default();
    let summary = translated.summary.or(input.summary);
    let synthesis = translated.synthesis.or(input.synthesis);

    let sections = [
        format!("### {} :\n*{}*", labels.result, input.query.trim()),
        section("⚡", labels.answer, input.direct_answer, labels),
        section("🔍", labels.summary, summary, labels),
        paper_section(input),
        section("🧠", labels.synthesis, synthesis, labels),
    ];

    let mut document = sections.join(&format!("\n\n{}\n\n", SECTION_RULE));
    document.push('\n');
    document
}

fn section(emoji: &str, title: &str, body: Option<&str>, labels: &DocumentLabels) -> String {
    let body = match body.map(str::trim).filter(|b| !b.is_empty()) {
        Some(text) => text.to_string(),
        None => unavailable(labels),
    };
    format!("#### {} {} :\n{}", emoji, title, body)
}

fn unavailable(labels: &DocumentLabels) -> String {
    format!("> ⚠️ *{}.*", labels.unavailable)
}

fn paper_section(input: &AssemblyInput<'_>) -> String {
    let limit = input.max_results.min(MAX_LISTED_PAPERS);
    let heading = format!("#### 📚 {} :", input.labels.papers);

    if input.papers.is_empty() || limit == 0 {
        return format!("{}\n{}", heading, unavailable(&input.labels));
    }

    let entries = input
        .papers
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, entry)| paper_entry(i + 1, entry))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{}", heading, entries)
}

fn paper_entry(position: usize, entry: &PaperEntry<'_>) -> String {
    let paper = entry.paper;
    let mut lines = vec![
        format!("{}. **{}**", position, paper.title),
        format!("   *{}*", paper.short_authors()),
        format!("   🔗 [{}]({})", paper.url, paper.url),
    ];
    let contribution = entry.contribution.trim();
    if !contribution.is_empty() {
        lines.push(format!("   {}", contribution));
    }
    lines.join("\n")
}
