//! arXiv 论文检索客户端

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ArxivConfig;

mod atom;

pub use atom::parse_atom_feed;

/// 检索到的一篇论文，获取后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// arXiv ID（不含版本号），同一次检索内唯一
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published: Option<NaiveDate>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub categories: Vec<String>,
    /// 论文摘要页地址
    pub url: String,
    pub pdf_url: Option<String>,
}

impl PaperRecord {
    /// 作者简写：最多列出三位，超出部分以 "et al." 表示
    pub fn short_authors(&self) -> String {
        const SHOWN: usize = 3;
        if self.authors.is_empty() {
            return "Unknown authors".to_string();
        }
        let shown = self
            .authors
            .iter()
            .take(SHOWN)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if self.authors.len() > SHOWN {
            format!("{} et al.", shown)
        } else {
            shown
        }
    }

    /// 摘要的首句，用作兜底的贡献说明
    pub fn first_sentence(&self, max_chars: usize) -> String {
        let text = self.abstract_text.trim();
        let end = text
            .char_indices()
            .find(|&(i, c)| c == '.' && text[i + 1..].starts_with(char::is_whitespace))
            .map(|(i, _)| i + 1)
            .unwrap_or(text.len());
        let sentence = &text[..end];
        if sentence.chars().count() <= max_chars {
            sentence.to_string()
        } else {
            let truncated: String = sentence.chars().take(max_chars).collect();
            format!("{}…", truncated.trim_end())
        }
    }
}

/// 论文仓库检索能力
///
/// 错误不会跨越该边界：失败时记录诊断日志并返回空列表。
#[async_trait]
pub trait PaperRepository: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        categories: &[String],
    ) -> Vec<PaperRecord>;
}

/// 基于 export.arxiv.org Atom API 的实现
#[derive(Clone)]
pub struct ArxivClient {
    http: reqwest::Client,
    config: ArxivConfig,
}

impl ArxivClient {
    pub fn new(config: ArxivConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build arXiv HTTP client")?;
        Ok(Self { http, config })
    }

    /// 根据 ID 或完整 URL 获取单篇论文
    pub async fn get_paper_by_id(&self, paper_id: &str) -> Result<PaperRecord> {
        let id = normalize_paper_id(paper_id);
        let body = self
            .http
            .get(&self.config.api_url)
            .query(&[("id_list", id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_atom_feed(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("paper not found: {}", id))
    }

    async fn fetch(&self, search_query: &str, max_results: usize) -> Result<Vec<PaperRecord>> {
        let max_results = max_results.to_string();
        let body = self
            .http
            .get(&self.config.api_url)
            .query(&[
                ("search_query", search_query),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", self.config.sort_by.as_api_value()),
                ("sortOrder", self.config.sort_order.as_api_value()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_atom_feed(&body)
    }
}

#[async_trait]
impl PaperRepository for ArxivClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        categories: &[String],
    ) -> Vec<PaperRecord> {
        let search_query = compose_search_query(query, categories);
        debug!("arXiv search_query={}", search_query);

        match self.fetch(&search_query, max_results).await {
            Ok(mut papers) => {
                papers.truncate(max_results);
                papers
            }
            Err(e) => {
                warn!("⚠️ arXiv 检索失败: {}", e);
                Vec::new()
            }
        }
    }
}

/// 追加分类过滤：`query AND (cat:a OR cat:b)`
pub fn compose_search_query(query: &str, categories: &[String]) -> String {
    let categories: Vec<&str> = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if categories.is_empty() {
        return query.trim().to_string();
    }
    let filter = categories
        .iter()
        .map(|c| format!("cat:{}", c))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("{} AND ({})", query.trim(), filter)
}

/// 从 `http://arxiv.org/abs/2107.12345v2` 之类的形式中取出裸 ID
pub fn normalize_paper_id(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    let base = ["/abs/", "/pdf/"]
        .iter()
        .find_map(|marker| raw.find(marker).map(|pos| &raw[pos + marker.len()..]))
        .unwrap_or(raw);
    let base = base.trim_end_matches(".pdf");
    if let Some(idx) = base.rfind('v') {
        let suffix = &base[idx + 1..];
        if idx > 0 && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return base[..idx].to_string();
        }
    }
    base.to_string()
}

const RELAX_STOPWORDS: &[&str] = &[
    "and", "or", "not", "andnot", "the", "for", "with", "how", "what", "why", "does", "from",
    "into", "are", "its", "their", "about",
];

/// 放宽检索条件：去掉字段前缀、引号、括号与布尔运算符，只保留前几个关键词并用 OR 连接
///
/// 结果与原查询相同或为空时返回 `None`。
pub fn relax_query(query: &str, keywords: &[String]) -> Option<String> {
    const MAX_TERMS: usize = 4;

    let source = if keywords.iter().any(|k| !k.trim().is_empty()) {
        keywords.join(" ")
    } else {
        query.to_string()
    };

    let mut terms: Vec<String> = Vec::new();
    for raw in source.split_whitespace() {
        let token = raw.rsplit(':').next().unwrap_or(raw);
        let token: String = token
            .chars()
            .filter(|c| !matches!(c, '"' | '\'' | '(' | ')' | ',' | ';' | '?' | '!'))
            .collect();
        let lower = token.to_lowercase();
        if lower.chars().count() < 3 || RELAX_STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if !terms.iter().any(|t| t.to_lowercase() == lower) {
            terms.push(token);
        }
        if terms.len() >= MAX_TERMS {
            break;
        }
    }

    if terms.is_empty() {
        return None;
    }
    let relaxed = terms.join(" OR ");
    if relaxed.eq_ignore_ascii_case(query.trim()) {
        None
    } else {
        Some(relaxed)
    }
}

// Include tests
#[cfg(test)]
mod tests;
