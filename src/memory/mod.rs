//! 跨次运行的研究记忆（可选，尽力而为）

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::utils::text::fold_accents;

/// 一次成功运行的摘要记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub query: String,
    pub search_query: String,
    pub keywords: Vec<String>,
    pub paper_ids: Vec<String>,
    pub summary: String,
    pub recorded_at: DateTime<Utc>,
}

impl RunSummary {
    /// 召回时注入 prompt 的片段
    pub fn snippet(&self, max_chars: usize) -> String {
        let mut summary: String = self.summary.chars().take(max_chars).collect();
        if self.summary.chars().count() > max_chars {
            summary.push('…');
        }
        format!(
            "Previous question \"{}\" (papers: {}): {}",
            self.query,
            self.paper_ids.join(", "),
            summary
        )
    }

    fn terms(&self) -> HashSet<String> {
        let mut terms = keyword_terms(&self.query);
        terms.extend(keyword_terms(&self.search_query));
        for keyword in &self.keywords {
            terms.extend(keyword_terms(keyword));
        }
        terms
    }
}

/// 只追加的记忆协作者
///
/// 两个操作都不返回错误：记忆只用于丰富 prompt，失败时记录日志后忽略。
#[async_trait]
pub trait ResearchMemory: Send + Sync {
    async fn record(&self, summary: &RunSummary);

    async fn recall(&self, query: &str, limit: usize) -> Vec<String>;
}

/// 基于 JSONL 文件的记忆实现，每行一个 `RunSummary`
#[derive(Debug)]
pub struct JsonlMemory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

const SNIPPET_CHARS: usize = 300;

impl JsonlMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, summary: &RunSummary) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(summary)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<RunSummary>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let entries = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<RunSummary>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("跳过无法解析的记忆行: {}", e);
                    None
                }
            })
            .collect();
        Ok(entries)
    }
}

#[async_trait]
impl ResearchMemory for JsonlMemory {
    async fn record(&self, summary: &RunSummary) {
        if let Err(e) = self.append(summary).await {
            warn!("⚠️ 记忆写入失败 ({}): {}", self.path.display(), e);
        }
    }

    async fn recall(&self, query: &str, limit: usize) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }
        let entries = match self.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ 记忆读取失败 ({}): {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let wanted = keyword_terms(query);
        let mut scored: Vec<(usize, &RunSummary)> = entries
            .iter()
            .map(|entry| (entry.terms().intersection(&wanted).count(), entry))
            .filter(|(score, _)| *score > 0)
            .collect();
        // 分数相同时较新的记录优先
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.recorded_at.cmp(&a.1.recorded_at))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry.snippet(SNIPPET_CHARS))
            .collect()
    }
}

fn keyword_terms(text: &str) -> HashSet<String> {
    fold_accents(&text.to_lowercase())
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn summary(query: &str, keywords: &[&str], hour: u32) -> RunSummary {
        RunSummary {
            query: query.to_string(),
            search_query: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            paper_ids: vec!["2401.00001".to_string()],
            summary: format!("summary of {}", query),
            recorded_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_recall_on_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let memory = JsonlMemory::new(temp_dir.path().join("none.jsonl"));

        assert!(memory.recall("transformers", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_record_then_recall_ranks_by_overlap() {
        let temp_dir = TempDir::new().unwrap();
        let memory = JsonlMemory::new(temp_dir.path().join("nested").join("history.jsonl"));

        memory
            .record(&summary("graph neural networks", &["gnn"], 1))
            .await;
        memory
            .record(&summary("long range attention in transformers", &["attention"], 2))
            .await;
        memory
            .record(&summary("protein folding", &["biology"], 3))
            .await;

        let recalled = memory
            .recall("How does attention in transformers scale?", 2)
            .await;
        assert_eq!(recalled.len(), 1);
        assert!(recalled[0].contains("long range attention in transformers"));
        assert!(recalled[0].contains("2401.00001"));
    }

    #[tokio::test]
    async fn test_recall_respects_limit_and_recency() {
        let temp_dir = TempDir::new().unwrap();
        let memory = JsonlMemory::new(temp_dir.path().join("history.jsonl"));

        memory.record(&summary("diffusion models", &[], 1)).await;
        memory.record(&summary("diffusion samplers", &[], 5)).await;

        let recalled = memory.recall("diffusion", 1).await;
        assert_eq!(recalled.len(), 1);
        assert!(recalled[0].contains("diffusion samplers"));
        assert!(memory.recall("diffusion", 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_recall_skips_corrupt_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.jsonl");
        let good = serde_json::to_string(&summary("quantum error correction", &[], 1)).unwrap();
        std::fs::write(&path, format!("not json\n{}\n", good)).unwrap();

        let memory = JsonlMemory::new(&path);
        let recalled = memory.recall("quantum computing", 3).await;
        assert_eq!(recalled.len(), 1);
    }

    #[test]
    fn test_keyword_terms_fold_accents() {
        let terms = keyword_terms("Résumé of LLM agents");
        assert!(terms.contains("resume"));
        assert!(terms.contains("llm"));
        assert!(!terms.contains("of"));
    }
}
