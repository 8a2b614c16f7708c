use crate::config::OutputFormat;
use crate::utils::text::query_slug;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// 文件名前缀
const FILE_PREFIX: &str = "arxivbuddy";

/// 保存研究结果，返回写入的文件路径
pub async fn save_document(
    query: &str,
    document: &str,
    format: OutputFormat,
    dir: &Path,
    filename_max_len: usize,
) -> Result<PathBuf> {
    DiskOutlet::new(dir, format, filename_max_len)
        .save(query, document, Local::now())
        .await
}

/// 按日期分目录写入磁盘
pub struct DiskOutlet {
    dir: PathBuf,
    format: OutputFormat,
    filename_max_len: usize,
}

impl DiskOutlet {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat, filename_max_len: usize) -> Self {
        Self {
            dir: dir.into(),
            format,
            filename_max_len,
        }
    }

    /// `<dir>/<YYYY-MM-DD>/arxivbuddy_<slug>_<HHMMSS>.<ext>`
    pub fn target_path(&self, query: &str, at: DateTime<Local>) -> PathBuf {
        let file_name = format!(
            "{}_{}_{}.{}",
            FILE_PREFIX,
            query_slug(query, self.filename_max_len),
            at.format("%H%M%S"),
            self.format.extension()
        );
        self.dir
            .join(at.format("%Y-%m-%d").to_string())
            .join(file_name)
    }

    pub async fn save(&self, query: &str, document: &str, at: DateTime<Local>) -> Result<PathBuf> {
        let path = self.target_path(query, at);
        // 确保父目录存在
        if let Some(parent_dir) = path.parent() {
            tokio::fs::create_dir_all(parent_dir)
                .await
                .with_context(|| format!("Failed to create output directory {:?}", parent_dir))?;
        }

        let content = render_content(query, document, self.format)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write result file {:?}", path))?;
        Ok(path)
    }
}

/// JSON 格式下：合法 JSON 文本重新美化输出，否则包装为 {"query", "results"}
fn render_content(query: &str, document: &str, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let value = match serde_json::from_str::<serde_json::Value>(document) {
                Ok(value) => value,
                Err(_) => serde_json::json!({
                    "query": query,
                    "results": document,
                }),
            };
            Ok(serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Md | OutputFormat::Txt => Ok(document.to_string()),
    }
}
