use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::generator::roles::RolePersona;
use crate::generator::types::ExplanationLevel;
use crate::i18n::TargetLanguage;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "arxivbuddy.toml";

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    #[default]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// arXiv 排序字段
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortCriterion {
    #[default]
    Relevance,
    SubmittedDate,
    LastUpdatedDate,
}

impl SortCriterion {
    /// arXiv API 中 sortBy 参数的取值
    pub fn as_api_value(&self) -> &'static str {
        match self {
            SortCriterion::Relevance => "relevance",
            SortCriterion::SubmittedDate => "submittedDate",
            SortCriterion::LastUpdatedDate => "lastUpdatedDate",
        }
    }
}

/// arXiv 排序方向
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Descending,
    Ascending,
}

impl SortOrder {
    pub fn as_api_value(&self) -> &'static str {
        match self {
            SortOrder::Descending => "descending",
            SortOrder::Ascending => "ascending",
        }
    }
}

/// 结果文件格式
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Md,
    Json,
    Txt,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Md => "md",
            OutputFormat::Json => "json",
            OutputFormat::Txt => "txt",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md" | "markdown" => Ok(OutputFormat::Md),
            "json" => Ok(OutputFormat::Json),
            "txt" | "text" => Ok(OutputFormat::Txt),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// 配置错误，启动阶段即终止
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing LLM API key (set ARXIVBUDDY_LLM_API_KEY or llm.api_key)")]
    MissingApiKey,
    #[error("missing LLM model name (set ARXIVBUDDY_LLM_MODEL or llm.model)")]
    MissingModel,
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// LLM模型配置
    pub llm: LLMConfig,

    /// arXiv 检索配置
    pub arxiv: ArxivConfig,

    /// 跨查询记忆配置
    pub memory: MemoryConfig,

    /// 输出配置
    pub output: OutputConfig,

    /// 翻译目标语言
    pub target_language: TargetLanguage,

    /// 是否翻译摘要与综述
    pub translate: bool,

    /// 默认讲解深度
    pub level: ExplanationLevel,

    /// 角色设定覆盖，key为角色名（如 "summarizer"）
    pub roles: BTreeMap<String, RolePersona>,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 模型名称
    pub model: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// arXiv 检索配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ArxivConfig {
    pub api_url: String,
    pub max_results: usize,
    pub sort_by: SortCriterion,
    pub sort_order: SortOrder,
    pub timeout_seconds: u64,
    /// 少于该数量的结果会触发一次放宽查询后的重试
    pub min_relevant_results: usize,
    /// 限定的 arXiv 分类，如 "cs.AI"
    pub categories: Vec<String>,
}

/// 跨查询记忆配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub recall_limit: usize,
}

/// 输出配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// 结果根目录，实际文件写入按日期划分的子目录
    pub dir: PathBuf,
    pub format: OutputFormat,
    pub filename_max_len: usize,
    /// 是否保存结果文件
    pub save: bool,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 按优先级加载配置：显式路径 > 当前目录下的默认文件 > 内置默认值，随后叠加环境变量
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 使用环境变量覆盖配置，`lookup` 便于测试时注入
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ARXIVBUDDY_LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup("ARXIVBUDDY_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("ARXIVBUDDY_LLM_BASE_URL") {
            self.llm.api_base_url = url;
        }
        if let Some(provider) = lookup("ARXIVBUDDY_LLM_PROVIDER") {
            self.llm.provider =
                provider
                    .parse()
                    .map_err(|reason| ConfigError::InvalidValue {
                        field: "ARXIVBUDDY_LLM_PROVIDER",
                        reason,
                    })?;
        }
        if let Some(temperature) = lookup("ARXIVBUDDY_LLM_TEMPERATURE") {
            self.llm.temperature =
                temperature
                    .parse()
                    .map_err(|e: std::num::ParseFloatError| ConfigError::InvalidValue {
                        field: "ARXIVBUDDY_LLM_TEMPERATURE",
                        reason: e.to_string(),
                    })?;
        }
        if let Some(max_tokens) = lookup("ARXIVBUDDY_LLM_MAX_TOKENS") {
            self.llm.max_tokens =
                max_tokens
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        field: "ARXIVBUDDY_LLM_MAX_TOKENS",
                        reason: e.to_string(),
                    })?;
        }
        if let Some(max_results) = lookup("ARXIVBUDDY_ARXIV_MAX_RESULTS") {
            self.arxiv.max_results =
                max_results
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        field: "ARXIVBUDDY_ARXIV_MAX_RESULTS",
                        reason: e.to_string(),
                    })?;
        }
        Ok(())
    }

    /// 校验启动所需的配置项
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.trim().is_empty() && self.llm.provider != LLMProvider::Ollama {
            return Err(ConfigError::MissingApiKey);
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        if self.arxiv.max_results == 0 {
            return Err(ConfigError::InvalidValue {
                field: "arxiv.max_results",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature",
                reason: format!("{} is outside 0.0..=2.0", self.llm.temperature),
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LLMConfig::default(),
            arxiv: ArxivConfig::default(),
            memory: MemoryConfig::default(),
            output: OutputConfig::default(),
            target_language: TargetLanguage::default(),
            translate: true,
            level: ExplanationLevel::default(),
            roles: BTreeMap::new(),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: String::new(),
            api_base_url: String::from("https://openrouter.ai/api/v1"),
            model: String::from("openai/gpt-4.1-mini"),
            max_tokens: 4000,
            temperature: 0.7,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 120,
        }
    }
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_url: String::from("http://export.arxiv.org/api/query"),
            max_results: 5,
            sort_by: SortCriterion::default(),
            sort_order: SortOrder::default(),
            timeout_seconds: 30,
            min_relevant_results: 3,
            categories: vec![],
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("./arxivbuddy_memory/history.jsonl"),
            recall_limit: 3,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./arxivbuddy_results"),
            format: OutputFormat::default(),
            filename_max_len: 50,
            save: true,
        }
    }
}
