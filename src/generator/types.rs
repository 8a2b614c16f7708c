use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

use crate::i18n::TargetLanguage;

/// 流水线中的任务类型，按构建顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    ParseQuery,
    Search,
    Analyze,
    Summarize,
    Synthesize,
    AnswerDirectly,
    Translate,
    FormatFinal,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::ParseQuery,
        TaskKind::Search,
        TaskKind::Analyze,
        TaskKind::Summarize,
        TaskKind::Synthesize,
        TaskKind::AnswerDirectly,
        TaskKind::Translate,
        TaskKind::FormatFinal,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TaskKind::ParseQuery => "parse-query",
            TaskKind::Search => "search",
            TaskKind::Analyze => "analyze",
            TaskKind::Summarize => "summarize",
            TaskKind::Synthesize => "synthesize",
            TaskKind::AnswerDirectly => "answer-directly",
            TaskKind::Translate => "translate",
            TaskKind::FormatFinal => "format-final",
        }
    }

    /// 在 `ALL` 中的位置，用作固定大小表的下标
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// 失败时是否终止整个运行
    pub fn is_fatal_on_failure(&self) -> bool {
        matches!(self, TaskKind::ParseQuery | TaskKind::Search)
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TaskKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.key() == normalized)
            .ok_or_else(|| PipelineError::UnknownTaskKey(s.to_string()))
    }
}

/// 解释深度，决定面向的读者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationLevel {
    Expert,
    #[default]
    Medium,
    Beginner,
}

impl ExplanationLevel {
    /// 读者描述，注入 summarize / synthesize / translate / answer-directly 的 prompt
    pub fn audience(&self) -> &'static str {
        match self {
            ExplanationLevel::Expert => "a domain specialist",
            ExplanationLevel::Medium => "a graduate student",
            ExplanationLevel::Beginner => "someone with basic scientific literacy",
        }
    }

    /// 宽松解析：无法识别的取值回落到 `Medium`
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl Display for ExplanationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplanationLevel::Expert => write!(f, "expert"),
            ExplanationLevel::Medium => write!(f, "medium"),
            ExplanationLevel::Beginner => write!(f, "beginner"),
        }
    }
}

impl FromStr for ExplanationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expert" => Ok(ExplanationLevel::Expert),
            "medium" => Ok(ExplanationLevel::Medium),
            "beginner" => Ok(ExplanationLevel::Beginner),
            _ => Err(format!("Unknown explanation level: {}", s)),
        }
    }
}

/// 单次运行的参数
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub max_results: usize,
    pub level: ExplanationLevel,
    pub translate: bool,
    pub target_language: TargetLanguage,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_results: 5,
            level: ExplanationLevel::Medium,
            translate: true,
            target_language: TargetLanguage::default(),
        }
    }
}

impl RunOptions {
    /// 面向读者的输出语言：不翻译时统一使用英文
    pub fn output_language(&self) -> TargetLanguage {
        if self.translate {
            self.target_language
        } else {
            TargetLanguage::English
        }
    }
}

/// 一个任务节点的结构化输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub fields: BTreeMap<String, String>,
    /// 第一个声明字段的取值
    pub primary_text: String,
    /// 第二个声明字段的取值（只有一个字段时为空）
    pub secondary_text: String,
    /// 下游以整体方式引用该节点时使用的文本
    pub raw: String,
    /// 模型调用失败后的占位结果
    pub degraded: bool,
}

impl StageResult {
    /// 由字段表构造，按声明顺序补齐缺失字段并填充两个规范字段
    pub fn from_fields(
        mut fields: BTreeMap<String, String>,
        declared: &[&str],
        raw: impl Into<String>,
    ) -> Self {
        for name in declared {
            fields.entry(name.to_string()).or_default();
        }
        let canonical = |i: usize| {
            declared
                .get(i)
                .and_then(|name| fields.get(*name))
                .cloned()
                .unwrap_or_default()
        };
        let primary_text = canonical(0);
        let secondary_text = canonical(1);
        Self {
            primary_text,
            secondary_text,
            fields,
            raw: raw.into(),
            degraded: false,
        }
    }

    /// 模型调用失败时的降级结果，所有声明字段都填入明确标注的占位文本
    pub fn degraded(kind: TaskKind, declared: &[&str]) -> Self {
        let placeholder = degraded_placeholder(kind);
        let fields = declared
            .iter()
            .map(|name| (name.to_string(), placeholder.clone()))
            .collect();
        Self {
            degraded: true,
            ..Self::from_fields(fields, declared, placeholder.clone())
        }
    }

    /// 读取字段，缺失时返回空串
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// 非降级且非空时返回字段文本
    pub fn usable_field(&self, name: &str) -> Option<&str> {
        let value = self.field(name).trim();
        (!self.degraded && !value.is_empty()).then_some(value)
    }
}

pub fn degraded_placeholder(kind: TaskKind) -> String {
    format!(
        "[degraded content] The {} step could not be completed; this part is unavailable.",
        kind
    )
}

/// 流水线错误
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("no papers found for query \"{query}\"")]
    NoPapersFound { query: String },

    #[error("could not interpret the query: {0}")]
    QueryInterpretation(String),

    #[error("paper retrieval failed: {0}")]
    Retrieval(String),

    #[error("task {node} requires the result of {predecessor}, which is not available")]
    MissingPredecessor {
        node: TaskKind,
        predecessor: TaskKind,
    },

    #[error("result of task {0} has already been set")]
    ResultAlreadySet(TaskKind),

    #[error("unknown role key: {0}")]
    UnknownRoleKey(String),

    #[error("unknown task key: {0}")]
    UnknownTaskKey(String),

    #[error("invalid run options: {0}")]
    InvalidOptions(String),
}
