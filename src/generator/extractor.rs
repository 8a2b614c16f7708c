//! 从模型的自由文本回复中提取结构化结果
//!
//! 依次尝试：围栏 JSON 块、花括号区域、按章节标题的逐行启发式切分。
//! 任何输入都不会失败，每个期望字段至少得到空串。

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use super::prompts::FieldSpec;
use super::types::StageResult;
use crate::utils::text::{fold_accents, strip_final_answer};

/// 启发式切分时，超过该长度的行不视为章节标题
const MAX_HEADER_LINE_CHARS: usize = 80;

/// 提取所用的层级，主要用于日志与测试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTier {
    FencedBlock,
    BraceRegion,
    LineHeuristic,
}

pub fn extract(raw_text: &str, expected_fields: &[FieldSpec]) -> StageResult {
    extract_with_tier(raw_text, expected_fields).0
}

pub fn extract_with_tier(
    raw_text: &str,
    expected_fields: &[FieldSpec],
) -> (StageResult, ExtractionTier) {
    let text = strip_final_answer(raw_text);
    let declared: Vec<&str> = expected_fields.iter().map(|f| f.name).collect();

    let (fields, tier) = if let Some(object) = fenced_block(text) {
        (object_fields(object, expected_fields), ExtractionTier::FencedBlock)
    } else if let Some(object) = brace_region(text) {
        (object_fields(object, expected_fields), ExtractionTier::BraceRegion)
    } else {
        (line_heuristic(text, expected_fields), ExtractionTier::LineHeuristic)
    };
    debug!("响应提取层级: {:?}, 字段: {:?}", tier, declared);

    (StageResult::from_fields(fields, &declared, text.trim()), tier)
}

fn fenced_block(text: &str) -> Option<Map<String, Value>> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n(.*?)```").expect("valid regex")
    });

    FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| decode_object(m.as_str()))
}

fn brace_region(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    decode_object(&text[start..=end])
}

fn decode_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// 结构化对象转为字段表：保留全部键，期望字段允许通过标题关键词匹配别名键
fn object_fields(object: Map<String, Value>, expected: &[FieldSpec]) -> BTreeMap<String, String> {
    let mut fields: BTreeMap<String, String> = object
        .iter()
        .map(|(key, value)| (key.clone(), value_to_text(value)))
        .collect();

    for spec in expected {
        if fields.contains_key(spec.name) {
            continue;
        }
        let alias = object.iter().find(|(key, _)| {
            let folded = fold_accents(&key.to_lowercase());
            spec.header_keywords.iter().any(|kw| folded.contains(kw))
        });
        if let Some((_, value)) = alias {
            fields.insert(spec.name.to_string(), value_to_text(value));
        }
    }
    fields
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn is_structural_line(line: &str) -> bool {
    ["{", "}", "```", "#"].iter().any(|marker| line.contains(marker))
}

fn header_field<'a>(line: &str, expected: &'a [FieldSpec]) -> Option<&'a FieldSpec> {
    if line.chars().count() > MAX_HEADER_LINE_CHARS {
        return None;
    }
    let folded = fold_accents(&line.to_lowercase());
    expected
        .iter()
        .find(|spec| spec.header_keywords.iter().any(|kw| folded.contains(kw)))
}

fn line_heuristic(text: &str, expected: &[FieldSpec]) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut current: Option<&str> = None;
    let mut saw_header = false;

    for line in text.lines() {
        let line = line.trim();
        if let Some(spec) = header_field(line, expected) {
            current = Some(spec.name);
            saw_header = true;
            // "Summary: text" 形式，冒号后的内容属于该字段
            if let Some((_, rest)) = line.split_once(':') {
                let rest = rest.trim();
                if !rest.is_empty() && !is_structural_line(rest) {
                    collected.entry(spec.name).or_default().push(rest);
                }
            }
            continue;
        }
        if line.is_empty() || is_structural_line(line) {
            continue;
        }
        if let Some(name) = current {
            collected.entry(name).or_default().push(line);
        }
    }

    let mut fields: BTreeMap<String, String> = collected
        .into_iter()
        .map(|(name, lines)| (name.to_string(), lines.join("\n")))
        .collect();

    // 没有任何标题时，整段文本归入第一个期望字段
    if !saw_header
        && let Some(first) = expected.first()
    {
        let body = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !is_structural_line(line))
            .collect::<Vec<_>>()
            .join("\n");
        fields.insert(first.name.to_string(), body);
    }
    fields
}
