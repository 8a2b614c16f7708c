//! 模型输出文本的清理工具

use regex::Regex;
use std::sync::LazyLock;

const FINAL_ANSWER_MARKER: &str = "## Final Answer:";

/// 清理模型文本：去掉控制字符、统一换行、压缩空格，连续空行最多保留一个
pub fn clean_text(text: &str) -> String {
    static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[\x00-\x09\x0b\x0c\x0e-\x1f\x7f]").expect("valid regex")
    });
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r" +").expect("valid regex"));
    static LINE_EDGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^ +| +$").expect("valid regex"));
    static BLANK_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let text = text.replace("\r\n", "\n");
    let text = CONTROL_RE.replace_all(&text, "");
    let text = SPACES_RE.replace_all(&text, " ");
    let text = LINE_EDGE_RE.replace_all(&text, "");
    let text = BLANK_RUN_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// 去掉 "## Final Answer:" 之前的全部内容
pub fn strip_final_answer(text: &str) -> &str {
    match text.split_once(FINAL_ANSWER_MARKER) {
        Some((_, rest)) => rest.trim(),
        None => text,
    }
}

/// 去掉常见拉丁字母的重音，用于不区分重音的关键词匹配
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => 'a',
            'À' | 'Á' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
            'ç' => 'c',
            'Ç' => 'C',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'È' | 'É' | 'Ê' | 'Ë' => 'E',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
            'Ò' | 'Ó' | 'Ô' | 'Ö' | 'Õ' => 'O',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
            'ý' | 'ÿ' => 'y',
            other => other,
        })
        .collect()
}

/// 由查询生成文件名片段：去掉非单词字符，空白替换为下划线，截断到 `max_len` 个字符
pub fn query_slug(query: &str, max_len: usize) -> String {
    static NON_WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let stripped = NON_WORD_RE.replace_all(query.trim(), "");
    let slug = WS_RE.replace_all(stripped.trim(), "_");
    let slug: String = slug.chars().take(max_len).collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug.to_string()
    }
}
