//! LLM 响应解析
//!
//! 模型输出是松散的文本，这里把它校验成强类型：
//! 先在文本中定位 JSON，再逐字段校验，无法识别的专科标签回退到默认专科。

use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use crate::models::{ReconciledScore, ScoreBreakdown, Specialty};

/// 最多保留的关键词数量
pub const MAX_KEYWORDS: usize = 5;

/// 响应无法解析
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("响应中没有 JSON 内容")]
    NoJson,
    #[error("JSON 格式错误: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("缺少字段: {0}")]
    MissingField(&'static str),
    #[error("字段数值溢出: {0}")]
    NonFinite(&'static str),
    #[error("正则表达式错误: {0}")]
    Regex(#[from] regex::Error),
}

/// 关键词提取结果
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub keywords: Vec<String>,
    pub focus: String,
}

/// 从文本中取出第一个 `{` 到最后一个 `}` 之间的 JSON 对象
pub fn extract_json_object(response: &str) -> Result<JsonValue, ParseError> {
    let re = Regex::new(r"(?s)\{.*\}")?;
    let matched = re.find(response).ok_or(ParseError::NoJson)?;
    Ok(serde_json::from_str(matched.as_str())?)
}

fn extract_json_array(response: &str) -> Result<Vec<JsonValue>, ParseError> {
    let re = Regex::new(r"(?s)\[.*\]")?;
    let matched = re.find(response).ok_or(ParseError::NoJson)?;
    Ok(serde_json::from_str(matched.as_str())?)
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// 解析专科分类响应
///
/// 接受 `{"specialty": "..."}` 或纯文本标签，无法识别时返回 `default`。
pub fn parse_specialty(response: &str, default: Specialty) -> Specialty {
    let label = extract_json_object(response)
        .ok()
        .and_then(|json| {
            json.get("specialty")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| response.trim().to_string());

    let specialty = Specialty::normalize(&label, default);
    debug!("专科标签 '{}' → {}", label, specialty);
    specialty
}

/// 解析关键词提取响应
pub fn parse_extraction(response: &str) -> Result<Extraction, ParseError> {
    let json = extract_json_object(response)?;

    let raw_keywords: Vec<String> = match json.get("keywords") {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .map(str::to_string)
            .collect(),
        Some(JsonValue::String(joined)) => joined.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let focus = json
        .get("focus")
        .or_else(|| json.get("summary"))
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|focus| !focus.is_empty())
        .ok_or(ParseError::MissingField("focus"))?
        .to_string();

    Ok(Extraction {
        keywords: normalize_keywords(raw_keywords),
        focus,
    })
}

/// 去空白、按大小写不敏感去重（保留首次出现），最多保留 [`MAX_KEYWORDS`] 个
pub fn normalize_keywords(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .map(|keyword| keyword.trim().to_string())
        .filter(|keyword| !keyword.is_empty())
        .filter(|keyword| seen.insert(keyword.to_lowercase()))
        .take(MAX_KEYWORDS)
        .collect()
}

/// 解析兴趣评分响应，并校正分数与分项的一致性
pub fn parse_score(response: &str) -> Result<ReconciledScore, ParseError> {
    let json = extract_json_object(response)?;

    let reported = json
        .get("interest_score")
        .or_else(|| json.get("score"))
        .and_then(as_number);

    let breakdown: ScoreBreakdown = match json.get("breakdown") {
        Some(JsonValue::Object(map)) => map
            .iter()
            .filter_map(|(name, value)| as_number(value).map(|v| (name.clone(), v)))
            .collect(),
        _ => ScoreBreakdown::new(),
    };

    if reported.is_none() && breakdown.is_empty() {
        return Err(ParseError::MissingField("interest_score"));
    }
    if !breakdown.is_finite() {
        return Err(ParseError::NonFinite("breakdown"));
    }

    Ok(breakdown.reconcile(reported.unwrap_or(f64::NAN)))
}

/// 解析列表型汇总字段（JSON 数组，退化为逐行文本）
pub fn parse_narrative_list(response: &str) -> Vec<String> {
    match extract_json_array(response) {
        Ok(items) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Err(_) => response
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// 解析文本型汇总字段
pub fn parse_narrative_text(response: &str) -> Option<String> {
    let text = response.trim();
    (!text.is_empty()).then(|| text.to_string())
}
