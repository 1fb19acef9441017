use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单次 LLM 调用的 token 用量记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

impl TokenUsageRecord {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// 失败调用记录（只用于观测，不计入用量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFailureRecord {
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// 用量汇总（对外的只读报表）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_calls: usize,
    pub failed_calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost_usd: f64,
}

impl UsageSummary {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
