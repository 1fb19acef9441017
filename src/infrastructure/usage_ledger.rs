//! 用量账本
//!
//! 只追加：每次成功调用一条 [`TokenUsageRecord`]，每次最终失败的调用一条
//! [`CallFailureRecord`]。对外只暴露只读的 [`UsageSummary`]。

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::config::Config;
use crate::models::{CallFailureRecord, TokenUsageRecord, UsageSummary};

/// 每百万 token 的价格（美元）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            input_per_million: 0.05,
            output_per_million: 0.08,
        }
    }
}

impl CostModel {
    pub fn from_config(config: &Config) -> Self {
        Self {
            input_per_million: config.input_cost_per_million,
            output_per_million: config.output_cost_per_million,
        }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    usage: Vec<TokenUsageRecord>,
    failures: Vec<CallFailureRecord>,
}

/// LLM 调用用量账本
#[derive(Debug, Default)]
pub struct UsageLedger {
    cost_model: CostModel,
    state: Mutex<LedgerState>,
}

impl UsageLedger {
    pub fn new(cost_model: CostModel) -> Self {
        Self {
            cost_model,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn cost_model(&self) -> CostModel {
        self.cost_model
    }

    /// 记录一次成功调用，返回写入的记录
    pub fn record_usage(&self, input_tokens: u64, output_tokens: u64) -> TokenUsageRecord {
        let mut state = self.lock();
        // 时间戳单调不减
        let now = Utc::now();
        let recorded_at = state
            .usage
            .last()
            .map(|last| last.recorded_at.max(now))
            .unwrap_or(now);

        let record = TokenUsageRecord {
            input_tokens,
            output_tokens,
            cost_usd: self.cost_model.cost(input_tokens, output_tokens),
            recorded_at,
        };
        state.usage.push(record.clone());
        record
    }

    /// 记录一次最终失败的调用
    pub fn record_failure(&self, reason: impl Into<String>) {
        self.lock().failures.push(CallFailureRecord {
            reason: reason.into(),
            recorded_at: Utc::now(),
        });
    }

    pub fn records(&self) -> Vec<TokenUsageRecord> {
        self.lock().usage.clone()
    }

    pub fn failures(&self) -> Vec<CallFailureRecord> {
        self.lock().failures.clone()
    }

    pub fn summary(&self) -> UsageSummary {
        let state = self.lock();
        let mut summary = UsageSummary {
            total_calls: state.usage.len(),
            failed_calls: state.failures.len(),
            ..Default::default()
        };
        for record in &state.usage {
            summary.input_tokens += record.input_tokens;
            summary.output_tokens += record.output_tokens;
            summary.total_cost_usd += record.cost_usd;
        }
        summary
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.usage.clear();
        state.failures.clear();
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
