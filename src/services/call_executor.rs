//! 单次 LLM 调用执行器 - 业务能力层
//!
//! 把一次 LLM 请求包装成：估算 → 预留预算 → 请求 → 退避重试 → 记账。
//!
//! 只有这里会挂起等待（预算等待与退避），其它组件都不阻塞。

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CallError, ProviderError};
use crate::infrastructure::{Grant, Reservation, TokenBudget, UsageLedger};
use crate::services::llm_provider::{LlmProvider, LlmResponse};

/// 退避指数上限，避免位移溢出
const MAX_BACKOFF_EXPONENT: u32 = 16;
/// 抖动占退避时长的最大比例
const MAX_JITTER_FRACTION: f64 = 0.25;

/// 按 4 个字符约 1 个 token 估算（向上取整）
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    (chars + 3) / 4
}

/// 第 `attempt` 次重试前的退避时长：`base * 2^attempt`，再加上 `jitter_fraction` 比例的抖动
pub fn backoff_delay(base: Duration, attempt: u32, jitter_fraction: f64) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.min(MAX_BACKOFF_EXPONENT));
    let jitter = jitter_fraction.clamp(0.0, MAX_JITTER_FRACTION);
    exp + exp.mul_f64(jitter)
}

/// 调用策略
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_budget_waits: u32,
    pub call_timeout: Duration,
    pub max_output_tokens: u32,
}

impl CallPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_call_retries,
            base_backoff: config.base_backoff(),
            max_budget_waits: config.max_budget_waits,
            call_timeout: config.call_timeout(),
            max_output_tokens: config.max_output_tokens,
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// LLM 调用执行器
///
/// 职责：
/// - 每次调用前向 [`TokenBudget`] 预留额度，额度不足时按报告的时长等待
/// - 临时性错误归还额度后指数退避重试
/// - 永久性错误立即返回，不重试
/// - 成功调用在 [`UsageLedger`] 中恰好追加一条用量记录
/// - 运行取消后不再发起新的预留
pub struct CallExecutor {
    provider: Arc<dyn LlmProvider>,
    budget: Arc<TokenBudget>,
    ledger: Arc<UsageLedger>,
    policy: CallPolicy,
    cancel: CancellationToken,
}

impl CallExecutor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        budget: Arc<TokenBudget>,
        ledger: Arc<UsageLedger>,
        policy: CallPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            budget,
            ledger,
            policy,
            cancel,
        }
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 执行一次 LLM 调用，返回响应文本
    pub async fn execute(&self, prompt: &str) -> Result<String, CallError> {
        let estimated = estimate_tokens(prompt);
        let mut budget_waits = 0u32;
        let mut attempt = 0u32;

        loop {
            let grant = self.acquire(estimated, &mut budget_waits).await?;

            let outcome = match tokio::time::timeout(
                self.policy.call_timeout,
                self.provider.invoke(prompt, self.policy.max_output_tokens),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    after: self.policy.call_timeout,
                }),
            };

            match outcome {
                Ok(response) => return Ok(self.settle(grant, prompt, response)),
                Err(err) if err.is_transient() => {
                    self.budget.release(grant);

                    if attempt >= self.policy.max_retries {
                        warn!(
                            attempts = attempt + 1,
                            error = %err,
                            "❌ 临时性错误重试次数已用尽"
                        );
                        self.ledger.record_failure(err.to_string());
                        return Err(CallError::TransientProviderError {
                            attempts: attempt + 1,
                            source: err,
                        });
                    }

                    let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
                    let mut delay = backoff_delay(self.policy.base_backoff, attempt, jitter);
                    if let Some(hint) = err.retry_after() {
                        delay = delay.max(hint);
                    }
                    info!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "🔁 临时性错误，退避后重试"
                    );
                    self.sleep_or_cancel(delay).await?;
                    attempt += 1;
                }
                Err(err) => {
                    self.budget.release(grant);
                    warn!(error = %err, "❌ 调用被拒绝，不再重试");
                    self.ledger.record_failure(err.to_string());
                    return Err(CallError::PermanentProviderError(err));
                }
            }
        }
    }

    /// 预留额度，必要时等待
    async fn acquire(&self, estimated: u64, waits: &mut u32) -> Result<Grant, CallError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(CallError::Cancelled);
            }

            match self.budget.reserve(estimated) {
                Reservation::Granted(grant) => return Ok(grant),
                Reservation::MustWait(wait) => {
                    if *waits >= self.policy.max_budget_waits {
                        warn!(waits = *waits, "❌ 等待 token 预算次数超过上限");
                        self.ledger
                            .record_failure(format!("token 预算耗尽 (等待 {} 次)", *waits));
                        return Err(CallError::BudgetExhausted { waits: *waits });
                    }
                    *waits += 1;
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        estimated,
                        "⏳ token 预算不足，等待窗口释放"
                    );
                    self.sleep_or_cancel(wait).await?;
                }
            }
        }
    }

    /// 确认用量并记账
    ///
    /// 服务方未上报的用量按 4:1 启发式估算。
    fn settle(&self, grant: Grant, prompt: &str, response: LlmResponse) -> String {
        let input_tokens = if response.input_tokens > 0 {
            response.input_tokens
        } else {
            estimate_tokens(prompt)
        };
        let output_tokens = if response.output_tokens > 0 {
            response.output_tokens
        } else {
            estimate_tokens(&response.text)
        };

        self.budget.commit(grant, input_tokens, output_tokens);
        let record = self.ledger.record_usage(input_tokens, output_tokens);
        debug!(
            input_tokens,
            output_tokens,
            cost = format!("${:.6}", record.cost_usd),
            "LLM 调用完成"
        );
        response.text
    }

    async fn sleep_or_cancel(&self, duration: Duration) -> Result<(), CallError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CallError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
