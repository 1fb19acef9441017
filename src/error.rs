use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
///
/// 只有配置错误和论文来源的非连接类错误会让整次运行中止，
/// 其余错误都在更小的范围内（单次调用 → 单篇论文 → 单个批次）被消化。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 论文来源错误
    #[error("论文来源错误: {0}")]
    Source(#[from] SourceError),
    /// 持久化错误
    #[error("存储错误: {0}")]
    Persistence(#[from] PersistenceError),
    /// LLM 调用错误
    #[error("LLM 调用错误: {0}")]
    Call(#[from] CallError),
}

/// 被 LLM 服务方拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// 请求格式错误
    MalformedRequest,
    /// 认证失败
    Authentication,
    /// 触发内容策略
    ContentPolicy,
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RejectionKind::MalformedRequest => "请求格式错误",
            RejectionKind::Authentication => "认证失败",
            RejectionKind::ContentPolicy => "内容策略拒绝",
        };
        f.write_str(label)
    }
}

/// LLM 服务方返回的错误
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// 请求频率限制
    #[error("请求频率限制, 建议等待: {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    /// 调用超时
    #[error("调用超时 ({after:?})")]
    Timeout { after: Duration },
    /// 服务不可用（过载、网络中断、空响应）
    #[error("服务不可用: {reason}")]
    Unavailable { reason: String },
    /// 请求被拒绝，不可重试
    #[error("请求被拒绝 ({kind}): {reason}")]
    Rejected { kind: RejectionKind, reason: String },
}

impl ProviderError {
    /// 是否为临时性错误（可退避重试）
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProviderError::Rejected { .. })
    }

    /// 服务方建议的等待时间
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// 单次 LLM 调用（预算 + 重试之后）的最终错误
#[derive(Debug, Error)]
pub enum CallError {
    /// 等待 token 预算的次数超过上限
    #[error("token 预算耗尽: 已等待 {waits} 次仍无法获得额度")]
    BudgetExhausted { waits: u32 },
    /// 临时性错误，重试次数已用尽
    #[error("临时性错误, 已尝试 {attempts} 次: {source}")]
    TransientProviderError {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    /// 永久性错误，调用被拒绝
    #[error("调用被拒绝: {0}")]
    PermanentProviderError(#[source] ProviderError),
    /// 运行已取消
    #[error("运行已取消")]
    Cancelled,
}

impl CallError {
    /// 单篇论文层面是否值得在当前阶段再试一次
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::TransientProviderError { .. })
    }
}

/// 论文来源错误
#[derive(Debug, Error)]
pub enum SourceError {
    /// 无法连接到论文来源
    #[error("论文来源不可用 ({location}): {reason}")]
    Unavailable { location: String, reason: String },
    /// 论文记录不合法
    #[error("论文记录不合法 ({location}): {reason}")]
    InvalidRecord { location: String, reason: String },
}

/// 持久化错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// 文件读写失败
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化 / 反序列化失败
    #[error("JSON 序列化失败 ({path}): {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 存储后端拒绝写入
    #[error("存储后端不可用: {0}")]
    Unavailable(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值超出允许范围
    #[error("配置项 {name} 不合法: {reason}")]
    OutOfRange { name: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl SourceError {
    /// 创建来源不可用错误
    pub fn unavailable(location: impl Into<String>, reason: impl ToString) -> Self {
        SourceError::Unavailable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

impl PersistenceError {
    /// 创建文件读写错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }

    /// 创建 JSON 序列化错误
    pub fn serialization(path: impl Into<String>, source: serde_json::Error) -> Self {
        PersistenceError::Serialization {
            path: path.into(),
            source,
        }
    }
}

impl ConfigError {
    /// 创建取值范围错误
    pub fn out_of_range(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::OutOfRange {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_transient_mapping() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(ProviderError::Timeout {
            after: Duration::from_secs(1)
        }
        .is_transient());
        assert!(ProviderError::Unavailable {
            reason: "overloaded".into()
        }
        .is_transient());
        assert!(!ProviderError::Rejected {
            kind: RejectionKind::Authentication,
            reason: "bad key".into()
        }
        .is_transient());
    }

    #[test]
    fn test_only_exhausted_transient_call_errors_are_retryable() {
        let transient = CallError::TransientProviderError {
            attempts: 4,
            source: ProviderError::Timeout {
                after: Duration::from_secs(60),
            },
        };
        assert!(transient.is_transient());
        assert!(!CallError::BudgetExhausted { waits: 8 }.is_transient());
        assert!(!CallError::Cancelled.is_transient());
        assert!(!CallError::PermanentProviderError(ProviderError::Rejected {
            kind: RejectionKind::ContentPolicy,
            reason: "blocked".into()
        })
        .is_transient());
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let hinted = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(hinted.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(
            ProviderError::Unavailable {
                reason: "x".into()
            }
            .retry_after(),
            None
        );
    }
}
