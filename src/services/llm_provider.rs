//! LLM 服务方 - 业务能力层
//!
//! 只负责"发出一次请求"，不关心预算、重试和流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ProviderError, RejectionKind};

const SYSTEM_PROMPT: &str =
    "You are a medical research analyst. Follow the requested output format exactly.";

/// 一次调用的响应与服务方上报的用量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub text: String,
    /// 服务方上报的输入 token（未上报时为 0）
    pub input_tokens: u64,
    /// 服务方上报的输出 token（未上报时为 0）
    pub output_tokens: u64,
}

/// LLM 服务方
///
/// 每次 `invoke` 对应恰好一次网络请求，错误已归类为 [`ProviderError`]。
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn invoke(&self, prompt: &str, max_tokens: u32) -> Result<LlmResponse, ProviderError>;

    fn model_name(&self) -> &str;
}

/// 基于 OpenAI 兼容接口的服务方
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiProvider {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn invoke(&self, prompt: &str, max_tokens: u32) -> Result<LlmResponse, ProviderError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("提示词长度: {} 字符", prompt.chars().count());

        let malformed = |e: async_openai::error::OpenAIError| ProviderError::Rejected {
            kind: RejectionKind::MalformedRequest,
            reason: e.to_string(),
        };

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(malformed)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(malformed)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.3)
            .max_tokens(max_tokens)
            .build()
            .map_err(malformed)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_provider_message(&e.to_string())
        })?;

        let (input_tokens, output_tokens) = response
            .usage
            .as_ref()
            .map(|usage| (usage.prompt_tokens as u64, usage.completion_tokens as u64))
            .unwrap_or((0, 0));

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::Unavailable {
                reason: "LLM 返回内容为空".to_string(),
            })?;

        debug!("LLM API 调用成功");
        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// 按错误信息把客户端错误归类
///
/// 客户端错误的结构随版本变化，状态码和错误码都会出现在错误文本中。
pub fn classify_provider_message(message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));
    let status = http_status(&lower);
    let status_in = |codes: &[u16]| status.is_some_and(|code| codes.contains(&code));

    if status_in(&[429]) || has(&["rate limit", "rate_limit", "too many requests"]) {
        ProviderError::RateLimited { retry_after: None }
    } else if status_in(&[408, 504]) || has(&["timed out", "timeout", "deadline"]) {
        ProviderError::Timeout {
            after: std::time::Duration::ZERO,
        }
    } else if status_in(&[401, 403])
        || has(&["unauthorized", "invalid_api_key", "authentication", "permission"])
    {
        ProviderError::Rejected {
            kind: RejectionKind::Authentication,
            reason: message.to_string(),
        }
    } else if has(&["content_policy", "content policy", "content_filter", "safety system"]) {
        ProviderError::Rejected {
            kind: RejectionKind::ContentPolicy,
            reason: message.to_string(),
        }
    } else if status_in(&[400, 404, 413, 422])
        || has(&["invalid_request", "bad request", "context_length_exceeded"])
    {
        ProviderError::Rejected {
            kind: RejectionKind::MalformedRequest,
            reason: message.to_string(),
        }
    } else {
        ProviderError::Unavailable {
            reason: message.to_string(),
        }
    }
}

/// 从错误信息中取出 HTTP 状态码
///
/// 只认开头的状态码，或者跟在 `status` / `status code` / `http` 后面的三位数，
/// 避免把 token 数之类的数字当成状态码。
fn http_status(lower: &str) -> Option<u16> {
    let re = Regex::new(r"(?:^\s*|\bstatus(?:\s*code)?\s*[:=]?\s*|\bhttp(?:/[\d.]+)?\s+)(\d{3})\b").ok()?;
    re.captures(lower)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient() {
        let err = classify_provider_message("429 Too Many Requests: Rate limit reached");
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_auth_errors_are_permanent() {
        let err = classify_provider_message("invalid_api_key: Incorrect API key provided");
        assert!(matches!(
            err,
            ProviderError::Rejected {
                kind: RejectionKind::Authentication,
                ..
            }
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_content_policy_rejection() {
        let err = classify_provider_message("content_filter triggered for this prompt");
        assert!(matches!(
            err,
            ProviderError::Rejected {
                kind: RejectionKind::ContentPolicy,
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_request() {
        let err = classify_provider_message("invalid_request_error: messages must not be empty");
        assert!(matches!(
            err,
            ProviderError::Rejected {
                kind: RejectionKind::MalformedRequest,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_errors_are_unavailable() {
        let err = classify_provider_message("error sending request: connection reset");
        assert!(matches!(err, ProviderError::Unavailable { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_status_codes_only_count_in_status_position() {
        assert!(matches!(
            classify_provider_message("status: 401, body: nope"),
            ProviderError::Rejected {
                kind: RejectionKind::Authentication,
                ..
            }
        ));
        assert!(matches!(
            classify_provider_message("HTTP 400 returned by upstream"),
            ProviderError::Rejected {
                kind: RejectionKind::MalformedRequest,
                ..
            }
        ));
        let err = classify_provider_message("stream closed after 400 tokens (403 cached)");
        assert!(matches!(err, ProviderError::Unavailable { .. }));
        assert!(err.is_transient());
    }
}
