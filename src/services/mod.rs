//! 业务能力层
//!
//! 描述"我能做什么"，不关心流程：
//!
//! - `LlmProvider` - 发出一次 LLM 请求
//! - `CallExecutor` - 带预算、重试和记账的一次调用
//! - `PaperSource` - 获取论文
//! - `AnalysisStore` - 写入与查询分析结果

pub mod call_executor;
pub mod llm_provider;
pub mod paper_source;
pub mod result_store;

pub use call_executor::{backoff_delay, estimate_tokens, CallExecutor, CallPolicy};
pub use llm_provider::{classify_provider_message, LlmProvider, LlmResponse, OpenAiProvider};
pub use paper_source::{InMemoryPaperSource, PaperSource, TomlPaperSource};
pub use result_store::{AnalysisStore, FileStore, MemoryStore};
