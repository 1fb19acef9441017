//! # Med Digest
//!
//! 一个把近期医学论文批量分析成研究摘要的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有整次运行共享的资源，只暴露记账能力
//! - `TokenBudget` - 滑动 60 秒窗口的 token 预算，所有并发单元共享
//! - `UsageLedger` - 调用用量账本
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `CallExecutor` - 带预算、重试和记账的一次 LLM 调用
//! - `LlmProvider` / `PaperSource` / `AnalysisStore` - 外部协作方
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇论文"的分析状态机
//! - `ItemCtx` - 上下文封装（批次 + 论文位置）
//! - `ItemAnalyzer` - 分类 → 提取 → 评分
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_scheduler` - 分批与批内并发
//! - `orchestrator/aggregator` - 按专科分组并生成摘要
//! - `orchestrator/pipeline` - 一次运行的生命周期
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, CallError, ProviderError};
pub use infrastructure::{TokenBudget, UsageLedger};
pub use models::{AnalysisResult, Digest, PaperRecord, Specialty};
pub use orchestrator::{DigestPipeline, RunReport};
pub use services::{CallExecutor, LlmProvider};
pub use workflow::{ItemAnalyzer, ItemCtx, ItemOutcome};
