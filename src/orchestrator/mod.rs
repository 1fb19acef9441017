//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量调度和汇总，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 摘要流水线
//! - 管理一次运行的生命周期（初始化、运行、报表）
//! - 持有共享资源（TokenBudget、UsageLedger、CancellationToken）
//!
//! ### `batch_scheduler` - 批次调度器
//! - 分批、批内并发（Semaphore）、批间顺序推进
//!
//! ### `aggregator` - 结果汇总器
//! - 去重、按专科分组、统计、叙述字段汇总调用
//!
//! ## 层次关系
//!
//! ```text
//! pipeline (一次运行)
//!     ↓
//! batch_scheduler (处理 Vec<PaperRecord>)  →  aggregator (生成 Digest)
//!     ↓
//! workflow::ItemAnalyzer (处理单篇论文)
//!     ↓
//! services (能力层：call_executor / llm_provider / paper_source / result_store)
//!     ↓
//! infrastructure (基础设施：TokenBudget / UsageLedger)
//! ```

pub mod aggregator;
pub mod batch_scheduler;
pub mod pipeline;

// 重新导出主要类型
pub use aggregator::{fold, Aggregator};
pub use batch_scheduler::{BatchReport, BatchScheduler, ScheduleReport};
pub use pipeline::{DigestPipeline, RunReport};
