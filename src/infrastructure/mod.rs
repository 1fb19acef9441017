//! 基础设施层
//!
//! 持有整次运行共享的资源，只暴露记账能力：
//!
//! - `TokenBudget` - 滑动窗口 token 预算，所有并发单元共享的唯一资源
//! - `UsageLedger` - 调用用量账本（报表来源）

pub mod token_budget;
pub mod usage_ledger;

pub use token_budget::{Grant, Reservation, TokenBudget, BUDGET_WINDOW};
pub use usage_ledger::{CostModel, UsageLedger};
