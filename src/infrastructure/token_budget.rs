//! Token 预算 - 基础设施层
//!
//! 持有全局唯一的共享资源：滑动 60 秒窗口内的 token 额度。
//!
//! - `reserve` 从不阻塞，额度不足时只报告需要等待多久，由调用方决定睡眠还是放弃
//! - 内部状态由一把互斥锁保护，锁只在记账期间持有，绝不跨越网络调用
//! - 一个 [`Grant`] 必须被 `commit` 或 `release` 消费

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// 预算窗口长度
pub const BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// 一次成功的额度预留
#[derive(Debug, PartialEq, Eq)]
#[must_use = "Grant 必须通过 commit 或 release 归还"]
pub struct Grant {
    id: u64,
    tokens: u64,
}

impl Grant {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 预留的 token 数
    pub fn tokens(&self) -> u64 {
        self.tokens
    }
}

/// `reserve` 的结果
#[derive(Debug, PartialEq, Eq)]
pub enum Reservation {
    Granted(Grant),
    /// 需要等待的时长（足够多的旧预留移出窗口后才有额度）
    MustWait(Duration),
}

#[derive(Debug)]
struct Entry {
    id: u64,
    tokens: u64,
    reserved_at: Instant,
}

#[derive(Debug, Default)]
struct BudgetState {
    entries: VecDeque<Entry>,
    next_id: u64,
}

impl BudgetState {
    /// 移除已经滑出窗口的预留
    fn prune(&mut self, now: Instant, window: Duration) {
        self.entries
            .retain(|entry| now.saturating_duration_since(entry.reserved_at) < window);
    }

    fn active_tokens(&self) -> u64 {
        self.entries.iter().map(|entry| entry.tokens).sum()
    }
}

/// 滑动窗口 token 预算
#[derive(Debug)]
pub struct TokenBudget {
    ceiling: u64,
    window: Duration,
    state: Mutex<BudgetState>,
}

impl TokenBudget {
    /// 创建每分钟上限为 `ceiling` 的预算
    pub fn new(ceiling: u64) -> Self {
        Self::with_window(ceiling, BUDGET_WINDOW)
    }

    pub fn with_window(ceiling: u64, window: Duration) -> Self {
        Self {
            ceiling,
            window,
            state: Mutex::new(BudgetState::default()),
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 预留 `estimated_tokens` 个 token
    ///
    /// 超过整个上限的请求按上限预留，只有窗口完全空闲时才能获得额度。
    pub fn reserve(&self, estimated_tokens: u64) -> Reservation {
        self.reserve_at(estimated_tokens, Instant::now())
    }

    /// 以指定时刻预留（供确定性测试使用）
    pub fn reserve_at(&self, estimated_tokens: u64, now: Instant) -> Reservation {
        let tokens = estimated_tokens.min(self.ceiling);
        let mut state = self.lock();
        state.prune(now, self.window);

        let active = state.active_tokens();
        if active + tokens <= self.ceiling {
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push_back(Entry {
                id,
                tokens,
                reserved_at: now,
            });
            debug!(grant = id, tokens, active = active + tokens, "token 额度已预留");
            return Reservation::Granted(Grant { id, tokens });
        }

        Reservation::MustWait(self.wait_for(&state, active + tokens - self.ceiling, now))
    }

    /// 计算释放 `excess` 个 token 需要等待多久
    fn wait_for(&self, state: &BudgetState, excess: u64, now: Instant) -> Duration {
        let mut oldest: Vec<(Instant, u64)> = state
            .entries
            .iter()
            .map(|entry| (entry.reserved_at, entry.tokens))
            .collect();
        oldest.sort_by_key(|(reserved_at, _)| *reserved_at);

        let mut freed = 0u64;
        for (reserved_at, tokens) in oldest {
            freed += tokens;
            if freed >= excess {
                return (reserved_at + self.window).saturating_duration_since(now);
            }
        }
        self.window
    }

    /// 用实际用量替换预留值，不再检查上限
    pub fn commit(&self, grant: Grant, actual_input_tokens: u64, actual_output_tokens: u64) {
        let actual = actual_input_tokens + actual_output_tokens;
        let mut state = self.lock();
        if let Some(entry) = state.entries.iter_mut().find(|entry| entry.id == grant.id) {
            entry.tokens = actual;
        }
        debug!(grant = grant.id, reserved = grant.tokens, actual, "token 用量已确认");
    }

    /// 调用未消耗 token 时归还整笔预留
    pub fn release(&self, grant: Grant) {
        let mut state = self.lock();
        state.entries.retain(|entry| entry.id != grant.id);
        debug!(grant = grant.id, tokens = grant.tokens, "token 额度已归还");
    }

    /// 当前窗口内仍计入上限的 token 数
    pub fn active_tokens(&self) -> u64 {
        self.active_tokens_at(Instant::now())
    }

    pub fn active_tokens_at(&self, now: Instant) -> u64 {
        let mut state = self.lock();
        state.prune(now, self.window);
        state.active_tokens()
    }

    /// 清空全部预留（新一次运行开始时）
    pub fn reset(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
