//! 单篇论文分析流程 - 流程层
//!
//! 核心职责：定义"一篇论文"的完整分析流程
//!
//! 状态机：
//! ```text
//! Pending → Classifying → Extracting → Scoring → Complete
//!    └──────────┴─────────────┴───────────┴────→ Failed
//! ```
//!
//! - 每个阶段恰好对应一次 `CallExecutor` 调用（加上有限次阶段重试）
//! - 调用执行器自身无法消化的临时性错误、格式错误的响应：留在当前阶段重试
//! - 永久性错误、预算耗尽、运行取消：直接进入 `Failed`

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::CallError;
use crate::models::{AnalysisResult, AnalysisStage, FailedItem, PaperRecord, Specialty};
use crate::services::CallExecutor;
use crate::workflow::item_ctx::ItemCtx;
use crate::workflow::prompts;
use crate::workflow::response_parser::{self, Extraction, ParseError};

/// 取消导致论文未开始分析时记录的原因
pub const CANCELLED_BEFORE_START: &str = "cancelled before start";

/// 分析状态
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisState {
    Pending,
    Classifying,
    Extracting {
        specialty: Specialty,
    },
    Scoring {
        specialty: Specialty,
        extraction: Extraction,
    },
    Complete(AnalysisResult),
    Failed(FailedItem),
}

impl AnalysisState {
    /// 当前所处阶段（终态返回 `None`）
    pub fn stage(&self) -> Option<AnalysisStage> {
        match self {
            AnalysisState::Pending => Some(AnalysisStage::Pending),
            AnalysisState::Classifying => Some(AnalysisStage::Classifying),
            AnalysisState::Extracting { .. } => Some(AnalysisStage::Extracting),
            AnalysisState::Scoring { .. } => Some(AnalysisStage::Scoring),
            AnalysisState::Complete(_) | AnalysisState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_none()
    }
}

/// 单篇论文的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Complete(AnalysisResult),
    Failed(FailedItem),
}

impl ItemOutcome {
    pub fn paper_id(&self) -> &str {
        match self {
            ItemOutcome::Complete(result) => &result.paper_id,
            ItemOutcome::Failed(failed) => &failed.paper_id,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ItemOutcome::Complete(_))
    }
}

/// 构造失败记录
pub fn failed_item(paper: &PaperRecord, stage: AnalysisStage, reason: impl Into<String>) -> FailedItem {
    FailedItem {
        paper_id: paper.paper_id.clone(),
        title: paper.title.clone(),
        stage,
        reason: reason.into(),
        failed_at: Utc::now(),
    }
}

/// 阶段内一次尝试失败的原因
enum AttemptError {
    Call(CallError),
    Parse(ParseError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Call(err) => err.is_transient(),
            AttemptError::Parse(_) => true,
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Call(err) => write!(f, "{}", err),
            AttemptError::Parse(err) => write!(f, "响应格式错误: {}", err),
        }
    }
}

/// 单篇论文分析流程
///
/// - 编排 分类 → 提取 → 评分 三个阶段
/// - 不持有预算和服务方，只依赖 `CallExecutor`
/// - 不认识批次，只处理单篇论文
pub struct ItemAnalyzer {
    executor: Arc<CallExecutor>,
    default_specialty: Specialty,
    stage_retries: u32,
    verbose_logging: bool,
}

impl ItemAnalyzer {
    pub fn new(executor: Arc<CallExecutor>, config: &Config) -> Self {
        Self {
            executor,
            default_specialty: config.default_specialty,
            stage_retries: config.stage_retries,
            verbose_logging: config.verbose_logging,
        }
    }

    /// 把论文推进到终态
    pub async fn analyze(&self, paper: &PaperRecord, ctx: &ItemCtx) -> ItemOutcome {
        let mut state = AnalysisState::Pending;
        loop {
            state = match state {
                AnalysisState::Complete(result) => return ItemOutcome::Complete(result),
                AnalysisState::Failed(failed) => return ItemOutcome::Failed(failed),
                current => self.step(current, paper, ctx).await,
            };
        }
    }

    /// 执行一次状态转移
    pub async fn step(&self, state: AnalysisState, paper: &PaperRecord, ctx: &ItemCtx) -> AnalysisState {
        match state {
            AnalysisState::Pending => {
                if self.executor.is_cancelled() {
                    warn!("{} ⏹️ 运行已取消，跳过: {}", ctx, paper);
                    return AnalysisState::Failed(failed_item(
                        paper,
                        AnalysisStage::Pending,
                        CANCELLED_BEFORE_START,
                    ));
                }
                info!("{} 📄 开始分析: {}", ctx, paper);
                if self.verbose_logging {
                    debug!("{} 摘要预览: {}", ctx, paper.abstract_preview(120));
                }
                AnalysisState::Classifying
            }

            // ========== 阶段 1: 专科分类 ==========
            AnalysisState::Classifying => {
                let default = self.default_specialty;
                let prompt = prompts::classification_prompt(paper);
                match self
                    .run_stage(AnalysisStage::Classifying, ctx, &prompt, |response| {
                        Ok(response_parser::parse_specialty(response, default))
                    })
                    .await
                {
                    Ok(specialty) => {
                        info!("{} 🏷️ 专科: {}", ctx, specialty);
                        AnalysisState::Extracting { specialty }
                    }
                    Err(reason) => {
                        AnalysisState::Failed(failed_item(paper, AnalysisStage::Classifying, reason))
                    }
                }
            }

            // ========== 阶段 2: 关键词提取 ==========
            AnalysisState::Extracting { specialty } => {
                let prompt = prompts::extraction_prompt(paper);
                match self
                    .run_stage(
                        AnalysisStage::Extracting,
                        ctx,
                        &prompt,
                        response_parser::parse_extraction,
                    )
                    .await
                {
                    Ok(extraction) => {
                        info!("{} 🔑 关键词: {}", ctx, extraction.keywords.join(", "));
                        AnalysisState::Scoring {
                            specialty,
                            extraction,
                        }
                    }
                    Err(reason) => {
                        AnalysisState::Failed(failed_item(paper, AnalysisStage::Extracting, reason))
                    }
                }
            }

            // ========== 阶段 3: 兴趣评分 ==========
            AnalysisState::Scoring {
                specialty,
                extraction,
            } => {
                let prompt =
                    prompts::scoring_prompt(paper, specialty, &extraction.keywords, &extraction.focus);
                match self
                    .run_stage(AnalysisStage::Scoring, ctx, &prompt, response_parser::parse_score)
                    .await
                {
                    Ok(reconciled) => {
                        if reconciled.corrected {
                            warn!(
                                "{} ⚠️ 兴趣分数与分项之和不一致，已按分项校正为 {:.2}",
                                ctx, reconciled.score
                            );
                        }
                        info!("{} ✅ 分析完成，兴趣分数: {:.2}", ctx, reconciled.score);
                        AnalysisState::Complete(AnalysisResult {
                            paper_id: paper.paper_id.clone(),
                            title: paper.title.clone(),
                            authors: paper.authors.clone(),
                            specialty,
                            keywords: extraction.keywords,
                            focus: extraction.focus,
                            interest_score: reconciled.score,
                            score_breakdown: reconciled.breakdown,
                            analyzed_at: Utc::now(),
                        })
                    }
                    Err(reason) => {
                        AnalysisState::Failed(failed_item(paper, AnalysisStage::Scoring, reason))
                    }
                }
            }

            terminal => terminal,
        }
    }

    /// 执行一个阶段：一次调用 + 解析，可重试的失败最多再试 `stage_retries` 次
    async fn run_stage<T, F>(
        &self,
        stage: AnalysisStage,
        ctx: &ItemCtx,
        prompt: &str,
        parse: F,
    ) -> Result<T, String>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match self.executor.execute(prompt).await {
                Ok(response) => parse(&response).map_err(AttemptError::Parse),
                Err(err) => Err(AttemptError::Call(err)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.stage_retries => {
                    attempt += 1;
                    warn!(
                        "{} 🔁 {}失败，阶段重试 {}/{}: {}",
                        ctx, stage, attempt, self.stage_retries, err
                    );
                }
                Err(err) => {
                    warn!("{} ❌ {}失败: {}", ctx, stage, err);
                    return Err(err.to_string());
                }
            }
        }
    }
}
