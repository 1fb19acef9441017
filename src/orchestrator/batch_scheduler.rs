//! 批次调度器 - 编排层
//!
//! ## 职责
//!
//! 1. **分批**：把论文列表按固定大小切成批次
//! 2. **并发控制**：批内使用 Semaphore 限制同时分析的论文数量
//! 3. **顺序推进**：上一批所有论文进入终态后才开始下一批
//! 4. **失败隔离**：单篇失败只记入诊断，不影响同批和后续批次
//! 5. **取消**：收到取消信号后不再启动新的论文，已启动的自然结束
//! 6. **去重**：重复的论文标识在调度前跳过，只分析首次出现的那一篇
//!
//! ## 设计特点
//!
//! - **不做分析**：委托 `ItemAnalyzer` 处理单篇论文
//! - **只写不读**：每篇完成的论文写入存储一次，写入失败只记录日志

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::Config;
use crate::models::{AnalysisStage, PaperRecord};
use crate::orchestrator::aggregator::Aggregator;
use crate::services::AnalysisStore;
use crate::utils::logging;
use crate::workflow::{failed_item, ItemAnalyzer, ItemCtx, ItemOutcome, CANCELLED_BEFORE_START};

/// 单个批次的处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 批次编号（从1开始）
    pub batch_index: usize,
    pub size: usize,
    pub completed: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn failure_ratio(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.failed as f64 / self.size as f64
        }
    }
}

/// 整次调度的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub attempted: usize,
    pub batches: Vec<BatchReport>,
}

impl ScheduleReport {
    pub fn completed(&self) -> usize {
        self.batches.iter().map(|b| b.completed).sum()
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(|b| b.failed).sum()
    }
}

/// 批次调度器
pub struct BatchScheduler {
    analyzer: Arc<ItemAnalyzer>,
    store: Arc<dyn AnalysisStore>,
    aggregator: Arc<Aggregator>,
    batch_size: usize,
    max_concurrent_items: usize,
    failure_threshold: f64,
    cancel: CancellationToken,
}

impl BatchScheduler {
    pub fn new(
        analyzer: Arc<ItemAnalyzer>,
        store: Arc<dyn AnalysisStore>,
        aggregator: Arc<Aggregator>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            analyzer,
            store,
            aggregator,
            batch_size: config.batch_size.max(1),
            max_concurrent_items: config.max_concurrent_items.max(1),
            failure_threshold: config.batch_failure_threshold,
            cancel,
        }
    }

    /// 处理全部论文
    pub async fn run(&self, papers: Vec<PaperRecord>) -> ScheduleReport {
        let attempted = papers.len();
        let (papers, duplicates) = drop_repeated_ids(papers);
        if duplicates > 0 {
            warn!("🔁 跳过 {} 篇重复标识的论文", duplicates);
            self.aggregator.skip_duplicates(duplicates);
        }

        let total = papers.len();
        let total_batches = (total + self.batch_size - 1) / self.batch_size;
        let mut report = ScheduleReport {
            attempted,
            batches: Vec::with_capacity(total_batches),
        };

        logging::log_papers_loaded(total, self.batch_size, self.max_concurrent_items);

        for (batch_offset, batch) in papers.chunks(self.batch_size).enumerate() {
            let batch_index = batch_offset + 1;
            let batch_start = batch_offset * self.batch_size;

            logging::log_batch_start(
                batch_index,
                total_batches,
                batch_start + 1,
                batch_start + batch.len(),
                total,
            );

            let batch_report = self
                .process_batch(batch, batch_index, batch_start, total)
                .await;

            logging::log_batch_complete(&batch_report);
            if batch_report.failure_ratio() > self.failure_threshold {
                warn!(
                    "⚠️ 第 {} 批失败比例 {:.0}% 超过阈值 {:.0}%，继续处理后续批次",
                    batch_index,
                    batch_report.failure_ratio() * 100.0,
                    self.failure_threshold * 100.0
                );
            }
            report.batches.push(batch_report);
        }

        report
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch: &[PaperRecord],
        batch_index: usize,
        batch_start: usize,
        total: usize,
    ) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_items));
        let mut report = BatchReport {
            batch_index,
            size: batch.len(),
            ..Default::default()
        };
        let mut handles = Vec::new();

        // 为本批创建并发任务
        for (idx, paper) in batch.iter().enumerate() {
            let position = batch_start + idx;

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit.filter(|_| !self.cancel.is_cancelled()) else {
                self.aggregator.add_failure(
                    position,
                    failed_item(paper, AnalysisStage::Pending, CANCELLED_BEFORE_START),
                );
                report.failed += 1;
                continue;
            };

            let ctx = ItemCtx::new(paper.paper_id.clone(), batch_index, position + 1, total);
            let paper = paper.clone();
            let analyzer = self.analyzer.clone();
            let store = self.store.clone();
            let aggregator = self.aggregator.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                match analyzer.analyze(&paper, &ctx).await {
                    ItemOutcome::Complete(result) => {
                        // 只有被摘要收录的结果才写入存储
                        if aggregator.add_result(position, result.clone()) {
                            if let Err(e) = store.store_analysis(&result).await {
                                error!("{} ❌ 分析结果写入失败: {}", ctx, e);
                            }
                        }
                        true
                    }
                    ItemOutcome::Failed(failed) => {
                        aggregator.add_failure(position, failed);
                        false
                    }
                }
            });
            handles.push((position, batch[idx].clone(), handle));
        }

        // 等待本批所有任务完成
        let (meta, futures): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .map(|(position, paper, handle)| ((position, paper), handle))
            .unzip();

        for ((position, paper), joined) in meta.into_iter().zip(join_all(futures).await) {
            match joined {
                Ok(true) => report.completed += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    error!("[批次 {} 论文 {}/{}] 任务执行失败: {}", batch_index, position + 1, total, e);
                    self.aggregator.add_failure(
                        position,
                        failed_item(&paper, AnalysisStage::Pending, format!("任务执行失败: {}", e)),
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

/// 按论文标识去重，保留首次出现的论文，返回 (去重后的论文, 跳过数量)
pub fn drop_repeated_ids(papers: Vec<PaperRecord>) -> (Vec<PaperRecord>, usize) {
    let total = papers.len();
    let mut seen = HashSet::new();
    let unique: Vec<PaperRecord> = papers
        .into_iter()
        .filter(|paper| seen.insert(paper.paper_id.clone()))
        .collect();
    let skipped = total - unique.len();
    (unique, skipped)
}
