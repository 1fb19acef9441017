//! 摘要流水线 - 编排层
//!
//! 整个应用的入口，负责一次运行的生命周期：
//!
//! 1. **初始化**：日志文件、LLM 服务方、论文来源、结果存储
//! 2. **获取论文**：来源不可用时以空摘要结束本次运行
//! 3. **调度分析**：委托 `BatchScheduler` 按批次分析
//! 4. **汇总**：委托 `Aggregator` 生成摘要并写入存储
//! 5. **报表**：输出统计与 token 用量
//!
//! 只有配置错误和论文记录不合法会让 `run` 返回错误。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, SourceError};
use crate::infrastructure::{CostModel, TokenBudget, UsageLedger};
use crate::models::{Digest, UsageSummary};
use crate::orchestrator::aggregator::Aggregator;
use crate::orchestrator::batch_scheduler::{BatchReport, BatchScheduler};
use crate::services::{
    AnalysisStore, CallExecutor, CallPolicy, FileStore, LlmProvider, OpenAiProvider, PaperSource,
    TomlPaperSource,
};
use crate::utils::logging;
use crate::workflow::ItemAnalyzer;

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub digest: Digest,
    pub usage: UsageSummary,
    pub batches: Vec<BatchReport>,
}

/// 摘要流水线
pub struct DigestPipeline {
    config: Config,
    source: Arc<dyn PaperSource>,
    store: Arc<dyn AnalysisStore>,
    budget: Arc<TokenBudget>,
    ledger: Arc<UsageLedger>,
    executor: Arc<CallExecutor>,
    cancel: CancellationToken,
}

impl DigestPipeline {
    /// 使用生产环境的协作方初始化
    pub async fn initialize(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(&config);

        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(&config));
        let source: Arc<dyn PaperSource> = Arc::new(TomlPaperSource::new(&config.paper_folder));
        let store: Arc<dyn AnalysisStore> = Arc::new(FileStore::new(&config.output_dir));

        Ok(Self::new(config, source, provider, store))
    }

    /// 使用注入的协作方创建
    pub fn new(
        config: Config,
        source: Arc<dyn PaperSource>,
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn AnalysisStore>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let budget = Arc::new(TokenBudget::new(config.max_tokens_per_minute));
        let ledger = Arc::new(UsageLedger::new(CostModel::from_config(&config)));
        let executor = Arc::new(CallExecutor::new(
            provider,
            budget.clone(),
            ledger.clone(),
            CallPolicy::from_config(&config),
            cancel.clone(),
        ));

        Self {
            config,
            source,
            store,
            budget,
            ledger,
            executor,
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 运行级取消信号
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 用量报表（只读）
    pub fn usage_summary(&self) -> UsageSummary {
        self.ledger.summary()
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// 运行一次：获取 `since` 之后的论文并生成摘要
    pub async fn run(&self, since: DateTime<Utc>) -> AppResult<RunReport> {
        if self.config.reset_budget_each_run {
            self.budget.reset();
            self.ledger.reset();
        }

        let papers = match self.source.fetch_papers(since).await {
            Ok(papers) => papers,
            Err(e @ SourceError::Unavailable { .. }) => {
                warn!("⚠️ 论文来源不可用，本次运行以空摘要结束: {}", e);
                return Ok(self.finish(Digest::empty(0), Vec::new()).await);
            }
            Err(e) => {
                error!("❌ 论文来源返回了不合法的记录: {}", e);
                return Err(e.into());
            }
        };

        if papers.is_empty() {
            warn!("⚠️ 没有找到待分析的论文，程序结束");
            return Ok(self.finish(Digest::empty(0), Vec::new()).await);
        }

        let aggregator = Arc::new(Aggregator::new(&self.config));
        let analyzer = Arc::new(ItemAnalyzer::new(self.executor.clone(), &self.config));
        let scheduler = BatchScheduler::new(
            analyzer,
            self.store.clone(),
            aggregator.clone(),
            &self.config,
            self.cancel.clone(),
        );

        let schedule = scheduler.run(papers).await;
        let digest = aggregator.finalize(schedule.attempted, &self.executor).await;

        Ok(self.finish(digest, schedule.batches).await)
    }

    /// 写入摘要并输出报表
    async fn finish(&self, digest: Digest, batches: Vec<BatchReport>) -> RunReport {
        if let Err(e) = self.store.store_digest(&digest).await {
            error!("❌ 摘要写入失败，仍返回内存中的摘要: {}", e);
        }

        let usage = self.ledger.summary();
        logging::print_final_stats(&digest, &self.config.output_log_file);
        logging::print_usage_summary(&usage);
        info!("✓ 本次运行结束");

        RunReport {
            digest,
            usage,
            batches,
        }
    }
}
