use anyhow::Result;
use chrono::Utc;
use tracing::warn;

use med_digest::utils::logging;
use med_digest::{Config, DigestPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env()?;
    let since = Utc::now() - chrono::Duration::days(i64::from(config.lookback_days));

    // 初始化应用
    let pipeline = DigestPipeline::initialize(config).await?;

    // Ctrl-C 只阻止新的调用和新的论文，进行中的调用自然结束
    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹️ 收到中断信号，停止启动新的分析");
            cancel.cancel();
        }
    });

    let report = pipeline.run(since).await?;
    if report.digest.is_partial() {
        warn!(
            "⚠️ 部分完成: {}/{}",
            report.digest.total_papers, report.digest.attempted
        );
    }

    Ok(())
}
