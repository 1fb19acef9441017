/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use anyhow::{Context, Result};
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{Digest, ScoreDistribution, UsageSummary};
use crate::orchestrator::BatchReport;

/// 初始化 tracing 订阅器
///
/// 优先使用 `RUST_LOG`，未设置时默认 `info`。重复调用是安全的。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n医学论文摘要运行日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 医学论文批量分析模式");
    info!("🤖 模型: {}", config.llm_model_name);
    info!("🪙 每分钟 token 上限: {}", config.max_tokens_per_minute);
    info!(
        "📊 每批 {} 篇，批内最大并发: {}",
        config.batch_size, config.max_concurrent_items
    );
    info!("{}", "=".repeat(60));
}

/// 记录论文加载信息
pub fn log_papers_loaded(total: usize, batch_size: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 篇待分析的论文", total);
    info!(
        "📋 将以每批 {} 篇、批内并发 {} 的方式处理",
        batch_size, max_concurrent
    );
    info!("💡 每批完成后再开始下一批\n");
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `start`: 起始论文编号
/// - `end`: 结束论文编号
/// - `total`: 论文总数
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批论文: {}-{} / 共 {} 篇", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(report: &BatchReport) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 批完成: 成功 {}/{}",
        report.batch_index, report.completed, report.size
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(digest: &Digest, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", digest.total_papers, digest.attempted);
    info!("❌ 失败: {}", digest.failed.len());
    if digest.duplicates_skipped > 0 {
        info!("🔁 重复跳过: {}", digest.duplicates_skipped);
    }
    info!("⭐ 高关注度论文: {}", digest.high_interest_count);

    for (specialty, count) in digest.specialty_counts() {
        info!("  - {}: {} 篇", specialty, count);
    }

    let distribution = &digest.score_distribution;
    if let Some(mean) = distribution.mean {
        info!("📈 平均兴趣分数: {:.2}", mean);
        for (index, count) in distribution.buckets.iter().enumerate() {
            info!("  [{}] {}", ScoreDistribution::bucket_label(index), count);
        }
    }

    for failed in &digest.failed {
        info!(
            "  ✗ {} ({}): {}",
            truncate_text(&failed.title, 60),
            failed.stage,
            failed.reason
        );
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 打印 token 用量报表
pub fn print_usage_summary(usage: &UsageSummary) {
    info!("\n{}", "─".repeat(60));
    info!("🪙 Token 用量");
    info!(
        "调用次数: {} (失败 {})",
        usage.total_calls, usage.failed_calls
    );
    info!(
        "输入: {} / 输出: {} / 合计: {}",
        usage.input_tokens,
        usage.output_tokens,
        usage.total_tokens()
    );
    info!("估算费用: ${:.4}", usage.total_cost_usd);
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("心脏病学研究进展", 4), "心脏病学...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        init_log_file(path.to_str().unwrap()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("医学论文摘要运行日志"));
    }
}
