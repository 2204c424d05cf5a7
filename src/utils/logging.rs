/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::{info, warn};

use crate::orchestrator::RunStatus;
use crate::workflow::JobStatus;

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 同时发布的账号数量
/// - `jobs`: 本次运行的任务数
pub fn log_startup(max_concurrent: usize, jobs: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多账号自媒体发布");
    info!("📊 同时发布账号数: {}", max_concurrent);
    info!("📋 待发布任务数: {}", jobs);
    info!("{}", "=".repeat(60));
}

/// 打印运行结束后的统计信息
pub fn log_run_summary(status: &RunStatus, log_file_path: Option<&str>) {
    let counts = &status.counts;
    info!("\n{}", "=".repeat(60));
    info!("📊 运行 {} 完成统计", status.run);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已发布: {}/{}", counts.published, counts.total());
    info!("❌ 失败: {}", counts.failed);
    info!("⏹ 已取消: {}", counts.cancelled);

    for job in status.jobs.iter().filter(|j| j.status == JobStatus::Failed) {
        warn!(
            "  {} {} / {}: {}",
            job.job,
            job.account,
            job.article,
            job.message.as_deref().unwrap_or("-")
        );
    }
    info!("{}", "=".repeat(60));
    if let Some(path) = log_file_path {
        info!("\n发布记录已保存至: {}", path);
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
