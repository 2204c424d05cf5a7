use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use self_media_publisher::adapters::BrowserAdapterFactory;
use self_media_publisher::browser::open_browser;
use self_media_publisher::models::{load_accounts, load_all_articles};
use self_media_publisher::orchestrator::{distribute, PublishLog, RunController};
use self_media_publisher::session::FileSessionStore;
use self_media_publisher::utils::{log_run_summary, log_startup};
use self_media_publisher::{logger, AppError, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env().map_err(AppError::from)?;

    // 初始化日志
    logger::init(config.verbose_logging);

    let accounts = load_accounts(Path::new(&config.accounts_file))
        .await
        .map_err(AppError::from)
        .with_context(|| format!("加载账号配置失败: {}", config.accounts_file))?;
    let articles = load_all_articles(&config.articles_folder)
        .await
        .with_context(|| format!("加载文章失败: {}", config.articles_folder))?;
    info!("✓ 加载 {} 个账号, {} 篇文章", accounts.len(), articles.len());

    let selection = distribute(&accounts, &articles);
    if selection.is_empty() {
        warn!("没有需要发布的任务");
        return Ok(());
    }
    log_startup(config.max_concurrent_accounts, selection.len());

    let browser = Arc::new(open_browser(&config).await?);
    let factory = Arc::new(BrowserAdapterFactory::new(
        browser,
        config.adapter_settings(),
    ));
    let store = Arc::new(FileSessionStore::new(&config.session_dir));
    let log = Arc::new(PublishLog::with_path(&config.publish_log_file));

    let controller = RunController::new(
        config.scheduler(),
        accounts,
        articles,
        factory,
        store,
        log,
    );
    let mut handle = controller.start(&selection).map_err(AppError::from)?;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => info!(
                    "[{}] {} {} : {} → {}",
                    event.account, event.job, event.article, event.from, event.to
                ),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("⏹ 收到中断信号，正在停止（进行中的提交会先完成）");
                controller.stop(handle.id());
            }
        }
    }

    let status = handle.wait().await;
    controller.publish_log().flush().await;
    log_run_summary(&status, Some(&config.publish_log_file));
    Ok(())
}
