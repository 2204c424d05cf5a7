//! 发布流程 - 流程层
//!
//! 核心职责：定义"一篇文章发到一个账号"的完整流程
//!
//! 流程顺序：
//! 1. 读取登录状态 → 登录检测（失效时强制重新登录一次）
//! 2. 准备内容
//! 3. 提交（网络异常按退避策略重试；登录失效时回到登录阶段）

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapters::{LoginCheck, PlatformAdapter, PreparedContent, PublishReceipt};
use crate::config::RetryPolicy;
use crate::error::{AdapterError, ErrorKind, StorageError};
use crate::models::Session;
use crate::session::SessionStore;

use super::board::JobBoard;
use super::job::{JobFailure, JobStatus, PublishJob};
use super::stop::StopSignal;

/// 流程提前结束的原因
#[derive(Debug)]
enum Halt {
    Failed(JobFailure),
    Cancelled,
}

impl From<AdapterError> for Halt {
    fn from(err: AdapterError) -> Self {
        Halt::Failed(JobFailure::from(&err))
    }
}

impl From<StorageError> for Halt {
    fn from(err: StorageError) -> Self {
        Halt::Failed(JobFailure::from(&err))
    }
}

/// 提交阶段的结果
enum Submitted {
    Done(PublishReceipt),
    /// 提交时发现登录失效，需要回到登录阶段
    AuthExpired(String),
}

/// 发布流程
///
/// - 驱动单个任务走完状态机
/// - 负责登录状态的读取、刷新和保存（适配器不接触存储）
/// - 所有适配器错误在这里分类，不会向上层泄漏
pub struct PublishFlow {
    board: Arc<JobBoard>,
    store: Arc<dyn SessionStore>,
    adapter: Arc<dyn PlatformAdapter>,
    retry: RetryPolicy,
    stop: StopSignal,
}

impl PublishFlow {
    pub fn new(
        board: Arc<JobBoard>,
        store: Arc<dyn SessionStore>,
        adapter: Arc<dyn PlatformAdapter>,
        retry: RetryPolicy,
        stop: StopSignal,
    ) -> Self {
        Self {
            board,
            store,
            adapter,
            retry,
            stop,
        }
    }

    /// 执行任务，返回最终状态
    pub async fn run(&self, job: &PublishJob) -> JobStatus {
        let name = &job.account.display_name;
        info!("[{}] 📝 开始任务 {}: {}", name, job.id, job.article);

        let result = match self.drive(job).await {
            Ok(receipt) => {
                info!(
                    "[{}] ✅ 发布成功: {} (平台文章ID: {})",
                    name,
                    job.article.title,
                    receipt.platform_article_id.as_deref().unwrap_or("-")
                );
                self.board.publish(job.id, &receipt)
            }
            Err(Halt::Failed(failure)) => {
                warn!("[{}] ❌ 任务 {} 失败: {}", name, job.id, failure);
                self.board.fail(job.id, failure)
            }
            Err(Halt::Cancelled) => {
                info!("[{}] ⏹ 任务 {} 已取消", name, job.id);
                self.board.cancel(job.id)
            }
        };

        match result {
            Ok(event) => event.to,
            Err(e) => {
                error!("[{}] {}", name, e);
                self.board.status(job.id).unwrap_or(JobStatus::Cancelled)
            }
        }
    }

    async fn drive(&self, job: &PublishJob) -> Result<PublishReceipt, Halt> {
        self.checkpoint()?;
        let session = self.store.load(job.account_id()).await?;

        self.enter(job, JobStatus::LoggingIn)?;
        let mut reauthenticated = false;
        self.ensure_login(job, session, &mut reauthenticated).await?;
        self.log_nickname(job).await;

        loop {
            self.enter(job, JobStatus::Preparing)?;
            let content = self.adapter.prepare(&job.article).await?;
            debug!("[{}] 内容已准备: {}", job.account.display_name, content.title);

            match self.submit_with_retry(job, &content).await? {
                Submitted::Done(receipt) => return Ok(receipt),
                Submitted::AuthExpired(message) => {
                    if reauthenticated {
                        return Err(Halt::Failed(JobFailure::new(
                            ErrorKind::AuthExpired,
                            message,
                        )));
                    }
                    warn!(
                        "[{}] 提交时登录失效: {}",
                        job.account.display_name, message
                    );
                    self.enter(job, JobStatus::LoggingIn)?;
                    self.reauthenticate(job, &mut reauthenticated).await?;
                }
            }
        }
    }

    /// 登录检测；未通过时强制重新登录一次
    async fn ensure_login(
        &self,
        job: &PublishJob,
        session: Option<Session>,
        reauthenticated: &mut bool,
    ) -> Result<(), Halt> {
        let name = &job.account.display_name;
        let check = match self.adapter.check_login(session.as_ref()).await {
            Ok(check) => check,
            Err(AdapterError::AuthExpired(message)) => {
                debug!("[{}] 登录检测报告失效: {}", name, message);
                LoginCheck::rejected()
            }
            Err(e) => return Err(e.into()),
        };

        if check.authenticated {
            if let Some(refreshed) = check.refreshed {
                self.store.save(job.account_id(), &refreshed).await?;
                debug!("[{}] 已保存刷新后的登录状态", name);
            }
            return Ok(());
        }

        info!("[{}] 登录状态无效，需要重新登录", name);
        self.enter(job, JobStatus::LoggingIn)?;
        self.reauthenticate(job, reauthenticated).await
    }

    /// 记录当前登录的账号昵称，读取失败不影响发布
    async fn log_nickname(&self, job: &PublishJob) {
        let name = &job.account.display_name;
        match self.adapter.nickname().await {
            Ok(Some(nickname)) => info!("[{}] 当前登录账号: {}", name, nickname),
            Ok(None) => debug!("[{}] 未读取到账号昵称", name),
            Err(e) => debug!("[{}] 读取账号昵称失败: {}", name, e),
        }
    }

    async fn reauthenticate(&self, job: &PublishJob, reauthenticated: &mut bool) -> Result<(), Halt> {
        *reauthenticated = true;
        self.store.invalidate(job.account_id()).await?;
        self.checkpoint()?;

        let session = self.adapter.authenticate().await?;
        self.store.save(job.account_id(), &session).await?;
        info!("[{}] ✓ 重新登录成功，已保存登录状态", job.account.display_name);
        Ok(())
    }

    async fn submit_with_retry(
        &self,
        job: &PublishJob,
        content: &PreparedContent,
    ) -> Result<Submitted, Halt> {
        let name = &job.account.display_name;
        let mut retries = 0;

        loop {
            self.checkpoint()?;
            self.board.begin_attempt(job.id).map_err(|e| {
                error!("[{}] {}", name, e);
                Halt::Cancelled
            })?;

            match self.adapter.submit(content).await {
                Ok(receipt) => return Ok(Submitted::Done(receipt)),
                Err(AdapterError::AuthExpired(message)) => {
                    return Ok(Submitted::AuthExpired(message))
                }
                Err(AdapterError::TransientNetwork(message)) => {
                    if self.stop.is_stopped() {
                        return Err(Halt::Cancelled);
                    }
                    if retries >= self.retry.max_submit_retries {
                        return Err(Halt::Failed(JobFailure::new(
                            ErrorKind::TransientNetwork,
                            format!("重试 {} 次后仍失败: {}", retries, message),
                        )));
                    }
                    retries += 1;
                    let delay = self.retry.backoff(retries);
                    warn!(
                        "[{}] ⚠️ 提交失败 ({}), {} 毫秒后第 {} 次重试",
                        name,
                        message,
                        delay.as_millis(),
                        retries
                    );
                    if !self.stop.sleep(delay).await {
                        return Err(Halt::Cancelled);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if self.stop.is_stopped() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 检查停止请求后转换状态
    fn enter(&self, job: &PublishJob, to: JobStatus) -> Result<(), Halt> {
        self.checkpoint()?;
        self.board.advance(job.id, to).map(|_| ()).map_err(|e| {
            error!("[{}] {}", job.account.display_name, e);
            Halt::Cancelled
        })
    }
}
