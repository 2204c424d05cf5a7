//! 发布调度器 - 编排层
//!
//! ## 调度模型
//!
//! - 任务按账号分组，每个账号一个工作者，组内严格按提交顺序执行
//! - 不同账号的工作者并发执行，并发数由 Semaphore 限制；
//!   多个运行共享同一个 Semaphore 时限制对整个进程生效
//! - 同一账号跨运行也互斥（共享的 `AccountLocks`），先拿账号锁再占并发名额
//! - 账号任务结束后通过工厂释放该账号的浏览器资源
//! - `stop()` 为协作式：进行中的平台调用完成后才转为 Cancelled

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::AdapterFactory;
use crate::config::SchedulerConfig;
use crate::error::{ConfigError, ErrorKind};
use crate::infrastructure::AccountLocks;
use crate::models::{Account, Article};
use crate::session::SessionStore;
use crate::workflow::{
    JobBoard, JobEvents, JobFailure, JobId, JobStatus, PublishFlow, StopSignal,
};

/// 一个账号的任务队列
struct AccountQueue {
    account: Account,
    jobs: Vec<JobId>,
}

/// 工作者共享的资源
#[derive(Clone)]
struct WorkerCtx {
    config: SchedulerConfig,
    board: Arc<JobBoard>,
    factory: Arc<dyn AdapterFactory>,
    store: Arc<dyn SessionStore>,
    locks: Arc<AccountLocks>,
    limiter: Arc<Semaphore>,
    stop: StopSignal,
}

/// 发布调度器
pub struct Scheduler {
    config: SchedulerConfig,
    board: Arc<JobBoard>,
    factory: Arc<dyn AdapterFactory>,
    store: Arc<dyn SessionStore>,
    locks: Arc<AccountLocks>,
    limiter: Arc<Semaphore>,
    queues: Vec<AccountQueue>,
    stop: StopSignal,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        board: Arc<JobBoard>,
        factory: Arc<dyn AdapterFactory>,
        store: Arc<dyn SessionStore>,
        locks: Arc<AccountLocks>,
    ) -> Self {
        Self {
            limiter: Arc::new(Semaphore::new(config.max_concurrent_accounts.max(1))),
            config,
            board,
            factory,
            store,
            locks,
            queues: Vec::new(),
            stop: StopSignal::new(),
        }
    }

    /// 使用外部共享的并发限制（多个运行共用）
    pub fn with_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = limiter;
        self
    }

    /// 加入一个任务；同一 (账号, 文章) 重复时拒绝
    pub fn enqueue(&mut self, account: Account, article: Arc<Article>) -> Result<JobId, ConfigError> {
        let id = self.board.insert(account.clone(), article)?;
        match self.queues.iter_mut().find(|q| q.account.id == account.id) {
            Some(queue) => queue.jobs.push(id),
            None => self.queues.push(AccountQueue {
                account,
                jobs: vec![id],
            }),
        }
        Ok(id)
    }

    pub fn board(&self) -> Arc<JobBoard> {
        self.board.clone()
    }

    /// 停止信号，`run()` 之后仍可用来停止
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// 启动所有账号的工作者，返回状态变化事件流
    pub fn run(self) -> JobEvents {
        let events = self.board.take_events().unwrap_or_else(JobEvents::closed);
        self.board.close_if_idle();

        let ctx = WorkerCtx {
            limiter: self.limiter,
            config: self.config,
            board: self.board,
            factory: self.factory,
            store: self.store,
            locks: self.locks,
            stop: self.stop,
        };

        info!(
            "📋 共 {} 个账号、{} 个任务，当前空闲并发名额 {}",
            self.queues.len(),
            ctx.board.len(),
            ctx.limiter.available_permits()
        );

        let mut workers: Vec<(Account, Vec<JobId>, JoinHandle<()>)> = Vec::new();
        for queue in self.queues {
            let account = queue.account.clone();
            let jobs = queue.jobs.clone();
            let handle = tokio::spawn(run_account(ctx.clone(), queue));
            workers.push((account, jobs, handle));
        }

        // 监督任务：工作者异常退出时，释放账号资源并把未结束的任务标记为失败
        let board = ctx.board.clone();
        let factory = ctx.factory.clone();
        tokio::spawn(async move {
            for (account, jobs, handle) in workers {
                if let Err(e) = handle.await {
                    error!("[{}] 账号工作者异常退出: {}", account.display_name, e);
                    factory.release(&account).await;
                    let failure = JobFailure::new(ErrorKind::TransientNetwork, "工作者异常退出");
                    fail_remaining(&board, &jobs, &failure);
                }
            }
            debug!("所有账号工作者已结束");
        });

        events
    }
}

/// 执行一个账号的全部任务
async fn run_account(ctx: WorkerCtx, queue: AccountQueue) {
    let AccountQueue { account, jobs } = queue;
    let name = account.display_name.clone();

    let _account_guard = tokio::select! {
        guard = ctx.locks.acquire(&account.id) => guard,
        _ = ctx.stop.stopped() => {
            cancel_remaining(&ctx.board, &jobs);
            return;
        }
    };

    let permit = tokio::select! {
        permit = ctx.limiter.clone().acquire_owned() => permit.ok(),
        _ = ctx.stop.stopped() => None,
    };
    let Some(_permit) = permit else {
        cancel_remaining(&ctx.board, &jobs);
        return;
    };
    if ctx.stop.is_stopped() {
        cancel_remaining(&ctx.board, &jobs);
        return;
    }

    let adapter = match ctx.factory.create(&account).await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("[{}] ❌ 无法创建平台适配器: {}", name, e);
            fail_remaining(&ctx.board, &jobs, &JobFailure::from(&e));
            return;
        }
    };

    info!("[{}] 🚀 开始执行 {} 个任务", name, jobs.len());
    let flow = PublishFlow::new(
        ctx.board.clone(),
        ctx.store.clone(),
        adapter,
        ctx.config.retry.clone(),
        ctx.stop.clone(),
    );

    for (index, id) in jobs.iter().enumerate() {
        if index > 0 && !ctx.stop.is_stopped() {
            let interval = ctx.config.next_interval();
            if !interval.is_zero() {
                debug!("[{}] 等待 {:?} 后执行下一个任务", name, interval);
                ctx.stop.sleep(interval).await;
            }
        }

        let Some(job) = ctx.board.get(*id) else {
            continue;
        };
        let status = flow.run(&job).await;

        if status == JobStatus::Failed && failed_on_storage(&ctx.board, *id) {
            warn!("[{}] ⚠️ 登录状态存储不可用，跳过该账号剩余任务", name);
            let failure = JobFailure::new(ErrorKind::Storage, "登录状态存储不可用，已跳过");
            fail_remaining(&ctx.board, &jobs[index + 1..], &failure);
            break;
        }
    }

    ctx.factory.release(&account).await;
    info!("[{}] 账号任务全部结束", name);
}

fn failed_on_storage(board: &JobBoard, id: JobId) -> bool {
    board
        .get(id)
        .and_then(|job| job.last_error)
        .is_some_and(|failure| failure.kind == ErrorKind::Storage)
}

fn cancel_remaining(board: &JobBoard, jobs: &[JobId]) {
    for id in jobs {
        if board.status(*id).is_some_and(|s| !s.is_terminal()) {
            let _ = board.cancel(*id);
        }
    }
}

fn fail_remaining(board: &JobBoard, jobs: &[JobId], failure: &JobFailure) {
    for id in jobs {
        if board.status(*id).is_some_and(|s| !s.is_terminal()) {
            let _ = board.fail(*id, failure.clone());
        }
    }
}
