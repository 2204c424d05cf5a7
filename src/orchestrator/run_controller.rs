//! 运行控制器 - 编排层
//!
//! 面向界面/命令行的入口：`start(selection)`、`stop(run)`、`status(run)`。
//! 适配器错误在调度器内部分类，这里只能观察到任务状态。
//!
//! 所有运行共享同一个并发限制和账号锁。已结束的运行只保留最近
//! `KEPT_FINISHED_RUNS` 个，也可以用 `forget` 主动移除。

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::adapters::AdapterFactory;
use crate::config::SchedulerConfig;
use crate::error::{ConfigError, ErrorKind};
use crate::infrastructure::AccountLocks;
use crate::models::{Account, AccountId, Article, ArticleId};
use crate::session::SessionStore;
use crate::workflow::{
    JobBoard, JobEvent, JobEvents, JobId, JobStatus, JobTransition, RunId, StopSignal,
};

use super::publish_log::PublishLog;
use super::scheduler::Scheduler;
use super::selection::find_duplicate;

/// 运行的整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    CompletedWithFailures,
    Cancelled,
}

/// 各状态的任务数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub logging_in: usize,
    pub preparing: usize,
    pub submitting: usize,
    pub published: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::LoggingIn => self.logging_in,
            JobStatus::Preparing => self.preparing,
            JobStatus::Submitting => self.submitting,
            JobStatus::Published => self.published,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    fn slot(&mut self, status: JobStatus) -> &mut usize {
        match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::LoggingIn => &mut self.logging_in,
            JobStatus::Preparing => &mut self.preparing,
            JobStatus::Submitting => &mut self.submitting,
            JobStatus::Published => &mut self.published,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Cancelled => &mut self.cancelled,
        }
    }

    pub fn total(&self) -> usize {
        JobStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    /// 未进入终态的任务数
    pub fn active(&self) -> usize {
        self.pending + self.logging_in + self.preparing + self.submitting
    }
}

/// 单个任务的摘要
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job: JobId,
    pub account: AccountId,
    pub article: ArticleId,
    pub status: JobStatus,
    pub attempts: u32,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub platform_article_id: Option<String>,
    pub history: Vec<JobTransition>,
}

/// 运行状态快照
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run: RunId,
    pub state: RunState,
    pub counts: StatusCounts,
    pub jobs: Vec<JobSummary>,
}

impl RunStatus {
    fn from_board(board: &JobBoard) -> Self {
        let mut counts = StatusCounts::default();
        let jobs: Vec<JobSummary> = board
            .snapshot()
            .into_iter()
            .map(|job| {
                *counts.slot(job.status) += 1;
                JobSummary {
                    job: job.id,
                    account: job.account.id.clone(),
                    article: job.article.id.clone(),
                    status: job.status,
                    attempts: job.attempts,
                    error_kind: job.last_error.as_ref().map(|f| f.kind),
                    message: job.last_error.map(|f| f.message),
                    platform_article_id: job.platform_article_id,
                    history: job.history,
                }
            })
            .collect();

        let state = if counts.active() > 0 {
            RunState::Running
        } else if counts.cancelled > 0 {
            RunState::Cancelled
        } else if counts.failed > 0 {
            RunState::CompletedWithFailures
        } else {
            RunState::Completed
        };

        Self {
            run: board.run_id(),
            state,
            counts,
            jobs,
        }
    }

    pub fn job(&self, account: &str, article: &str) -> Option<&JobSummary> {
        self.jobs
            .iter()
            .find(|j| j.account.as_str() == account && j.article.as_str() == article)
    }
}

/// 一次运行的句柄
pub struct RunHandle {
    id: RunId,
    board: Arc<JobBoard>,
    stop: StopSignal,
    events: JobEvents,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    /// 下一个状态变化事件；运行结束后返回 None
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.next_event().await
    }

    /// 请求停止本次运行
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::from_board(&self.board)
    }

    /// 等待所有任务进入终态
    pub async fn wait(&self) -> RunStatus {
        self.board.wait_idle().await;
        self.status()
    }
}

/// 保留的已结束运行数量
const KEPT_FINISHED_RUNS: usize = 16;

struct RunEntry {
    board: Arc<JobBoard>,
    stop: StopSignal,
}

/// 运行控制器
pub struct RunController {
    config: SchedulerConfig,
    accounts: HashMap<AccountId, Account>,
    articles: HashMap<ArticleId, Arc<Article>>,
    factory: Arc<dyn AdapterFactory>,
    store: Arc<dyn SessionStore>,
    locks: Arc<AccountLocks>,
    limiter: Arc<Semaphore>,
    log: Arc<PublishLog>,
    runs: Mutex<HashMap<RunId, RunEntry>>,
    next_run: AtomicU64,
}

impl RunController {
    pub fn new(
        config: SchedulerConfig,
        accounts: Vec<Account>,
        articles: Vec<Article>,
        factory: Arc<dyn AdapterFactory>,
        store: Arc<dyn SessionStore>,
        log: Arc<PublishLog>,
    ) -> Self {
        Self {
            limiter: Arc::new(Semaphore::new(config.max_concurrent_accounts.max(1))),
            config,
            accounts: accounts.into_iter().map(|a| (a.id.clone(), a)).collect(),
            articles: articles
                .into_iter()
                .map(|a| (a.id.clone(), Arc::new(a)))
                .collect(),
            factory,
            store,
            locks: Arc::new(AccountLocks::new()),
            log,
            runs: Mutex::new(HashMap::new()),
            next_run: AtomicU64::new(1),
        }
    }

    pub fn publish_log(&self) -> Arc<PublishLog> {
        self.log.clone()
    }

    /// 校验选择并启动一次运行
    ///
    /// 任何配置错误都会在创建任务之前返回。
    pub fn start(&self, selection: &[(AccountId, ArticleId)]) -> Result<RunHandle, ConfigError> {
        if selection.is_empty() {
            return Err(ConfigError::EmptySelection);
        }
        for (account_id, article_id) in selection {
            if !self.accounts.contains_key(account_id) {
                return Err(ConfigError::UnknownAccount(account_id.to_string()));
            }
            if !self.articles.contains_key(article_id) {
                return Err(ConfigError::UnknownArticle(article_id.to_string()));
            }
        }
        if let Some((account, article)) = find_duplicate(selection) {
            return Err(ConfigError::DuplicateSelection {
                account: account.to_string(),
                article: article.to_string(),
            });
        }

        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        self.reject_active(&runs, selection)?;
        prune_finished(&mut runs);

        let run = RunId(self.next_run.fetch_add(1, Ordering::SeqCst));
        let board = Arc::new(JobBoard::new(run).with_sink(self.log.clone()));
        let mut scheduler = Scheduler::new(
            self.config.clone(),
            board.clone(),
            self.factory.clone(),
            self.store.clone(),
            self.locks.clone(),
        )
        .with_limiter(self.limiter.clone());
        for (account_id, article_id) in selection {
            if let (Some(account), Some(article)) =
                (self.accounts.get(account_id), self.articles.get(article_id))
            {
                scheduler.enqueue(account.clone(), article.clone())?;
            }
        }

        let stop = scheduler.stop_signal();
        info!("🚀 启动运行 {}，共 {} 个任务", run, selection.len());
        let events = scheduler.run();

        runs.insert(
            run,
            RunEntry {
                board: board.clone(),
                stop: stop.clone(),
            },
        );

        Ok(RunHandle {
            id: run,
            board,
            stop,
            events,
        })
    }

    /// 其他运行中仍未结束的相同任务
    fn reject_active(
        &self,
        runs: &HashMap<RunId, RunEntry>,
        selection: &[(AccountId, ArticleId)],
    ) -> Result<(), ConfigError> {
        for entry in runs.values().filter(|e| e.board.active_count() > 0) {
            for job in entry.board.snapshot() {
                if job.status.is_terminal() {
                    continue;
                }
                let pair = (job.account.id.clone(), job.article.id.clone());
                if selection.contains(&pair) {
                    return Err(ConfigError::AlreadyActive {
                        account: pair.0.to_string(),
                        article: pair.1.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// 请求停止指定运行；运行不存在时返回 false
    pub fn stop(&self, run: RunId) -> bool {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        match runs.get(&run) {
            Some(entry) => {
                info!("⏹ 请求停止运行 {}", run);
                entry.stop.stop();
                true
            }
            None => false,
        }
    }

    pub fn status(&self, run: RunId) -> Option<RunStatus> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.get(&run).map(|entry| RunStatus::from_board(&entry.board))
    }

    /// 移除已结束的运行；运行不存在或仍在进行时返回 false
    pub fn forget(&self, run: RunId) -> bool {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        match runs.get(&run) {
            Some(entry) if entry.board.active_count() == 0 => {
                runs.remove(&run);
                debug!("已移除运行 {}", run);
                true
            }
            _ => false,
        }
    }
}

/// 只保留最近的 `KEPT_FINISHED_RUNS` 个已结束运行
fn prune_finished(runs: &mut HashMap<RunId, RunEntry>) {
    let mut finished: Vec<RunId> = runs
        .iter()
        .filter(|(_, entry)| entry.board.active_count() == 0)
        .map(|(id, _)| *id)
        .collect();
    if finished.len() <= KEPT_FINISHED_RUNS {
        return;
    }
    finished.sort();
    for id in &finished[..finished.len() - KEPT_FINISHED_RUNS] {
        runs.remove(id);
    }
}
