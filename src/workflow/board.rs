//! 任务表 - 流程层
//!
//! 一次运行中所有任务的唯一状态来源：
//! 校验状态转换、记录历史、向订阅者发出事件。

use chrono::Utc;
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::adapters::PublishReceipt;
use crate::error::ConfigError;
use crate::models::{Account, Article};

use super::job::{
    InvalidTransition, JobEvent, JobFailure, JobId, JobStatus, JobTransition, PublishJob, RunId,
};

/// 状态变化记录器（发布日志）
pub trait TransitionSink: Send + Sync {
    fn record(&self, event: &JobEvent);
}

/// 状态变化事件流，所有任务进入终态后结束
pub struct JobEvents {
    rx: mpsc::UnboundedReceiver<JobEvent>,
}

impl JobEvents {
    /// 已经结束的空事件流
    pub fn closed() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self { rx }
    }

    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }
}

impl Stream for JobEvents {
    type Item = JobEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobEvent>> {
        self.rx.poll_recv(cx)
    }
}

struct BoardState {
    jobs: Vec<PublishJob>,
    /// 未进入终态的任务数，决定何时关闭事件流
    remaining: usize,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
}

/// 任务表
pub struct JobBoard {
    run: RunId,
    state: Mutex<BoardState>,
    receiver: Mutex<Option<JobEvents>>,
    active: watch::Sender<usize>,
    sink: Option<Arc<dyn TransitionSink>>,
}

impl JobBoard {
    pub fn new(run: RunId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (active, _) = watch::channel(0);
        Self {
            run,
            state: Mutex::new(BoardState {
                jobs: Vec::new(),
                remaining: 0,
                events: Some(tx),
            }),
            receiver: Mutex::new(Some(JobEvents { rx })),
            active,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TransitionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        // 持锁期间不会 panic，中毒时沿用内部数据
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 登记新任务；同一运行中 (账号, 文章) 重复时拒绝
    pub fn insert(&self, account: Account, article: Arc<Article>) -> Result<JobId, ConfigError> {
        let mut state = self.lock();
        let duplicate = state
            .jobs
            .iter()
            .any(|j| j.account.id == account.id && j.article.id == article.id);
        if duplicate {
            return Err(ConfigError::DuplicateSelection {
                account: account.id.to_string(),
                article: article.id.to_string(),
            });
        }

        let id = JobId(state.jobs.len() as u64 + 1);
        state.jobs.push(PublishJob::new(id, account, article));
        state.remaining += 1;
        self.active.send_modify(|n| *n += 1);
        Ok(id)
    }

    /// 取走事件流（只能取一次）
    pub fn take_events(&self) -> Option<JobEvents> {
        self.receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// 所有任务都已进入终态时关闭事件流
    pub fn close_if_idle(&self) {
        let mut state = self.lock();
        if state.remaining == 0 {
            state.events = None;
        }
    }

    pub fn get(&self, id: JobId) -> Option<PublishJob> {
        self.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.lock().jobs.iter().find(|j| j.id == id).map(|j| j.status)
    }

    pub fn snapshot(&self) -> Vec<PublishJob> {
        self.lock().jobs.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 未进入终态的任务数
    pub fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    /// 等待所有任务进入终态
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn advance(&self, id: JobId, to: JobStatus) -> Result<JobEvent, InvalidTransition> {
        self.apply(id, to, |_| {})
    }

    /// 进入 Submitting 并计一次提交
    pub fn begin_attempt(&self, id: JobId) -> Result<JobEvent, InvalidTransition> {
        self.apply(id, JobStatus::Submitting, |job| job.attempts += 1)
    }

    pub fn publish(&self, id: JobId, receipt: &PublishReceipt) -> Result<JobEvent, InvalidTransition> {
        let article_id = receipt.platform_article_id.clone();
        self.apply(id, JobStatus::Published, move |job| {
            job.platform_article_id = article_id;
        })
    }

    pub fn fail(&self, id: JobId, failure: JobFailure) -> Result<JobEvent, InvalidTransition> {
        self.apply(id, JobStatus::Failed, move |job| {
            job.last_error = Some(failure);
        })
    }

    pub fn cancel(&self, id: JobId) -> Result<JobEvent, InvalidTransition> {
        self.apply(id, JobStatus::Cancelled, |_| {})
    }

    fn apply(
        &self,
        id: JobId,
        to: JobStatus,
        update: impl FnOnce(&mut PublishJob),
    ) -> Result<JobEvent, InvalidTransition> {
        let (event, events) = {
            let mut state = self.lock();
            let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) else {
                error!("任务不存在: {}", id);
                return Err(InvalidTransition {
                    job: id,
                    from: to,
                    to,
                });
            };

            let from = job.status;
            if !from.can_transition_to(to) {
                return Err(InvalidTransition { job: id, from, to });
            }

            let at = Utc::now();
            update(job);
            job.status = to;
            job.updated_at = at;
            job.history.push(JobTransition { from, to, at });

            let event = JobEvent {
                run: self.run,
                job: id,
                account: job.account.id.clone(),
                article: job.article.id.clone(),
                from,
                to,
                at,
                attempt: job.attempts,
                error_kind: job.last_error.as_ref().filter(|_| to == JobStatus::Failed).map(|f| f.kind),
                message: job
                    .last_error
                    .as_ref()
                    .filter(|_| to == JobStatus::Failed)
                    .map(|f| f.message.clone()),
                platform_article_id: job.platform_article_id.clone(),
            };
            debug!("[{}] 任务 {} : {} → {}", job.account.display_name, id, from, to);

            // 最后一个任务结束时交出发送端，发完这条事件后事件流关闭
            let events = if to.is_terminal() {
                state.remaining = state.remaining.saturating_sub(1);
                if state.remaining == 0 {
                    state.events.take()
                } else {
                    state.events.clone()
                }
            } else {
                state.events.clone()
            };
            (event, events)
        };

        // 释放锁之后再写日志和发事件；日志先于事件，等待者最后被唤醒
        if let Some(sink) = &self.sink {
            sink.record(&event);
        }
        if let Some(tx) = events {
            let _ = tx.send(event.clone());
        }
        if to.is_terminal() {
            self.active.send_modify(|n| *n = n.saturating_sub(1));
        }
        Ok(event)
    }
}
