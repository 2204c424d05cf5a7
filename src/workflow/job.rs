//! 发布任务与状态机
//!
//! ```text
//! Pending → LoggingIn → Preparing → Submitting → Published
//!              ↺ (强制重新登录一次)      ↺ (网络异常重试)
//!                          Submitting → LoggingIn (提交时登录失效)
//! 任意非终态 → Failed / Cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{AdapterError, ErrorKind, StorageError};
use crate::models::{Account, AccountId, Article, ArticleId};

/// 运行ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// 任务ID（运行内从 1 开始编号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    LoggingIn,
    Preparing,
    Submitting,
    Published,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::LoggingIn,
        JobStatus::Preparing,
        JobStatus::Submitting,
        JobStatus::Published,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Published | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// 状态机允许的边
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) | (_, Cancelled) => true,
            (Pending, LoggingIn) => true,
            (LoggingIn, LoggingIn) | (LoggingIn, Preparing) => true,
            (Preparing, Submitting) => true,
            (Submitting, Submitting) | (Submitting, LoggingIn) | (Submitting, Published) => true,
            _ => false,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            JobStatus::Pending => "等待中",
            JobStatus::LoggingIn => "登录中",
            JobStatus::Preparing => "准备内容",
            JobStatus::Submitting => "提交中",
            JobStatus::Published => "已发布",
            JobStatus::Failed => "失败",
            JobStatus::Cancelled => "已取消",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// 非法状态转换
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("任务 {job} 不允许从 {from} 转换到 {to}")]
pub struct InvalidTransition {
    pub job: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// 任务失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&AdapterError> for JobFailure {
    fn from(err: &AdapterError) -> Self {
        JobFailure::new(err.kind(), err.message())
    }
}

impl From<&StorageError> for JobFailure {
    fn from(err: &StorageError) -> Self {
        JobFailure::new(ErrorKind::Storage, err.to_string())
    }
}

/// 一次状态转换记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
}

/// 发布任务
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub id: JobId,
    pub account: Account,
    pub article: Arc<Article>,
    pub status: JobStatus,
    /// 已进行的提交次数
    pub attempts: u32,
    pub last_error: Option<JobFailure>,
    pub platform_article_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<JobTransition>,
}

impl PublishJob {
    pub fn new(id: JobId, account: Account, article: Arc<Article>) -> Self {
        let now = Utc::now();
        Self {
            id,
            account,
            article,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            platform_article_id: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account.id
    }

    pub fn article_id(&self) -> &ArticleId {
        &self.article.id
    }
}

/// 状态变化事件，同时也是发布日志的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub run: RunId,
    pub job: JobId,
    pub account: AccountId,
    pub article: ArticleId,
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_article_id: Option<String>,
}
