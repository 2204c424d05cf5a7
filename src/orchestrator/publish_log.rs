//! 发布日志 - 编排层
//!
//! 每次状态变化追加一行 JSON。写文件在后台任务中完成，
//! 记录方（任务表）只把事件放进队列，不会等待磁盘。
//! 内存中只保留最近的一部分记录。

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::workflow::{JobEvent, TransitionSink};

/// 内存中默认保留的记录数
const DEFAULT_MEMORY_LIMIT: usize = 1000;

#[derive(Debug)]
enum LogCommand {
    Write(JobEvent),
    /// 之前的记录全部写完后回复
    Flush(oneshot::Sender<()>),
}

/// 发布日志
///
/// 职责：
/// - 记录任务的每次状态转换（只追加）
/// - 不参与调度决策
#[derive(Debug)]
pub struct PublishLog {
    path: Option<PathBuf>,
    writer: Option<mpsc::UnboundedSender<LogCommand>>,
    entries: Mutex<VecDeque<JobEvent>>,
    memory_limit: usize,
}

impl PublishLog {
    /// 写入指定的 JSONL 文件（需要在 tokio 运行时中调用）
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(path.clone(), rx));
        Self {
            path: Some(path),
            writer: Some(tx),
            ..Self::in_memory()
        }
    }

    /// 只保存在内存中
    pub fn in_memory() -> Self {
        Self {
            path: None,
            writer: None,
            entries: Mutex::new(VecDeque::new()),
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }

    /// 内存中最多保留的记录数
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit.max(1);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 追加一条记录，文件写入交给后台任务
    pub fn append(&self, event: &JobEvent) {
        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.push_back(event.clone());
            while entries.len() > self.memory_limit {
                entries.pop_front();
            }
        }

        if let Some(writer) = &self.writer {
            if writer.send(LogCommand::Write(event.clone())).is_err() {
                warn!("⚠️ 发布日志写入任务已退出，记录未写入文件: {}", event.job);
            }
        }
    }

    /// 等待已追加的记录全部写入文件
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if writer.send(LogCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// 内存中保留的记录（从旧到新）
    pub fn entries(&self) -> Vec<JobEvent> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

impl TransitionSink for PublishLog {
    fn record(&self, event: &JobEvent) {
        self.append(event);
    }
}

async fn write_loop(path: PathBuf, mut commands: mpsc::UnboundedReceiver<LogCommand>) {
    let mut file: Option<File> = None;
    while let Some(command) = commands.recv().await {
        match command {
            LogCommand::Write(event) => {
                if let Err(e) = write_line(&path, &mut file, &event).await {
                    warn!("⚠️ 写入发布日志失败: {:#}", e);
                    // 下次重新打开
                    file = None;
                }
            }
            LogCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("发布日志写入任务结束");
}

async fn write_line(path: &Path, file: &mut Option<File>, event: &JobEvent) -> Result<()> {
    if file.is_none() {
        *file = Some(open_log(path).await?);
    }
    let Some(file) = file.as_mut() else {
        return Ok(());
    };
    debug!("写入发布日志: {} {} → {}", event.job, event.from, event.to);

    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

async fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("无法创建日志目录: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("无法打开发布日志: {}", path.display()))
}
