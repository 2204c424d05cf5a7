use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::infrastructure::AccountLocks;
use crate::models::{AccountId, Session};
use crate::session::SessionStore;

const HEADER_PREFIX: &str = "session v1 ";

/// 文件登录状态存储
///
/// 每个账号一个文件 `<dir>/<account_id>.session`，格式为一行头部
/// （`session v1 <采集时间>`）加原始字节。
/// 写入先落到临时文件再 rename，读取者不会看到写了一半的内容。
/// 无法解析的文件会被删除并视为没有登录状态，账号随后重新登录。
#[derive(Debug)]
pub struct FileSessionStore {
    dir: PathBuf,
    write_locks: AccountLocks,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_locks: AccountLocks::new(),
        }
    }

    fn session_path(&self, account_id: &AccountId) -> PathBuf {
        self.dir.join(format!("{}.session", account_id))
    }

    fn temp_path(&self, account_id: &AccountId) -> PathBuf {
        self.dir.join(format!(".{}.session.tmp", account_id))
    }
}

fn encode(session: &Session) -> Vec<u8> {
    let header = format!("{}{}\n", HEADER_PREFIX, session.captured_at().to_rfc3339());
    let mut bytes = Vec::with_capacity(header.len() + session.payload().len());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(session.payload());
    bytes
}

fn decode(account_id: &AccountId, bytes: &[u8]) -> Result<Session, StorageError> {
    let corrupt = |reason: &str| StorageError::Corrupt {
        account_id: account_id.to_string(),
        reason: reason.to_string(),
    };

    let newline = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| corrupt("缺少文件头"))?;
    let header = std::str::from_utf8(&bytes[..newline]).map_err(|_| corrupt("文件头不是 UTF-8"))?;
    let timestamp = header
        .strip_prefix(HEADER_PREFIX)
        .ok_or_else(|| corrupt("未知的文件头"))?;
    let captured_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| corrupt("采集时间无法解析"))?
        .with_timezone(&Utc);

    Ok(Session::captured(bytes[newline + 1..].to_vec(), captured_at))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, account_id: &AccountId) -> Result<Option<Session>, StorageError> {
        let path = self.session_path(account_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("读取登录状态: {}", path.display());
                match decode(account_id, &bytes) {
                    Ok(session) => Ok(Some(session)),
                    Err(e) => {
                        warn!("⚠️ {}，删除后重新登录", e);
                        self.invalidate(account_id).await?;
                        Ok(None)
                    }
                }
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(account_id.as_str(), e)),
        }
    }

    async fn save(&self, account_id: &AccountId, session: &Session) -> Result<(), StorageError> {
        let _guard = self.write_locks.acquire(account_id).await;
        let io_err = |e| StorageError::io(account_id.as_str(), e);

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let temp_path = self.temp_path(account_id);
        let mut file = tokio::fs::File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(&encode(session)).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&temp_path, self.session_path(account_id))
            .await
            .map_err(io_err)?;

        info!("已保存登录状态: {}", account_id);
        Ok(())
    }

    async fn invalidate(&self, account_id: &AccountId) -> Result<(), StorageError> {
        let _guard = self.write_locks.acquire(account_id).await;
        match tokio::fs::remove_file(self.session_path(account_id)).await {
            Ok(()) => {
                info!("已作废登录状态: {}", account_id);
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(account_id.as_str(), e)),
        }
    }
}
