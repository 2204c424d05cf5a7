use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::models::{AccountId, Session};
use crate::session::SessionStore;

/// 内存登录状态存储（测试和一次性运行使用）
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<AccountId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已保存登录状态的账号数量
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, account_id: &AccountId) -> Result<Option<Session>, StorageError> {
        Ok(self.sessions.read().await.get(account_id).cloned())
    }

    async fn save(&self, account_id: &AccountId, session: &Session) -> Result<(), StorageError> {
        self.sessions
            .write()
            .await
            .insert(account_id.clone(), session.clone());
        Ok(())
    }

    async fn invalidate(&self, account_id: &AccountId) -> Result<(), StorageError> {
        self.sessions.write().await.remove(account_id);
        Ok(())
    }
}
