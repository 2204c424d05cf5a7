//! 账号互斥锁 - 基础设施层
//!
//! 同一账号的登录状态在任意时刻只能被一个任务（或一次写入）持有。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::AccountId;

/// 按账号分配的异步互斥锁
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取账号锁，持有返回的 guard 期间独占该账号
    pub async fn acquire(&self, account_id: &AccountId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(account_id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// 账号当前是否被占用
    pub fn is_held(&self, account_id: &AccountId) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .get(account_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}
