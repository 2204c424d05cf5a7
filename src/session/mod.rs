//! 登录状态存储
//!
//! 按账号保存浏览器认证状态。适配器从不直接访问存储，
//! 读写由调度流程负责。

pub mod file_store;
pub mod memory_store;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{AccountId, Session};

pub use file_store::FileSessionStore;
pub use memory_store::MemorySessionStore;

/// 登录状态存储
///
/// 保证整体替换：并发读取者只能看到旧值或新值，看不到写了一半的数据。
/// 不同账号可以并发访问，同一账号的写入串行执行。
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取登录状态，从未保存过返回 `None`
    async fn load(&self, account_id: &AccountId) -> Result<Option<Session>, StorageError>;

    /// 保存（整体替换）登录状态
    async fn save(&self, account_id: &AccountId, session: &Session) -> Result<(), StorageError>;

    /// 作废登录状态
    async fn invalidate(&self, account_id: &AccountId) -> Result<(), StorageError>;
}
