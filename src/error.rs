use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 平台适配器错误
    #[error("平台错误: {0}")]
    Adapter(#[from] AdapterError),
    /// 登录状态存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器驱动错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 ({endpoint}): {source}")]
    ConnectionFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    #[error("创建页面失败: {source}")]
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 浏览器配置失败
    #[error("浏览器配置失败: {reason}")]
    ConfigurationFailed { reason: String },
    /// 登录状态导入/导出失败
    #[error("登录状态处理失败: {reason}")]
    StateTransferFailed { reason: String },
}

/// 平台适配器错误
///
/// 调度器根据变体决定重试策略，适配器必须正确区分。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// 登录已失效，强制重新登录后可重试一次
    #[error("登录已失效: {0}")]
    AuthExpired(String),
    /// 网络或驱动抖动，退避后可重试
    #[error("网络异常: {0}")]
    TransientNetwork(String),
    /// 内容被平台拒绝（不可重试）
    #[error("内容被拒绝: {0}")]
    ContentRejected(String),
    /// 平台不支持该功能（不可重试）
    #[error("平台不支持: {0}")]
    UnsupportedFeature(String),
    /// 已点击发布但无法确认结果（不可重试，避免重复发布）
    #[error("发布结果未确认: {0}")]
    Unconfirmed(String),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::AuthExpired(_) => ErrorKind::AuthExpired,
            AdapterError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            AdapterError::ContentRejected(_) => ErrorKind::ContentRejected,
            AdapterError::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            AdapterError::Unconfirmed(_) => ErrorKind::Unconfirmed,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AdapterError::AuthExpired(m)
            | AdapterError::TransientNetwork(m)
            | AdapterError::ContentRejected(m)
            | AdapterError::UnsupportedFeature(m)
            | AdapterError::Unconfirmed(m) => m,
        }
    }
}

impl From<BrowserError> for AdapterError {
    fn from(err: BrowserError) -> Self {
        AdapterError::TransientNetwork(err.to_string())
    }
}

/// 登录状态存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 读写失败
    #[error("账号 {account_id} 的登录状态读写失败: {source}")]
    Io {
        account_id: String,
        source: std::io::Error,
    },
    /// 文件内容损坏
    #[error("账号 {account_id} 的登录状态已损坏: {reason}")]
    Corrupt { account_id: String, reason: String },
}

impl StorageError {
    pub fn io(account_id: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            account_id: account_id.into(),
            source,
        }
    }
}

/// 配置错误（在创建任何任务之前拒绝）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 未知账号
    #[error("未知账号: {0}")]
    UnknownAccount(String),
    /// 未知文章
    #[error("未知文章: {0}")]
    UnknownArticle(String),
    /// 同一次运行中重复选择
    #[error("重复的发布任务: 账号 {account} / 文章 {article}")]
    DuplicateSelection { account: String, article: String },
    /// 另一运行中同一任务仍未结束
    #[error("任务仍在运行中: 账号 {account} / 文章 {article}")]
    AlreadyActive { account: String, article: String },
    /// 未选择任何任务
    #[error("未选择任何发布任务")]
    EmptySelection,
    /// 账号ID非法
    #[error("账号ID非法: '{0}' (只允许字母、数字、- 和 _，长度 1-64)")]
    InvalidAccountId(String),
    /// 账号ID重复
    #[error("账号ID重复: {0}")]
    DuplicateAccountId(String),
    /// 配置文件无法解析
    #[error("配置文件解析失败 ({path}): {reason}")]
    InvalidFile { path: String, reason: String },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 面向用户的错误分类，出现在任务状态中
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Storage,
    AuthExpired,
    TransientNetwork,
    ContentRejected,
    UnsupportedFeature,
    Unconfirmed,
}

impl ErrorKind {
    /// 获取中文描述
    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::Storage => "登录状态存储失败",
            ErrorKind::AuthExpired => "登录失效",
            ErrorKind::TransientNetwork => "网络异常",
            ErrorKind::ContentRejected => "内容被拒绝",
            ErrorKind::UnsupportedFeature => "平台不支持",
            ErrorKind::Unconfirmed => "发布结果未确认",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        }
    }
}

impl From<serde_json::Error> for BrowserError {
    fn from(err: serde_json::Error) -> Self {
        BrowserError::StateTransferFailed {
            reason: err.to_string(),
        }
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }
}
