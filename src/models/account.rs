use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// 平台枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// 今日头条（资讯聚合平台）
    Toutiao,
    /// 搜狐号（门户平台）
    Sohu,
    /// 百家号
    Baijiahao,
}

impl Platform {
    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            Platform::Toutiao => "今日头条",
            Platform::Sohu => "搜狐号",
            Platform::Baijiahao => "百家号",
        }
    }

    /// 配置文件中使用的标识
    pub fn code(self) -> &'static str {
        match self {
            Platform::Toutiao => "toutiao",
            Platform::Sohu => "sohu",
            Platform::Baijiahao => "baijiahao",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 账号ID
///
/// 同时用作登录状态的存储键（文件名），因此只允许安全字符。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= 64
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(ConfigError::InvalidAccountId(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 发布账号
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub platform: Platform,
    /// 显示名称
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 一次运行中分配给该账号的文章数量
    #[serde(default = "default_publish_count")]
    pub publish_count: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_publish_count() -> usize {
    1
}

impl Account {
    pub fn new(
        id: AccountId,
        platform: Platform,
        display_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id,
            platform,
            display_name: display_name.into(),
            username: username.into(),
            enabled: true,
            publish_count: 1,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.display_name, self.platform)
    }
}
