//! 平台适配器 - 业务能力层
//!
//! 把各平台不同的发布流程统一为同一个契约：
//! 登录检测 → 内容准备（标题/正文规范化、封面策略）→ 提交。
//!
//! 适配器不访问登录状态存储：它接收一个 `Session`，
//! 需要保存的新状态通过返回值交给调度流程。

pub mod baijiahao;
pub mod factory;
pub mod login;
pub mod script;
pub mod sohu;
pub mod toutiao;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::{AdapterError, BrowserError};
use crate::infrastructure::AutomationDriver;
use crate::models::{Article, Platform, Session};

pub use baijiahao::BaijiahaoAdapter;
pub use factory::{AdapterFactory, BrowserAdapterFactory};
pub use sohu::SohuAdapter;
pub use toutiao::ToutiaoAdapter;

/// 登录检测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCheck {
    pub authenticated: bool,
    /// 需要持久化的新登录状态
    pub refreshed: Option<Session>,
}

impl LoginCheck {
    pub fn accepted(refreshed: Option<Session>) -> Self {
        Self {
            authenticated: true,
            refreshed,
        }
    }

    pub fn rejected() -> Self {
        Self {
            authenticated: false,
            refreshed: None,
        }
    }
}

/// 封面选择
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverChoice {
    /// 上传文章自带的封面
    Explicit(PathBuf),
    /// 从平台素材库选择
    MaterialLibrary,
    /// 不设置封面
    Skip,
}

/// 平台化后的待提交内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedContent {
    pub title: String,
    pub body_text: String,
    pub body_html: String,
    pub cover: CoverChoice,
}

/// 发布成功回执
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    pub platform_article_id: Option<String>,
    pub url: Option<String>,
}

/// 平台适配器
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// 检查登录状态是否仍被平台接受，可能返回刷新后的状态
    async fn check_login(&self, session: Option<&Session>) -> Result<LoginCheck, AdapterError>;

    /// 强制重新登录，返回新的登录状态
    async fn authenticate(&self) -> Result<Session, AdapterError>;

    /// 把通用文章映射为平台提交字段
    async fn prepare(&self, article: &Article) -> Result<PreparedContent, AdapterError>;

    /// 提交发布
    async fn submit(&self, content: &PreparedContent) -> Result<PublishReceipt, AdapterError>;

    /// 读取当前登录账号的昵称，读不到返回 None
    async fn nickname(&self) -> Result<Option<String>, AdapterError> {
        Ok(None)
    }
}

/// 平台内容规则
#[derive(Debug, Clone, Copy)]
pub struct ContentRules {
    pub title_min_chars: usize,
    pub title_max_chars: usize,
    /// 是否支持上传本地封面
    pub explicit_cover: bool,
    /// 是否支持从素材库选择封面
    pub material_library: bool,
}

impl ContentRules {
    /// 按规则准备内容
    pub async fn prepare(&self, article: &Article) -> Result<PreparedContent, AdapterError> {
        let title = normalize_title(&article.title);
        let title_len = title.chars().count();
        if title_len < self.title_min_chars || title_len > self.title_max_chars {
            return Err(AdapterError::ContentRejected(format!(
                "标题长度 {} 不在 {}-{} 字范围内",
                title_len, self.title_min_chars, self.title_max_chars
            )));
        }

        let body_text = article.body.trim().to_string();
        if body_text.is_empty() {
            return Err(AdapterError::ContentRejected("正文为空".to_string()));
        }

        let cover = match &article.cover {
            Some(_) if !self.explicit_cover => {
                return Err(AdapterError::UnsupportedFeature(
                    "该平台不支持上传本地封面".to_string(),
                ))
            }
            Some(path) => {
                if tokio::fs::metadata(path).await.is_err() {
                    return Err(AdapterError::ContentRejected(format!(
                        "封面文件不存在: {}",
                        path.display()
                    )));
                }
                CoverChoice::Explicit(path.clone())
            }
            None if self.material_library => CoverChoice::MaterialLibrary,
            None => CoverChoice::Skip,
        };

        Ok(PreparedContent {
            title,
            body_html: script::paragraphs_to_html(&body_text),
            body_text,
            cover,
        })
    }
}

/// 合并标题中的空白
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 提示文本中表示内容违规的关键词
const REJECTION_MARKERS: &[&str] = &["违规", "敏感", "不符合", "审核不通过", "禁止发布"];

/// 提示文本中表示登录失效的关键词
const LOGIN_MARKERS: &[&str] = &["重新登录", "请登录", "登录已失效", "登录失效", "登录过期", "未登录"];

/// 发布结果页面特征
#[derive(Debug, Clone, Copy)]
pub struct OutcomeSignals {
    /// URL 中出现任一片段即视为发布成功
    pub success_url_markers: &'static [&'static str],
    /// 提示消息的选择器
    pub toast_selectors: &'static [&'static str],
}

/// 根据提示文本分类
pub fn classify_toast(text: &str) -> Result<(), AdapterError> {
    if LOGIN_MARKERS.iter().any(|m| text.contains(m)) {
        Err(AdapterError::AuthExpired(text.to_string()))
    } else if REJECTION_MARKERS.iter().any(|m| text.contains(m)) {
        Err(AdapterError::ContentRejected(text.to_string()))
    } else if text.contains("成功") {
        Ok(())
    } else {
        Err(AdapterError::TransientNetwork(text.to_string()))
    }
}

/// 点击发布后轮询结果
///
/// 此时文章可能已经发出：超时或驱动出错都返回 `Unconfirmed`，不再重试。
pub async fn await_outcome(
    driver: &dyn AutomationDriver,
    signals: &OutcomeSignals,
    timeout: Duration,
    poll: Duration,
) -> Result<PublishReceipt, AdapterError> {
    let unconfirmed = |e: BrowserError| AdapterError::Unconfirmed(e.to_string());
    let deadline = Instant::now() + timeout;
    loop {
        let url = driver
            .current_url()
            .await
            .map_err(unconfirmed)?
            .unwrap_or_default();
        if signals.success_url_markers.iter().any(|m| url.contains(m)) {
            return Ok(receipt_from_url(url));
        }

        if let Some(toast) = script::text_of(driver, signals.toast_selectors)
            .await
            .map_err(unconfirmed)?
        {
            classify_toast(&toast)?;
            return Ok(receipt_from_url(url));
        }

        if Instant::now() >= deadline {
            return Err(AdapterError::Unconfirmed("发布结果确认超时".to_string()));
        }
        sleep(poll).await;
    }
}

fn receipt_from_url(url: String) -> PublishReceipt {
    PublishReceipt {
        platform_article_id: script::extract_article_id(&url),
        url: Some(url).filter(|u| !u.is_empty()),
    }
}
