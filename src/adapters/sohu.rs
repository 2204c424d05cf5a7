//! 搜狐号适配器
//!
//! 封面只能从素材库选择；文章自带的本地封面视为不支持。

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AdapterSettings;
use crate::error::AdapterError;
use crate::infrastructure::AutomationDriver;
use crate::models::{Article, Platform, Session};

use super::login::{self, LoginPages};
use super::script;
use super::{
    await_outcome, ContentRules, CoverChoice, LoginCheck, OutcomeSignals, PlatformAdapter,
    PreparedContent, PublishReceipt,
};

const PAGES: LoginPages = LoginPages {
    login_url: "https://mp.sohu.com/mpfe/v3/login",
    home_url: "https://mp.sohu.com/mpfe/v3/home",
    login_markers: &[
        "login", "verify", "captcha", "sms", "auth", "passport", "security",
    ],
};

const CONTENT_MANAGE_URL: &str = "https://mp.sohu.com/mpfe/v4/contentManagement/first/page";

const RULES: ContentRules = ContentRules {
    title_min_chars: 5,
    title_max_chars: 72,
    explicit_cover: false,
    material_library: true,
};

const OUTCOME: OutcomeSignals = OutcomeSignals {
    success_url_markers: &["contentManagement/first/page"],
    toast_selectors: &[".el-message__content", ".el-message"],
};

mod selectors {
    pub const PUBLISH_CONTENT_BTN: &[&str] = &["#menu-ic_publish > div > div > span"];
    pub const TITLE_INPUT: &[&str] = &[
        "#app > div.add_content-wrap > div > div > div:nth-child(1) > div > div.publish-title > input[type=text]",
        ".publish-title input[type=text]",
    ];
    /// Quill 编辑器
    pub const CONTENT_EDITOR: &[&str] = &["#editor > div.ql-editor", ".ql-editor"];
    pub const COVER_UPLOAD_BTN: &[&str] = &["div.upload-file.mp-upload"];
    pub const MATERIAL_TAB: &[&str] = &[
        ".el-dialog__wrapper.select-dialog .dialog-title h3.selected",
        ".el-dialog__wrapper.select-dialog .dialog-title h3:nth-child(2)",
        ".el-dialog__wrapper.select-dialog .dialog-title h3:last-child",
        ".select-dialog .dialog-title h3:not(.selected)",
    ];
    pub const MATERIAL_FIRST_IMAGE: &[&str] = &[
        ".el-dialog__wrapper.select-dialog .library-images > div:nth-child(1)",
        ".el-dialog__wrapper.select-dialog .library-images > div:nth-child(1) .image-wrapper",
        ".library-images > div:first-child",
    ];
    pub const MATERIAL_CONFIRM_BTN: &[&str] =
        &[".el-dialog__wrapper.select-dialog .bottom-buttons .positive-button"];
    pub const PUBLISH_BTN: &[&str] = &[
        "li.publish-report-btn.positive-button",
        "li.publish-report-btn.active",
        ".bottom-button-outer-absolute li.positive-button",
        ".item-btn-wrapper .positive-button",
    ];
    /// 选择器都失效时按文本查找
    pub const PUBLISH_BTN_FALLBACK: &str = ".publish-report-btn, .positive-button";
    pub const NICKNAME: &[&str] = &[".user-name", ".nick-name", ".author-name"];
}

/// 搜狐号适配器
pub struct SohuAdapter {
    driver: Arc<dyn AutomationDriver>,
    account_name: String,
    settings: AdapterSettings,
}

impl SohuAdapter {
    pub fn new(
        driver: Arc<dyn AutomationDriver>,
        account_name: impl Into<String>,
        settings: AdapterSettings,
    ) -> Self {
        Self {
            driver,
            account_name: account_name.into(),
            settings,
        }
    }

    async fn wait_and_click(&self, selectors: &[&str], what: &str) -> Result<(), AdapterError> {
        let driver = self.driver.as_ref();
        let found = script::wait_for(
            driver,
            selectors,
            self.settings.page_timeout,
            self.settings.poll_interval,
        )
        .await?;
        if !found {
            login::ensure_still_logged_in(driver, &PAGES, &self.account_name).await?;
            return Err(AdapterError::TransientNetwork(format!("等待{}超时", what)));
        }
        script::require(driver, script::click(selectors), what).await?;
        info!("[{}] ✓ 已点击{}", self.account_name, what);
        Ok(())
    }

    /// 从素材库选择第一张图片，素材库为空时返回 false
    async fn select_cover_from_material(&self) -> Result<bool, AdapterError> {
        self.wait_and_click(selectors::COVER_UPLOAD_BTN, "封面上传按钮").await?;
        self.wait_and_click(selectors::MATERIAL_TAB, "素材库标签").await?;

        let has_image = script::wait_for(
            self.driver.as_ref(),
            selectors::MATERIAL_FIRST_IMAGE,
            self.settings.page_timeout,
            self.settings.poll_interval,
        )
        .await?;
        if !has_image {
            return Ok(false);
        }
        self.wait_and_click(selectors::MATERIAL_FIRST_IMAGE, "素材图片").await?;
        self.wait_and_click(selectors::MATERIAL_CONFIRM_BTN, "确定按钮").await?;
        Ok(true)
    }

    async fn click_publish(&self) -> Result<(), AdapterError> {
        let driver = self.driver.as_ref();
        if script::eval_bool(driver, script::click(selectors::PUBLISH_BTN)).await? {
            info!("[{}] ✓ 已点击发布按钮", self.account_name);
            return Ok(());
        }

        debug!("[{}] 发布按钮选择器失效，尝试文本定位", self.account_name);
        script::require(
            driver,
            script::click_by_text(selectors::PUBLISH_BTN_FALLBACK, "发布"),
            "发布按钮",
        )
        .await?;
        info!("[{}] ✓ 已点击发布按钮 (文本定位)", self.account_name);
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for SohuAdapter {
    fn platform(&self) -> Platform {
        Platform::Sohu
    }

    async fn check_login(&self, session: Option<&Session>) -> Result<LoginCheck, AdapterError> {
        login::check_login(self.driver.as_ref(), &PAGES, session, &self.account_name).await
    }

    async fn authenticate(&self) -> Result<Session, AdapterError> {
        login::wait_for_login(self.driver.as_ref(), &PAGES, &self.settings, &self.account_name)
            .await
    }

    async fn prepare(&self, article: &Article) -> Result<PreparedContent, AdapterError> {
        RULES.prepare(article).await
    }

    async fn submit(&self, content: &PreparedContent) -> Result<PublishReceipt, AdapterError> {
        let driver = self.driver.as_ref();
        info!("[{}] 开始发布文章: {}", self.account_name, content.title);

        driver.goto(CONTENT_MANAGE_URL).await?;
        login::ensure_still_logged_in(driver, &PAGES, &self.account_name).await?;
        self.wait_and_click(selectors::PUBLISH_CONTENT_BTN, "发布内容按钮")
            .await?;

        self.wait_and_click(selectors::TITLE_INPUT, "标题输入框").await?;
        script::require(
            driver,
            script::fill_text(selectors::TITLE_INPUT, &content.title),
            "标题输入框",
        )
        .await?;
        info!("[{}] ✓ 标题输入成功", self.account_name);

        script::require(
            driver,
            script::fill_html(selectors::CONTENT_EDITOR, &content.body_html),
            "正文编辑器",
        )
        .await?;
        info!("[{}] ✓ 正文输入成功", self.account_name);

        match &content.cover {
            CoverChoice::MaterialLibrary => match self.select_cover_from_material().await {
                Ok(true) => {}
                Ok(false) => warn!("[{}] 素材库中没有可用图片，不设置封面", self.account_name),
                Err(AdapterError::AuthExpired(m)) => return Err(AdapterError::AuthExpired(m)),
                Err(e) => warn!("[{}] 素材库封面设置失败，不设置封面: {}", self.account_name, e),
            },
            CoverChoice::Skip => {}
            CoverChoice::Explicit(_) => {
                return Err(AdapterError::UnsupportedFeature(
                    "搜狐号不支持上传本地封面".to_string(),
                ))
            }
        }

        self.click_publish().await?;

        let receipt = await_outcome(
            driver,
            &OUTCOME,
            self.settings.page_timeout,
            self.settings.poll_interval,
        )
        .await?;
        info!("[{}] ✅ 文章发布成功: {}", self.account_name, content.title);
        Ok(receipt)
    }

    async fn nickname(&self) -> Result<Option<String>, AdapterError> {
        Ok(script::text_of(self.driver.as_ref(), selectors::NICKNAME).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::FakeDriver;
    use serde_json::json;
    use std::time::Duration;

    fn settings() -> AdapterSettings {
        AdapterSettings {
            login_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            page_timeout: Duration::from_millis(50),
        }
    }

    fn adapter(driver: Arc<FakeDriver>) -> SohuAdapter {
        SohuAdapter::new(driver, "搜狐号", settings())
    }

    #[tokio::test]
    async fn test_prepare_rejects_explicit_cover() {
        let sohu = adapter(Arc::new(FakeDriver::default()));
        let article = Article::new("a1", "这是搜狐标题", "正文").with_cover("cover.png");
        assert!(matches!(
            sohu.prepare(&article).await,
            Err(AdapterError::UnsupportedFeature(_))
        ));
    }

    #[tokio::test]
    async fn test_prepare_title_window() {
        let sohu = adapter(Arc::new(FakeDriver::default()));
        let short = Article::new("a1", "四个字的", "正文");
        assert!(matches!(
            sohu.prepare(&short).await,
            Err(AdapterError::ContentRejected(_))
        ));
        let ok = Article::new("a2", "五个字标题", "正文");
        assert_eq!(
            sohu.prepare(&ok).await.unwrap().cover,
            CoverChoice::MaterialLibrary
        );
    }

    #[tokio::test]
    async fn test_verification_page_counts_as_logged_out() {
        let driver = Arc::new(FakeDriver::with_urls(&[
            "https://mp.sohu.com/mpfe/v3/security/verify?from=home",
        ]));
        let sohu = adapter(driver);
        let saved = Session::new(b"state".to_vec());
        assert_eq!(
            sohu.check_login(Some(&saved)).await.unwrap(),
            LoginCheck::rejected()
        );
    }

    #[tokio::test]
    async fn test_publish_button_text_fallback() {
        let driver = Arc::new(FakeDriver::with_urls(&[
            "https://mp.sohu.com/mpfe/v4/contentManagement/news/addarticle",
            "https://mp.sohu.com/mpfe/v4/contentManagement/first/page?id=889",
        ]));
        // 等待并点击两个元素，再填写标题和正文，封面跳过
        for _ in 0..6 {
            driver.push_eval(json!(true));
        }
        driver.push_eval(json!(false)); // 选择器点击失败
        driver.push_eval(json!(true)); // 文本定位成功
        let sohu = adapter(driver.clone());

        let content = PreparedContent {
            title: "五个字标题".to_string(),
            body_text: "正文".to_string(),
            body_html: "<p>正文</p>".to_string(),
            cover: CoverChoice::Skip,
        };
        let receipt = sohu.submit(&content).await.unwrap();
        assert_eq!(receipt.platform_article_id.as_deref(), Some("889"));
        assert!(driver
            .scripts
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.contains(selectors::PUBLISH_BTN_FALLBACK)));
    }

    #[tokio::test]
    async fn test_session_lost_while_waiting_for_editor() {
        let driver = Arc::new(FakeDriver::with_urls(&[
            CONTENT_MANAGE_URL,
            "https://mp.sohu.com/mpfe/v3/login?redirect=addarticle",
        ]));
        driver.hide("menu-ic_publish");
        let sohu = adapter(driver);

        let content = PreparedContent {
            title: "五个字标题".to_string(),
            body_text: "正文".to_string(),
            body_html: "<p>正文</p>".to_string(),
            cover: CoverChoice::Skip,
        };
        let err = sohu.submit(&content).await.unwrap_err();
        assert!(matches!(err, AdapterError::AuthExpired(_)));
    }

    #[tokio::test]
    async fn test_empty_material_library_publishes_without_cover() {
        let driver = Arc::new(FakeDriver::with_urls(&[
            "https://mp.sohu.com/mpfe/v4/contentManagement/news/addarticle",
            "https://mp.sohu.com/mpfe/v4/contentManagement/first/page?id=890",
        ]));
        driver.hide("library-images");
        let sohu = adapter(driver.clone());

        let content = PreparedContent {
            title: "五个字标题".to_string(),
            body_text: "正文".to_string(),
            body_html: "<p>正文</p>".to_string(),
            cover: CoverChoice::MaterialLibrary,
        };
        let receipt = sohu.submit(&content).await.unwrap();
        assert_eq!(receipt.platform_article_id.as_deref(), Some("890"));
        assert!(!driver
            .scripts
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.contains("bottom-buttons")));
    }
}
