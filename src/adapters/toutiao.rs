//! 今日头条适配器
//!
//! 发布流程：打开发布页 → 填写标题 → 填写正文 → 选择封面 → 预览并发布 → 确认发布

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

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
    login_url: "https://mp.toutiao.com/auth/page/login",
    home_url: "https://mp.toutiao.com/profile_v4/index",
    login_markers: &["login", "auth"],
};

const PUBLISH_URL: &str = "https://mp.toutiao.com/profile_v4/graphic/publish";

const RULES: ContentRules = ContentRules {
    title_min_chars: 2,
    title_max_chars: 30,
    explicit_cover: true,
    material_library: true,
};

const OUTCOME: OutcomeSignals = OutcomeSignals {
    success_url_markers: &["graphic/articles", "manage/content"],
    toast_selectors: &[".byte-message-notice-content", ".byte-message"],
};

/// 页面元素选择器
mod selectors {
    pub const TITLE_INPUT: &[&str] = &["textarea", "input[placeholder*='标题']"];
    pub const CONTENT_EDITOR: &[&str] = &[".ProseMirror", "div[contenteditable='true']"];
    pub const COVER_SELECT_AREA: &[&str] =
        &[".article-cover-images-wrap .article-cover-images > div > div > div > div"];
    /// 素材抽屉中的"我的素材"标签（第4个标签）
    pub const MY_MATERIAL_TAB: &[&str] =
        &[".byte-drawer .byte-tabs-header-nav div > div > div > div:nth-child(4)"];
    pub const MATERIAL_FIRST_IMAGE: &[&str] = &[
        ".byte-drawer .ReactVirtualized__List > div > div > div > div:nth-child(1) > div > div > span.img-span",
    ];
    pub const COVER_FILE_INPUT: &str = ".byte-drawer input[type='file']";
    pub const MATERIAL_CONFIRM_BTN: &[&str] = &[".byte-drawer .footer button.byte-btn-primary"];
    /// 页面底部的"预览并发布"，确认弹窗复用同一个按钮位置
    pub const PUBLISH_BTN: &[&str] = &["#root button.publish-btn.publish-btn-last"];
    pub const NICKNAME: &[&str] = &[
        ".user-info-name",
        ".header-user-name",
        ".account-name",
        ".mp-header-user-info .name",
    ];
}

/// 今日头条适配器
pub struct ToutiaoAdapter {
    driver: Arc<dyn AutomationDriver>,
    account_name: String,
    settings: AdapterSettings,
}

impl ToutiaoAdapter {
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

    async fn click_step(&self, selectors: &[&str], what: &str) -> Result<(), AdapterError> {
        script::require(self.driver.as_ref(), script::click(selectors), what).await?;
        info!("[{}] ✓ 已点击{}", self.account_name, what);
        Ok(())
    }

    /// 从素材库选择第一张图片，素材库为空时返回 false
    async fn select_cover_from_material(&self) -> Result<bool, AdapterError> {
        self.click_step(selectors::COVER_SELECT_AREA, "封面选择区域").await?;
        self.click_step(selectors::MY_MATERIAL_TAB, "'我的素材'标签").await?;

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
        self.click_step(selectors::MATERIAL_FIRST_IMAGE, "素材图片").await?;
        self.click_step(selectors::MATERIAL_CONFIRM_BTN, "确定按钮").await?;
        Ok(true)
    }

    /// 上传本地封面
    async fn upload_cover(&self, path: &Path) -> Result<(), AdapterError> {
        self.click_step(selectors::COVER_SELECT_AREA, "封面选择区域").await?;
        self.driver
            .set_input_file(selectors::COVER_FILE_INPUT, path)
            .await?;
        info!("[{}] ✓ 已上传封面: {}", self.account_name, path.display());
        self.click_step(selectors::MATERIAL_CONFIRM_BTN, "确定按钮").await
    }
}

#[async_trait]
impl PlatformAdapter for ToutiaoAdapter {
    fn platform(&self) -> Platform {
        Platform::Toutiao
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

        info!("[{}] 正在打开发布页面: {}", self.account_name, PUBLISH_URL);
        driver.goto(PUBLISH_URL).await?;
        login::ensure_still_logged_in(driver, &PAGES, &self.account_name).await?;

        let ready = script::wait_for(
            driver,
            selectors::TITLE_INPUT,
            self.settings.page_timeout,
            self.settings.poll_interval,
        )
        .await?;
        if !ready {
            login::ensure_still_logged_in(driver, &PAGES, &self.account_name).await?;
            return Err(AdapterError::TransientNetwork(
                "发布页面加载超时".to_string(),
            ));
        }

        script::require(
            driver,
            script::fill_text(selectors::TITLE_INPUT, &content.title),
            "标题输入框",
        )
        .await?;
        info!("[{}] ✓ 标题已填写", self.account_name);

        script::require(
            driver,
            script::fill_html(selectors::CONTENT_EDITOR, &content.body_html),
            "正文编辑器",
        )
        .await?;
        info!("[{}] ✓ 正文已填写", self.account_name);

        match &content.cover {
            CoverChoice::Explicit(path) => self.upload_cover(path).await?,
            CoverChoice::MaterialLibrary => match self.select_cover_from_material().await {
                Ok(true) => {}
                Ok(false) => warn!("[{}] 素材库中没有可用图片，不设置封面", self.account_name),
                Err(AdapterError::AuthExpired(m)) => return Err(AdapterError::AuthExpired(m)),
                Err(e) => warn!("[{}] 素材库封面设置失败，不设置封面: {}", self.account_name, e),
            },
            CoverChoice::Skip => {}
        }

        self.click_step(selectors::PUBLISH_BTN, "发布按钮").await?;
        // 没有确认弹窗也正常
        if script::eval_bool(driver, script::click(selectors::PUBLISH_BTN)).await? {
            info!("[{}] 已点击确认发布", self.account_name);
        }

        let receipt = await_outcome(
            driver,
            &OUTCOME,
            self.settings.page_timeout,
            self.settings.poll_interval,
        )
        .await
        .map_err(|e| {
            warn!("[{}] 发布失败: {}", self.account_name, e);
            e
        })?;

        info!("[{}] ✅ 文章发布完成: {}", self.account_name, content.title);
        Ok(receipt)
    }

    async fn nickname(&self) -> Result<Option<String>, AdapterError> {
        Ok(script::text_of(self.driver.as_ref(), selectors::NICKNAME).await?)
    }
}
