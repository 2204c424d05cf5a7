//! 百家号适配器
//!
//! 正文编辑器是 UEditor，位于 iframe `#ueditor_0` 中。
//! 没有本地封面时从"免费正版图库"搜索选择单图封面。

use async_trait::async_trait;
use std::path::Path;
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
    login_url: "https://baijiahao.baidu.com/builder/rc/login",
    home_url: "https://baijiahao.baidu.com/builder/rc/noticemessage/notice_system",
    login_markers: &["login", "passport"],
};

const PUBLISH_URL: &str = "https://baijiahao.baidu.com/builder/rc/edit?type=news";

/// 图库搜索关键词
const GALLERY_KEYWORD: &str = "渡鸦";

const RULES: ContentRules = ContentRules {
    title_min_chars: 8,
    title_max_chars: 30,
    explicit_cover: true,
    material_library: true,
};

const OUTCOME: OutcomeSignals = OutcomeSignals {
    success_url_markers: &["builder/rc/content"],
    toast_selectors: &[".cheetah-message-notice-content", ".cheetah-message"],
};

mod selectors {
    pub const TITLE_INPUT: &[&str] = &[
        ".client_pages_edit_components_titleInput .input-box p",
        "textarea",
        "[placeholder*='标题']",
    ];
    pub const UEDITOR_FRAME: &str = "#ueditor_0";
    /// 新功能引导弹窗的关闭按钮
    pub const TOUR_CLOSE: &[&str] = &[
        ".cheetah-tour-close",
        ".cheetah-tour-skip",
        ".tour-close",
        "[aria-label='Close']",
        ".cheetah-modal-close",
    ];
    pub const SINGLE_IMAGE_RADIO: &[&str] =
        &["#bjhNewsCover .cover-radio-group > label:nth-child(2) input"];
    pub const IMAGE_SELECT_BOX: &[&str] = &[
        "#bjhNewsCover .cover-list.cover-list-one .DraggableTags-tag-drag > div > div",
        "#bjhNewsCover .cover-list",
    ];
    pub const LOCAL_IMAGE_TAB: &[&str] = &["[id$='-tab-choose-remote']"];
    pub const COVER_FILE_INPUT: &str = ".cheetah-modal input[type='file']";
    pub const RIGHTS_TAB: &[&str] = &["#rc-tabs-0-tab-rights", "#rc-tabs-1-tab-rights"];
    pub const GALLERY_SEARCH: &[&str] = &[
        "#rc-tabs-0-panel-rights > div > span > input",
        "#rc-tabs-1-panel-rights > div > span > input",
        "[placeholder*='搜索']",
    ];
    pub const GALLERY_IMAGE: &[&str] = &[
        ".pubu-content > div:nth-child(1) > div",
        ".pubu-content > div:nth-child(2) > div",
    ];
    pub const CONFIRM_BTN: &[&str] = &[".cheetah-modal-footer .cheetah-btn-primary"];
    pub const PUBLISH_BTN: &[&str] = &[".op-list-right div:nth-child(4) > button"];
    pub const BUTTONS: &str = "button";
    pub const MODAL_CLOSE: &[&str] = &[".cheetah-modal-close"];
    pub const NICKNAME: &[&str] = &[".author-name", ".user-name", ".account-name"];
}

/// 在搜索框中输入关键词并回车
fn search_js(selectors: &[&str], keyword: &str) -> String {
    format!(
        r#"
        (() => {{
            const ok = {};
            if (!ok) return false;
            const el = document.activeElement;
            el.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Enter', keyCode: 13, bubbles: true }}));
            return true;
        }})()
        "#,
        script::fill_text(selectors, keyword)
    )
}

/// 百家号适配器
pub struct BaijiahaoAdapter {
    driver: Arc<dyn AutomationDriver>,
    account_name: String,
    settings: AdapterSettings,
}

impl BaijiahaoAdapter {
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
        if !script::wait_for(
            driver,
            selectors,
            self.settings.page_timeout,
            self.settings.poll_interval,
        )
        .await?
        {
            login::ensure_still_logged_in(driver, &PAGES, &self.account_name).await?;
            return Err(AdapterError::TransientNetwork(format!("等待{}超时", what)));
        }
        script::require(driver, script::click(selectors), what).await?;
        info!("[{}] ✓ {}已点击", self.account_name, what);
        Ok(())
    }

    /// 关闭新功能引导弹窗，最多尝试几轮
    async fn close_tour_popups(&self) -> Result<(), AdapterError> {
        for _ in 0..3 {
            if !script::eval_bool(self.driver.as_ref(), script::click(selectors::TOUR_CLOSE)).await? {
                break;
            }
            debug!("[{}] 关闭引导弹窗", self.account_name);
        }
        Ok(())
    }

    async fn open_cover_dialog(&self) -> Result<(), AdapterError> {
        self.wait_and_click(selectors::SINGLE_IMAGE_RADIO, "单图选项").await?;
        self.wait_and_click(selectors::IMAGE_SELECT_BOX, "图片选择框").await
    }

    async fn upload_cover(&self, path: &Path) -> Result<(), AdapterError> {
        self.open_cover_dialog().await?;
        self.wait_and_click(selectors::LOCAL_IMAGE_TAB, "本地上传标签").await?;
        self.driver
            .set_input_file(selectors::COVER_FILE_INPUT, path)
            .await?;
        info!("[{}] ✓ 已上传封面: {}", self.account_name, path.display());
        self.wait_and_click(selectors::CONFIRM_BTN, "确认按钮").await
    }

    /// 从图库选择封面，没有搜索结果时返回 false
    async fn select_cover_from_gallery(&self) -> Result<bool, AdapterError> {
        self.open_cover_dialog().await?;
        self.wait_and_click(selectors::RIGHTS_TAB, "免费正版图库标签").await?;
        script::require(
            self.driver.as_ref(),
            search_js(selectors::GALLERY_SEARCH, GALLERY_KEYWORD),
            "图库搜索框",
        )
        .await?;

        let has_image = script::wait_for(
            self.driver.as_ref(),
            selectors::GALLERY_IMAGE,
            self.settings.page_timeout,
            self.settings.poll_interval,
        )
        .await?;
        if !has_image {
            return Ok(false);
        }
        self.wait_and_click(selectors::GALLERY_IMAGE, "图库图片").await?;
        self.wait_and_click(selectors::CONFIRM_BTN, "确认按钮").await?;
        Ok(true)
    }

    /// 关闭没有完成的封面弹窗
    async fn dismiss_cover_dialog(&self) {
        match script::eval_bool(self.driver.as_ref(), script::click(selectors::MODAL_CLOSE)).await {
            Ok(closed) => debug!("[{}] 封面弹窗关闭: {}", self.account_name, closed),
            Err(e) => debug!("[{}] 关闭封面弹窗失败: {}", self.account_name, e),
        }
    }

    async fn click_publish(&self) -> Result<(), AdapterError> {
        let driver = self.driver.as_ref();
        if script::eval_bool(driver, script::click(selectors::PUBLISH_BTN)).await? {
            info!("[{}] ✓ 发布按钮已点击", self.account_name);
            return Ok(());
        }
        script::require(
            driver,
            script::click_by_text(selectors::BUTTONS, "发布"),
            "发布按钮",
        )
        .await?;
        info!("[{}] ✓ 发布按钮已点击 (文本定位)", self.account_name);
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for BaijiahaoAdapter {
    fn platform(&self) -> Platform {
        Platform::Baijiahao
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

        driver.goto(PUBLISH_URL).await?;
        login::ensure_still_logged_in(driver, &PAGES, &self.account_name).await?;
        if !script::wait_for(
            driver,
            selectors::TITLE_INPUT,
            self.settings.page_timeout,
            self.settings.poll_interval,
        )
        .await?
        {
            login::ensure_still_logged_in(driver, &PAGES, &self.account_name).await?;
            return Err(AdapterError::TransientNetwork(
                "编辑页面加载超时".to_string(),
            ));
        }
        self.close_tour_popups().await?;

        script::require(
            driver,
            script::fill_text(selectors::TITLE_INPUT, &content.title),
            "标题输入框",
        )
        .await?;
        info!("[{}] ✓ 标题填写完成", self.account_name);

        script::require(
            driver,
            script::fill_frame_html(selectors::UEDITOR_FRAME, &content.body_html),
            "正文编辑器",
        )
        .await?;
        info!("[{}] ✓ 正文填写完成", self.account_name);

        match &content.cover {
            CoverChoice::Explicit(path) => self.upload_cover(path).await?,
            CoverChoice::MaterialLibrary => match self.select_cover_from_gallery().await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        "[{}] 图库中没有搜索到图片 ({})，不设置封面",
                        self.account_name, GALLERY_KEYWORD
                    );
                    self.dismiss_cover_dialog().await;
                }
                Err(AdapterError::AuthExpired(m)) => return Err(AdapterError::AuthExpired(m)),
                Err(e) => {
                    warn!("[{}] 图库封面设置失败，不设置封面: {}", self.account_name, e);
                    self.dismiss_cover_dialog().await;
                }
            },
            CoverChoice::Skip => {}
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
            page_timeout: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_prepare_title_window() {
        let adapter = BaijiahaoAdapter::new(Arc::new(FakeDriver::default()), "百家号", settings());
        let short = Article::new("a1", "七个字的标题", "正文");
        assert!(matches!(
            adapter.prepare(&short).await,
            Err(AdapterError::ContentRejected(_))
        ));
        let ok = Article::new("a2", "这是一个八字标题", "正文");
        assert!(adapter.prepare(&ok).await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_fills_ueditor_and_uploads_cover() {
        let driver = Arc::new(FakeDriver::with_urls(&[
            PUBLISH_URL,
            "https://baijiahao.baidu.com/builder/rc/content?article_id=1790",
        ]));
        driver.push_eval(json!(true)); // 标题输入框出现
        driver.push_eval(json!(false)); // 没有引导弹窗
        let adapter = BaijiahaoAdapter::new(driver.clone(), "百家号", settings());

        let content = PreparedContent {
            title: "这是一个八字标题".to_string(),
            body_text: "正文".to_string(),
            body_html: "<p>正文</p>".to_string(),
            cover: CoverChoice::Explicit("/tmp/cover.png".into()),
        };
        let receipt = adapter.submit(&content).await.unwrap();

        assert_eq!(receipt.platform_article_id.as_deref(), Some("1790"));
        assert_eq!(
            driver.uploads.lock().unwrap().as_slice(),
            ["/tmp/cover.png".to_string()]
        );
        assert!(driver
            .scripts
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.contains("#ueditor_0")));
    }

    #[tokio::test]
    async fn test_empty_gallery_publishes_without_cover() {
        let driver = Arc::new(FakeDriver::with_urls(&[
            PUBLISH_URL,
            "https://baijiahao.baidu.com/builder/rc/content?article_id=1791",
        ]));
        driver.push_eval(json!(true)); // 标题输入框出现
        driver.push_eval(json!(false)); // 没有引导弹窗
        driver.hide("pubu-content");
        let adapter = BaijiahaoAdapter::new(driver.clone(), "百家号", settings());

        let content = PreparedContent {
            title: "这是一个八字标题".to_string(),
            body_text: "正文".to_string(),
            body_html: "<p>正文</p>".to_string(),
            cover: CoverChoice::MaterialLibrary,
        };
        let receipt = adapter.submit(&content).await.unwrap();

        assert_eq!(receipt.platform_article_id.as_deref(), Some("1791"));
        let scripts = driver.scripts.lock().unwrap();
        assert!(scripts.iter().any(|s| s.contains("cheetah-modal-close")));
        assert!(scripts.iter().any(|s| s.contains("op-list-right")));
    }

    #[tokio::test]
    async fn test_title_timeout_on_login_page_is_auth_expired() {
        let driver = Arc::new(FakeDriver::with_urls(&[
            PUBLISH_URL,
            "https://passport.baidu.com/v2/?login&u=builder",
        ]));
        driver.hide("titleInput");
        let adapter = BaijiahaoAdapter::new(driver, "百家号", settings());

        let content = PreparedContent {
            title: "这是一个八字标题".to_string(),
            body_text: "正文".to_string(),
            body_html: "<p>正文</p>".to_string(),
            cover: CoverChoice::Skip,
        };
        let err = adapter.submit(&content).await.unwrap_err();
        assert!(matches!(err, AdapterError::AuthExpired(_)));
    }
}
