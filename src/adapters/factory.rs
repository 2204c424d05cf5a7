//! 适配器工厂
//!
//! 每个账号工作者启动时创建一次适配器，账号任务结束后释放。
//! 浏览器工厂为每个账号打开独立的浏览器上下文，账号之间的 Cookie 互不影响。

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, Page};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::AdapterSettings;
use crate::error::{AdapterError, BrowserError};
use crate::infrastructure::{AutomationDriver, JsExecutor};
use crate::models::{Account, AccountId, Platform};

use super::{BaijiahaoAdapter, PlatformAdapter, SohuAdapter, ToutiaoAdapter};

/// 根据账号创建平台适配器
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn create(&self, account: &Account) -> Result<Arc<dyn PlatformAdapter>, AdapterError>;

    /// 账号任务全部结束后释放 `create` 占用的资源
    async fn release(&self, _account: &Account) {}
}

/// 按平台选择适配器实现
pub fn adapter_for(
    platform: Platform,
    driver: Arc<dyn AutomationDriver>,
    account_name: &str,
    settings: AdapterSettings,
) -> Arc<dyn PlatformAdapter> {
    match platform {
        Platform::Toutiao => Arc::new(ToutiaoAdapter::new(driver, account_name, settings)),
        Platform::Sohu => Arc::new(SohuAdapter::new(driver, account_name, settings)),
        Platform::Baijiahao => Arc::new(BaijiahaoAdapter::new(driver, account_name, settings)),
    }
}

/// 为账号打开的页面及其浏览器上下文
struct OpenedContext {
    page: Page,
    context_id: BrowserContextId,
}

/// 基于 chromiumoxide 浏览器的工厂
pub struct BrowserAdapterFactory {
    browser: Arc<Browser>,
    settings: AdapterSettings,
    opened: Mutex<HashMap<AccountId, OpenedContext>>,
}

impl BrowserAdapterFactory {
    pub fn new(browser: Arc<Browser>, settings: AdapterSettings) -> Self {
        Self {
            browser,
            settings,
            opened: Mutex::new(HashMap::new()),
        }
    }

    /// 在新的浏览器上下文中打开空白页
    async fn open_isolated_page(&self) -> Result<OpenedContext, BrowserError> {
        let context = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await?;
        let context_id = context.result.browser_context_id.clone();
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|reason| BrowserError::ConfigurationFailed { reason })?;

        let page = match self.browser.new_page(params).await {
            Ok(page) => page,
            Err(e) => {
                error!("创建页面失败: {}", e);
                self.dispose_context(context_id, "-").await;
                return Err(BrowserError::PageCreationFailed {
                    source: Box::new(e),
                });
            }
        };
        debug!("已创建独立浏览器上下文: {:?}", context_id);
        Ok(OpenedContext { page, context_id })
    }

    async fn dispose_context(&self, context_id: BrowserContextId, account_name: &str) {
        match self
            .browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
        {
            Ok(_) => debug!("[{}] 浏览器上下文已销毁", account_name),
            Err(e) => warn!("[{}] 销毁浏览器上下文失败: {}", account_name, e),
        }
    }

    async fn close(&self, opened: OpenedContext, account_name: &str) {
        if let Err(e) = opened.page.close().await {
            warn!("[{}] 关闭页面失败: {}", account_name, e);
        }
        self.dispose_context(opened.context_id, account_name).await;
    }
}

#[async_trait]
impl AdapterFactory for BrowserAdapterFactory {
    async fn create(&self, account: &Account) -> Result<Arc<dyn PlatformAdapter>, AdapterError> {
        let opened = self.open_isolated_page().await?;
        let executor = JsExecutor::new(opened.page.clone());
        info!(
            "[{}] 已为 {} 账号打开浏览器页面",
            account.display_name,
            account.platform.name()
        );

        let previous = self
            .opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account.id.clone(), opened);
        if let Some(previous) = previous {
            self.close(previous, &account.display_name).await;
        }

        Ok(adapter_for(
            account.platform,
            Arc::new(executor),
            &account.display_name,
            self.settings.clone(),
        ))
    }

    async fn release(&self, account: &Account) {
        let opened = self
            .opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&account.id);
        if let Some(opened) = opened {
            self.close(opened, &account.display_name).await;
            info!("[{}] 已关闭浏览器页面", account.display_name);
        }
    }
}
