//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露页面操作能力

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::BrowserError;
use crate::infrastructure::driver::AutomationDriver;

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval()、导航、认证状态导入导出能力
/// - 不认识 Account / Article
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
}

/// 导出的浏览器认证状态
#[derive(Debug, Default, Serialize, Deserialize)]
struct BrowserState {
    cookies: Vec<StoredCookie>,
    /// localStorage 所属的页面 origin
    origin: Option<String>,
    local_storage: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure: bool,
    http_only: bool,
}

const READ_LOCAL_STORAGE_JS: &str = r#"
    (() => {
        const items = {};
        try {
            for (let i = 0; i < localStorage.length; i++) {
                const key = localStorage.key(i);
                items[key] = localStorage.getItem(key);
            }
        } catch (e) {}
        return { origin: location.origin, items };
    })()
"#;

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn restore_local_storage(
        &self,
        origin: &str,
        items: &BTreeMap<String, String>,
    ) -> Result<(), BrowserError> {
        self.goto(origin).await?;
        let js_code = format!(
            r#"
            (() => {{
                const items = {};
                for (const [k, v] of Object.entries(items)) {{
                    localStorage.setItem(k, v);
                }}
                return true;
            }})()
            "#,
            serde_json::to_string(items)?
        );
        self.eval(js_code).await?;
        Ok(())
    }
}

#[async_trait]
impl AutomationDriver for JsExecutor {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.page.url().await?)
    }

    async fn eval(&self, js_code: String) -> Result<JsonValue, BrowserError> {
        let result = self.page.evaluate(js_code).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    async fn export_state(&self) -> Result<Vec<u8>, BrowserError> {
        let cookies = self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect::<Vec<_>>();

        let storage = self.eval(READ_LOCAL_STORAGE_JS.to_string()).await?;
        let origin = storage
            .get("origin")
            .and_then(|v| v.as_str())
            .filter(|o| o.starts_with("http"))
            .map(str::to_string);
        let local_storage: BTreeMap<String, String> = storage
            .get("items")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        debug!(
            "导出登录状态: {} 个 Cookie, {} 个 localStorage 项",
            cookies.len(),
            local_storage.len()
        );

        let state = BrowserState {
            cookies,
            origin,
            local_storage,
        };
        Ok(serde_json::to_vec(&state)?)
    }

    async fn import_state(&self, payload: &[u8]) -> Result<(), BrowserError> {
        let state: BrowserState = serde_json::from_slice(payload)?;

        let mut params = Vec::with_capacity(state.cookies.len());
        for cookie in state.cookies {
            let param = CookieParam::builder()
                .name(cookie.name)
                .value(cookie.value)
                .domain(cookie.domain)
                .path(cookie.path)
                .secure(cookie.secure)
                .http_only(cookie.http_only)
                .build()
                .map_err(|reason| BrowserError::StateTransferFailed { reason })?;
            params.push(param);
        }
        if !params.is_empty() {
            self.page.set_cookies(params).await?;
        }

        if let Some(origin) = state.origin.as_deref() {
            if !state.local_storage.is_empty() {
                self.restore_local_storage(origin, &state.local_storage)
                    .await?;
            }
        }

        Ok(())
    }

    async fn set_input_file(&self, selector: &str, file: &Path) -> Result<(), BrowserError> {
        let element = self.page.find_element(selector).await?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![file.to_string_lossy().to_string()])
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(|reason| BrowserError::ConfigurationFailed { reason })?;
        self.page.execute(params).await?;
        Ok(())
    }
}
