//! 登录检测与手动登录等待（各平台共用）

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::AdapterSettings;
use crate::error::AdapterError;
use crate::infrastructure::AutomationDriver;
use crate::models::Session;

use super::LoginCheck;

/// 平台登录相关页面
#[derive(Debug, Clone, Copy)]
pub struct LoginPages {
    pub login_url: &'static str,
    pub home_url: &'static str,
    /// URL 中出现任一关键词即视为未登录
    pub login_markers: &'static [&'static str],
}

impl LoginPages {
    /// 当前 URL 是否表示未登录
    pub fn is_logged_out(&self, url: &str) -> bool {
        url.is_empty()
            || url.starts_with("about:blank")
            || self.login_markers.iter().any(|m| url.contains(m))
    }

    /// 页面是否被平台重定向到登录页（空白页不算）
    pub fn redirected_to_login(&self, url: &str) -> bool {
        self.login_markers.iter().any(|m| url.contains(m))
    }
}

/// 发布过程中检查是否被踢回登录页
pub async fn ensure_still_logged_in(
    driver: &dyn AutomationDriver,
    pages: &LoginPages,
    account_name: &str,
) -> Result<(), AdapterError> {
    let current_url = driver.current_url().await?.unwrap_or_default();
    if pages.redirected_to_login(&current_url) {
        warn!("[{}] 页面被重定向到登录页: {}", account_name, current_url);
        return Err(AdapterError::AuthExpired(format!(
            "页面跳转到登录页: {}",
            current_url
        )));
    }
    Ok(())
}

/// 导入登录状态并打开后台首页，根据 URL 判断是否仍然有效
pub async fn check_login(
    driver: &dyn AutomationDriver,
    pages: &LoginPages,
    session: Option<&Session>,
    account_name: &str,
) -> Result<LoginCheck, AdapterError> {
    let Some(session) = session else {
        info!("[{}] 没有保存的登录状态，视为【未登录】", account_name);
        return Ok(LoginCheck::rejected());
    };

    if let Err(e) = driver.import_state(session.payload()).await {
        warn!("[{}] 登录状态无法导入: {}", account_name, e);
        return Ok(LoginCheck::rejected());
    }

    driver.goto(pages.home_url).await?;
    let current_url = driver.current_url().await?.unwrap_or_default();
    debug!("[{}] 当前URL: {}", account_name, current_url);

    if pages.is_logged_out(&current_url) {
        info!("[{}] 判断为【未登录】（命中登录页）", account_name);
        return Ok(LoginCheck::rejected());
    }

    info!("[{}] 判断为【已登录】", account_name);
    let refreshed = Session::new(driver.export_state().await?);
    Ok(LoginCheck::accepted(Some(refreshed)))
}

/// 打开登录页，等待用户在浏览器中手动登录
///
/// URL 离开登录页后再访问一次后台首页确认，避免中间跳转页误判。
pub async fn wait_for_login(
    driver: &dyn AutomationDriver,
    pages: &LoginPages,
    settings: &AdapterSettings,
    account_name: &str,
) -> Result<Session, AdapterError> {
    info!("[{}] 请在弹出的浏览器中手动登录...", account_name);
    driver.goto(pages.login_url).await?;

    let started = Instant::now();
    let deadline = started + settings.login_timeout;
    let mut last_report = Duration::ZERO;

    loop {
        sleep(settings.poll_interval).await;

        let current_url = driver.current_url().await?.unwrap_or_default();
        if !pages.is_logged_out(&current_url) {
            info!("[{}] URL已变化，验证登录状态...", account_name);
            driver.goto(pages.home_url).await?;
            let verify_url = driver.current_url().await?.unwrap_or_default();
            if !pages.is_logged_out(&verify_url) {
                info!("[{}] ✅ 登录验证成功", account_name);
                return Ok(Session::new(driver.export_state().await?));
            }
            debug!("[{}] 被重定向回登录页，继续等待...", account_name);
        }

        let waited = started.elapsed();
        if Instant::now() >= deadline {
            warn!("[{}] 登录等待超时", account_name);
            return Err(AdapterError::AuthExpired(format!(
                "等待手动登录超时 ({} 秒)",
                settings.login_timeout.as_secs()
            )));
        }
        if waited - last_report >= Duration::from_secs(10) {
            last_report = waited;
            debug!("[{}] 等待登录中... ({} 秒)", account_name, waited.as_secs());
        }
    }
}
