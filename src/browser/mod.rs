//! 浏览器连接
//!
//! 连接已打开的浏览器，或按配置自行启动一个。

mod connection;
mod headless;

use anyhow::Result;
use chromiumoxide::Browser;

use crate::config::Config;

pub use connection::connect_to_browser;
pub use headless::launch_browser;

/// 按配置获取浏览器
pub async fn open_browser(config: &Config) -> Result<Browser> {
    if config.launch_browser {
        launch_browser(config.chrome_executable.as_deref(), config.headless).await
    } else {
        connect_to_browser(config.browser_debug_port).await
    }
}
