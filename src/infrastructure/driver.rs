//! 浏览器自动化能力 - 基础设施层
//!
//! 适配器只通过这个 trait 操作页面，测试时可以替换为假实现。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::BrowserError;

/// 浏览器自动化驱动
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// 导航到指定 URL
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// 当前页面 URL
    async fn current_url(&self) -> Result<Option<String>, BrowserError>;

    /// 执行 JS 代码并返回 JSON 结果
    async fn eval(&self, js_code: String) -> Result<JsonValue, BrowserError>;

    /// 导出当前页面的认证状态（不透明字节）
    async fn export_state(&self) -> Result<Vec<u8>, BrowserError>;

    /// 导入之前导出的认证状态
    async fn import_state(&self, payload: &[u8]) -> Result<(), BrowserError>;

    /// 给匹配选择器的文件输入框设置本地文件
    async fn set_input_file(&self, selector: &str, file: &Path) -> Result<(), BrowserError>;
}
