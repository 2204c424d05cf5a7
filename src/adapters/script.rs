//! 页面脚本工具
//!
//! 所有页面操作都通过注入 JS 完成。每个操作接受一组候选选择器，
//! 按顺序使用第一个能找到的元素（平台改版时只需追加选择器）。

use regex::Regex;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::{AdapterError, BrowserError};
use crate::infrastructure::AutomationDriver;

/// 把候选选择器编码为 JS 数组字面量
fn selectors_js(selectors: &[&str]) -> String {
    serde_json::to_string(selectors).unwrap_or_else(|_| "[]".to_string())
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// 查找元素的 JS 片段，定义 `find()`
fn finder(selectors: &[&str]) -> String {
    format!(
        r#"
        const find = () => {{
            for (const sel of {}) {{
                const el = document.querySelector(sel);
                if (el) return el;
            }}
            return null;
        }};
        "#,
        selectors_js(selectors)
    )
}

/// 元素是否存在
pub fn exists(selectors: &[&str]) -> String {
    format!("(() => {{ {} return !!find(); }})()", finder(selectors))
}

/// 点击元素
pub fn click(selectors: &[&str]) -> String {
    format!(
        r#"
        (() => {{
            {}
            const el = find();
            if (!el) return false;
            el.scrollIntoView({{ block: 'center' }});
            el.click();
            return true;
        }})()
        "#,
        finder(selectors)
    )
}

/// 点击文本包含 `text` 的元素
pub fn click_by_text(candidates: &str, text: &str) -> String {
    format!(
        r#"
        (() => {{
            const text = {};
            for (const el of document.querySelectorAll({})) {{
                const content = el.innerText || el.textContent || '';
                if (content.includes(text)) {{
                    el.scrollIntoView({{ block: 'center' }});
                    el.click();
                    return true;
                }}
            }}
            return false;
        }})()
        "#,
        js_string(text),
        js_string(candidates)
    )
}

/// 填写输入框或可编辑区域的纯文本
///
/// 使用原生 value setter，框架（React/Vue）才能感知到变化。
pub fn fill_text(selectors: &[&str], text: &str) -> String {
    format!(
        r#"
        (() => {{
            {}
            const el = find();
            if (!el) return false;
            const text = {};
            el.focus();
            if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') {{
                const proto = el.tagName === 'TEXTAREA'
                    ? HTMLTextAreaElement.prototype
                    : HTMLInputElement.prototype;
                Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, text);
            }} else {{
                el.innerText = text;
            }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()
        "#,
        finder(selectors),
        js_string(text)
    )
}

/// 设置富文本编辑器的 HTML
pub fn fill_html(selectors: &[&str], html: &str) -> String {
    format!(
        r#"
        (() => {{
            {}
            const el = find();
            if (!el) return false;
            el.focus();
            el.innerHTML = {};
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            return true;
        }})()
        "#,
        finder(selectors),
        js_string(html)
    )
}

/// 设置 iframe 内编辑器（如 UEditor）的 HTML
pub fn fill_frame_html(frame_selector: &str, html: &str) -> String {
    format!(
        r#"
        (() => {{
            const frame = document.querySelector({});
            const body = frame && frame.contentDocument && frame.contentDocument.body;
            if (!body) return false;
            body.focus();
            body.innerHTML = {};
            body.dispatchEvent(new Event('input', {{ bubbles: true }}));
            return true;
        }})()
        "#,
        js_string(frame_selector),
        js_string(html)
    )
}

/// 读取元素文本，找不到返回 null
pub fn read_text(selectors: &[&str]) -> String {
    format!(
        r#"
        (() => {{
            {}
            const el = find();
            return el ? (el.innerText || el.textContent || '').trim() : null;
        }})()
        "#,
        finder(selectors)
    )
}

/// 执行脚本并把结果当作布尔值
pub async fn eval_bool(driver: &dyn AutomationDriver, js_code: String) -> Result<bool, BrowserError> {
    Ok(driver.eval(js_code).await?.as_bool().unwrap_or(false))
}

/// 执行脚本，返回 false 时视为页面未就绪
pub async fn require(
    driver: &dyn AutomationDriver,
    js_code: String,
    what: &str,
) -> Result<(), AdapterError> {
    if eval_bool(driver, js_code).await? {
        Ok(())
    } else {
        Err(AdapterError::TransientNetwork(format!("页面中未找到{}", what)))
    }
}

/// 轮询等待元素出现
pub async fn wait_for(
    driver: &dyn AutomationDriver,
    selectors: &[&str],
    timeout: Duration,
    poll: Duration,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        if eval_bool(driver, exists(selectors)).await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(poll).await;
    }
}

/// 读取提示文本
pub async fn text_of(
    driver: &dyn AutomationDriver,
    selectors: &[&str],
) -> Result<Option<String>, BrowserError> {
    let value = driver.eval(read_text(selectors)).await?;
    Ok(match value {
        JsonValue::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

/// 从发布结果 URL 中提取平台文章ID
pub fn extract_article_id(url: &str) -> Option<String> {
    let re = Regex::new(r"[?&](?:pgc_id|article_id|id)=([0-9A-Za-z_-]+)").ok()?;
    re.captures(url)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// 纯文本正文转换为段落 HTML
pub fn paragraphs_to_html(body: &str) -> String {
    body.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let escaped = p
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace('\n', "<br>");
            format!("<p>{}</p>", escaped)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_article_id() {
        assert_eq!(
            extract_article_id("https://mp.toutiao.com/profile_v4/graphic/articles?pgc_id=7300123"),
            Some("7300123".to_string())
        );
        assert_eq!(
            extract_article_id("https://mp.sohu.com/x?tab=1&id=abc-9"),
            Some("abc-9".to_string())
        );
        assert_eq!(extract_article_id("https://example.com/manage"), None);
    }

    #[test]
    fn test_paragraphs_to_html_escapes() {
        let html = paragraphs_to_html("第一段<b>\n续行\n\n\n第二段 & 结尾");
        assert_eq!(
            html,
            "<p>第一段&lt;b&gt;<br>续行</p><p>第二段 &amp; 结尾</p>"
        );
    }

    #[test]
    fn test_scripts_embed_escaped_text() {
        let js = fill_text(&["textarea"], "带\"引号\"的标题");
        assert!(js.contains(r#""带\"引号\"的标题""#));
        assert!(js.contains(r#"["textarea"]"#));
    }
}
