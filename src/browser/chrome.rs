//! Headless Chrome 适配：把 `headless_chrome::Tab` 包装为 [`PageDriver`]
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! headless_chrome 为同步 API，所有调用都放进 `spawn_blocking`；
//! 可见性与文本读取通过页面内脚本轮询，直到命中或超时。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::Tab;
use serde_json::Value;

use crate::browser::PageDriver;
use crate::core::error::DriverError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 基于已打开 Tab 的只读驱动（Tab 的导航 / 点击由外部驱动层负责）
#[derive(Clone)]
pub struct ChromeTabDriver {
    tab: Arc<Tab>,
}

impl ChromeTabDriver {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, DriverError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| DriverError::Other(format!("Task join: {e}")))?
    }
}

fn eval_blocking(tab: &Tab, script: &str) -> Result<Value, DriverError> {
    let result = tab.evaluate(script, true).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("closed") || msg.contains("detached") {
            DriverError::PageClosed(msg)
        } else {
            DriverError::Script(msg)
        }
    })?;
    Ok(result.value.unwrap_or(Value::Null))
}

/// 反复执行脚本直到返回非 null / 非 false，或超时返回最后一次结果
fn poll_blocking(tab: &Tab, script: &str, timeout_ms: u64) -> Result<Value, DriverError> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let value = eval_blocking(tab, script)?;
        let hit = !matches!(value, Value::Null | Value::Bool(false));
        if hit || Instant::now() >= deadline {
            return Ok(value);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn visibility_script(locator: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return false;
            const style = window.getComputedStyle(el);
            if (style.visibility === 'hidden' || style.display === 'none') return false;
            const rect = el.getBoundingClientRect();
            return rect.width > 0 && rect.height > 0;
        }})()"#,
        sel = js_string(locator)
    )
}

fn text_script(locator: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            return el ? (el.innerText || el.textContent || '') : null;
        }})()"#,
        sel = js_string(locator)
    )
}

#[async_trait]
impl PageDriver for ChromeTabDriver {
    async fn current_url(&self) -> Result<String, DriverError> {
        self.blocking(|tab| Ok(tab.get_url())).await
    }

    async fn is_visible(&self, locator: &str, timeout_ms: u64) -> Result<bool, DriverError> {
        let script = visibility_script(locator);
        self.blocking(move |tab| {
            Ok(matches!(poll_blocking(tab, &script, timeout_ms)?, Value::Bool(true)))
        })
        .await
    }

    async fn text_content(
        &self,
        locator: &str,
        timeout_ms: u64,
    ) -> Result<Option<String>, DriverError> {
        let script = text_script(locator);
        self.blocking(move |tab| {
            Ok(match poll_blocking(tab, &script, timeout_ms)? {
                Value::String(text) => Some(text),
                _ => None,
            })
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let script = script.to_string();
        self.blocking(move |tab| eval_blocking(tab, &script)).await
    }
}
