//! 页面驱动接口
//!
//! 核心只通过这四个只读操作观察页面；导航、点击、输入都属于外部驱动层。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::error::DriverError;

/// UI 自动化驱动暴露给核心的页面快照能力
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 当前页面 URL
    async fn current_url(&self) -> Result<String, DriverError>;

    /// 定位器（CSS 选择器）对应的元素是否在超时内可见
    async fn is_visible(&self, locator: &str, timeout_ms: u64) -> Result<bool, DriverError>;

    /// 读取定位器区域的可见文本；元素不存在时返回 None
    async fn text_content(
        &self,
        locator: &str,
        timeout_ms: u64,
    ) -> Result<Option<String>, DriverError>;

    /// 在页面内执行脚本并返回结果
    async fn evaluate(&self, script: &str) -> Result<Value, DriverError>;
}
