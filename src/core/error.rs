//! 核心错误类型
//!
//! 驱动读取失败、调度表达式非法、仪表盘解析失败、查询源失败各自成类；
//! 「分类不确定」「提取不到」「重试耗尽」不在此列，它们是正常结果而不是错误。

use thiserror::Error;

/// UI 自动化驱动读取页面时的错误（页面关闭、跳走、脚本异常等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Page closed or navigated away: {0}")]
    PageClosed(String),

    #[error("Locator failed: {locator}: {reason}")]
    Locator { locator: String, reason: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Driver timeout after {0} ms")]
    Timeout(u64),

    #[error("Driver error: {0}")]
    Other(String),
}

/// 调度规格校验失败；调度器保持 Idle，不会猜测替代时间
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("No schedule configured (need HH:MM time or cron expression)")]
    Missing,

    #[error("Invalid HH:MM time: {0}")]
    InvalidTime(String),

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Scheduler already started")]
    AlreadyStarted,
}

/// 仪表盘数据加载失败
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Dashboard object not found: {0}")]
    NotFound(#[from] crate::dashboard::ExtractError),

    #[error("Dashboard JSON invalid: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Page returned no document text")]
    EmptyDocument,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// 查询源抓取失败
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Unexpected response shape: {0}")]
    Decode(String),

    /// 请求成功但过滤后没有可用查询
    #[error("Source returned no usable queries")]
    Empty,
}
