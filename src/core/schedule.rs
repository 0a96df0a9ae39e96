//! 调度规格：`HH:MM` 每日时间或五段 cron 表达式，统一规范化为 cron 形式
//!
//! 两者同时给出时优先 `HH:MM`；任何一项非法都直接报错，不猜测替代时间。

use chrono::{DateTime, Local, TimeZone};
use croner::Cron;

use crate::core::error::ScheduleError;

/// 调度规格（来自配置）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSpec {
    /// 每日固定时间，如 "07:30"
    pub time: Option<String>,
    /// 五段 cron 表达式，如 "0 9 * * *"
    pub cron: Option<String>,
}

impl ScheduleSpec {
    pub fn daily(time: impl Into<String>) -> Self {
        Self {
            time: Some(time.into()),
            cron: None,
        }
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        Self {
            time: None,
            cron: Some(expr.into()),
        }
    }
}

/// 规范化后的重复触发器
pub struct Schedule {
    expression: String,
    cron: Cron,
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("expression", &self.expression)
            .finish()
    }
}

impl Schedule {
    /// 校验并规范化；`time` 非空时忽略 `cron`
    pub fn parse(spec: &ScheduleSpec) -> Result<Self, ScheduleError> {
        let time = spec.time.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let cron = spec.cron.as_deref().map(str::trim).filter(|s| !s.is_empty());
        match (time, cron) {
            (Some(time), _) => Self::from_daily_time(time),
            (None, Some(expr)) => Self::from_cron(expr),
            (None, None) => Err(ScheduleError::Missing),
        }
    }

    /// "HH:MM" -> "MM HH * * *"
    pub fn from_daily_time(time: &str) -> Result<Self, ScheduleError> {
        let (hour, minute) = parse_hh_mm(time)
            .ok_or_else(|| ScheduleError::InvalidTime(time.to_string()))?;
        Self::from_cron(&format!("{minute} {hour} * * *"))
    }

    pub fn from_cron(expr: &str) -> Result<Self, ScheduleError> {
        let fields = expr.split_whitespace().count();
        if fields != 5 {
            return Err(ScheduleError::InvalidCron {
                expr: expr.to_string(),
                reason: format!("expected 5 fields, got {fields}"),
            });
        }
        let cron = Cron::new(expr)
            .parse()
            .map_err(|e| ScheduleError::InvalidCron {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;
        let schedule = Self {
            expression: expr.split_whitespace().collect::<Vec<_>>().join(" "),
            cron,
        };
        // 语法合法但永不触发（如 2 月 30 日）同样拒绝
        if schedule.next_after(&Local::now()).is_none() {
            return Err(ScheduleError::InvalidCron {
                expr: expr.to_string(),
                reason: "no future occurrence".to_string(),
            });
        }
        Ok(schedule)
    }

    /// 规范化后的 cron 表达式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 严格晚于 `after` 的下一次触发时间
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.cron.find_next_occurrence(after, false).ok()
    }
}

fn parse_hh_mm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}
