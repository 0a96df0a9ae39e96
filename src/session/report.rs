//! 会话报告：核心只负责填写积分相关字段，格式化与投递由外部完成

use serde::Serialize;

use crate::dashboard::DashboardSnapshot;

/// 一次会话的结果摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub email: String,
    pub points_earned: i64,
    pub initial_points: i64,
    pub final_points: i64,
    pub desktop_points: i64,
    pub mobile_points: i64,
    pub errors: Vec<String>,
    pub banned: bool,
}

/// 按阶段记录可用积分，最后汇总成报告
///
/// 各阶段增量按 0 下限截断：会话期间兑换奖品会让余额变小，这不算「负收益」。
#[derive(Debug, Clone, Default)]
pub struct PointsLedger {
    email: String,
    initial: Option<i64>,
    after_desktop: Option<i64>,
    after_mobile: Option<i64>,
    final_points: Option<i64>,
    errors: Vec<String>,
    banned: bool,
}

impl PointsLedger {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn record_initial(&mut self, snapshot: &DashboardSnapshot) {
        self.initial = Some(snapshot.user_status.available_points);
    }

    pub fn record_after_desktop(&mut self, snapshot: &DashboardSnapshot) {
        self.after_desktop = Some(snapshot.user_status.available_points);
    }

    pub fn record_after_mobile(&mut self, snapshot: &DashboardSnapshot) {
        self.after_mobile = Some(snapshot.user_status.available_points);
    }

    pub fn record_final(&mut self, snapshot: &DashboardSnapshot) {
        self.final_points = Some(snapshot.user_status.available_points);
    }

    pub fn record_error(&mut self, error: impl std::fmt::Display) {
        self.errors.push(error.to_string());
    }

    pub fn mark_banned(&mut self) {
        self.banned = true;
    }

    pub fn finish(self) -> SessionReport {
        let initial = self.initial.unwrap_or(0);
        // 缺失的阶段沿用上一阶段的值
        let desktop = self.after_desktop.unwrap_or(initial);
        let mobile = self.after_mobile.unwrap_or(desktop);
        let final_points = self.final_points.unwrap_or(mobile);

        let report = SessionReport {
            email: self.email,
            points_earned: gain(initial, final_points),
            initial_points: initial,
            final_points,
            desktop_points: gain(initial, desktop),
            mobile_points: gain(desktop, mobile),
            errors: self.errors,
            banned: self.banned,
        };
        tracing::info!(
            earned = report.points_earned,
            errors = report.errors.len(),
            banned = report.banned,
            "session report ready"
        );
        report
    }
}

fn gain(before: i64, after: i64) -> i64 {
    after.saturating_sub(before).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(points: i64) -> DashboardSnapshot {
        let mut snapshot = DashboardSnapshot::default();
        snapshot.user_status.available_points = points;
        snapshot
    }

    #[test]
    fn test_full_ledger() {
        let mut ledger = PointsLedger::new("someone@example.com");
        ledger.record_initial(&snapshot(1000));
        ledger.record_after_desktop(&snapshot(1150));
        ledger.record_after_mobile(&snapshot(1250));
        ledger.record_final(&snapshot(1290));
        ledger.record_error("quiz timed out");

        let report = ledger.finish();
        assert_eq!(report.points_earned, 290);
        assert_eq!(report.desktop_points, 150);
        assert_eq!(report.mobile_points, 100);
        assert_eq!(report.final_points, 1290);
        assert_eq!(report.errors, vec!["quiz timed out"]);
        assert!(!report.banned);
    }

    #[test]
    fn test_missing_stages_and_redemption() {
        let mut ledger = PointsLedger::new("a@b.c");
        ledger.record_initial(&snapshot(5000));
        ledger.record_final(&snapshot(200));
        ledger.mark_banned();

        let report = ledger.finish();
        assert_eq!(report.points_earned, 0);
        assert_eq!(report.desktop_points, 0);
        assert_eq!(report.mobile_points, 0);
        assert!(report.banned);
    }

    #[test]
    fn test_serialized_field_names() {
        let value = serde_json::to_value(PointsLedger::new("x").finish()).unwrap();
        for key in [
            "email",
            "pointsEarned",
            "initialPoints",
            "finalPoints",
            "desktopPoints",
            "mobilePoints",
            "errors",
            "banned",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
