//! 会话装配：按配置构造一次会话要用的识别器、仪表盘读取器、积分计算器与查询引擎

use std::time::Duration;

use crate::browser::{PageDriver, StateClassifier, StateDetection};
use crate::config::{AppConfig, RetrySection};
use crate::core::error::{DashboardError, DriverError};
use crate::core::retry::RetryTracker;
use crate::dashboard::{
    DashboardReader, DashboardSnapshot, EarnablePoints, EarnablePointsCalculator, PointCategory,
};
use crate::queries::QueryDiversityEngine;
use crate::session::gate::settle;

pub struct SessionPlan {
    classifier: StateClassifier,
    reader: DashboardReader,
    calculator: EarnablePointsCalculator,
    queries: QueryDiversityEngine,
    retry: RetrySection,
    points_per_search: u32,
    login_poll: Duration,
}

impl SessionPlan {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            classifier: StateClassifier::default(),
            reader: cfg.session.reader(),
            calculator: cfg.session.calculator(),
            queries: QueryDiversityEngine::from_config(&cfg.queries),
            retry: cfg.retry.clone(),
            points_per_search: cfg.session.points_per_search,
            login_poll: cfg.session.login_poll(),
        }
    }

    pub fn classifier(&self) -> &StateClassifier {
        &self.classifier
    }

    pub fn queries(&self) -> &QueryDiversityEngine {
        &self.queries
    }

    /// 每条操作链一个新的重试计数器
    pub fn tracker(&self) -> RetryTracker {
        self.retry.tracker()
    }

    /// 登录页识别到稳定状态为止；每次调用使用新的重载预算
    pub async fn settle_login(
        &self,
        page: &dyn PageDriver,
    ) -> Result<StateDetection, DriverError> {
        let mut budget = self.retry.reload_budget();
        settle(page, &self.classifier, &mut budget, self.login_poll).await
    }

    /// 重新读取仪表盘并计算今天剩余的可得积分
    pub async fn read_points(
        &self,
        page: &dyn PageDriver,
    ) -> Result<(DashboardSnapshot, EarnablePoints), DashboardError> {
        let snapshot = self.reader.load_from_page(page).await?;
        let points = self.calculator.calculate_today(&snapshot);
        Ok((snapshot, points))
    }

    pub fn searches_needed(&self, points: &EarnablePoints, category: PointCategory) -> u32 {
        points.searches_needed(category, self.points_per_search)
    }

    /// 补满某类搜索积分所需数量的查询（来源不足时可能更少）
    pub async fn queries_for(
        &self,
        points: &EarnablePoints,
        category: PointCategory,
    ) -> Vec<String> {
        let count = self.searches_needed(points, category) as usize;
        self.queries.generate(count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakePage, Frame};
    use crate::browser::SessionState;
    use crate::config::{QueriesSection, SessionSection};
    use serde_json::json;

    fn config() -> AppConfig {
        AppConfig {
            retry: RetrySection {
                max_attempts: 2,
                reload_max_attempts: 2,
                reload_max_secs: 60,
            },
            queries: QueriesSection {
                sources: vec!["static".into()],
                static_queries: (0..10).map(|i| format!("static query {i}")).collect(),
                ..QueriesSection::default()
            },
            session: SessionSection {
                points_per_search: 3,
                login_poll_ms: 10,
                ..SessionSection::default()
            },
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_points_and_queries_follow_config() {
        let plan = SessionPlan::from_config(&config());
        let html = r#"<script>var dashboard = {"userStatus":{"counters":{"pcSearch":[{"pointProgress":0,"pointProgressMax":15}]}}};</script>"#;
        let page = FakePage::new("https://rewards.bing.com/").with_eval(json!(html));

        let (_, points) = plan.read_points(&page).await.unwrap();
        assert_eq!(points.get(PointCategory::DesktopSearch), 15);
        assert_eq!(plan.searches_needed(&points, PointCategory::DesktopSearch), 5);

        let queries = plan.queries_for(&points, PointCategory::DesktopSearch).await;
        assert_eq!(queries.len(), 5);
        assert!(queries.iter().all(|q| q.starts_with("static query")));
        assert!(plan.queries_for(&points, PointCategory::MobileSearch).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_login_uses_reload_budget() {
        let plan = SessionPlan::from_config(&config());
        let unknown = Frame {
            url: "https://example.com/loading".into(),
            ..Frame::default()
        };
        let page = FakePage::sequence(vec![unknown.clone(), unknown.clone(), unknown]);
        let detection = plan.settle_login(&page).await.unwrap();
        assert_eq!(detection.state, SessionState::Unknown);

        let mut tracker = plan.tracker();
        assert!(tracker.register_failure());
        assert!(tracker.register_failure());
        assert!(!tracker.register_failure());
    }
}
