//! 可得积分计算
//!
//! 每类剩余 = Σ(max − progress)；单条 max < progress（上游数据陈旧）按 0 计，
//! 不把负数带进总数。推广活动只统计白名单类型且未锁定的条目。
//! 结果每次从新的快照重算，不跨次缓存。

use std::collections::BTreeMap;

use chrono::Local;
use serde::Serialize;

use crate::dashboard::types::{Counter, DashboardSnapshot, PromotionItem};

/// 积分类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointCategory {
    DesktopSearch,
    MobileSearch,
    DailySet,
    MorePromotions,
}

impl PointCategory {
    pub const ALL: [PointCategory; 4] = [
        PointCategory::DesktopSearch,
        PointCategory::MobileSearch,
        PointCategory::DailySet,
        PointCategory::MorePromotions,
    ];
}

/// 各类别剩余可得积分与总和
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EarnablePoints {
    pub by_category: BTreeMap<PointCategory, u64>,
    pub total: u64,
}

impl EarnablePoints {
    pub fn get(&self, category: PointCategory) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn has_remaining(&self) -> bool {
        self.total > 0
    }

    /// 补满某类搜索积分还需要的搜索次数（向上取整）
    pub fn searches_needed(&self, category: PointCategory, points_per_search: u32) -> u32 {
        if points_per_search == 0 {
            return 0;
        }
        let remaining = self.get(category);
        let per = u64::from(points_per_search);
        u32::try_from(remaining.div_ceil(per)).unwrap_or(u32::MAX)
    }
}

/// 可得积分计算器；`promotion_types` 为参与统计的推广类型白名单
#[derive(Debug, Clone)]
pub struct EarnablePointsCalculator {
    promotion_types: Vec<String>,
}

impl Default for EarnablePointsCalculator {
    fn default() -> Self {
        Self::new(vec!["quiz".to_string(), "urlreward".to_string()])
    }
}

impl EarnablePointsCalculator {
    pub fn new(promotion_types: Vec<String>) -> Self {
        Self {
            promotion_types: promotion_types
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// 以今天的本地日期（MM/DD/YYYY）取每日任务
    pub fn calculate_today(&self, snapshot: &DashboardSnapshot) -> EarnablePoints {
        let today = Local::now().format("%m/%d/%Y").to_string();
        self.calculate(snapshot, &today)
    }

    pub fn calculate(&self, snapshot: &DashboardSnapshot, date_key: &str) -> EarnablePoints {
        let counters = &snapshot.user_status.counters;
        let daily_set = snapshot
            .daily_set_promotions
            .get(date_key)
            .map(|items| saturating_sum(items.iter().map(promotion_remaining)))
            .unwrap_or(0);
        let more_promotions = saturating_sum(
            snapshot
                .more_promotions
                .iter()
                .filter(|item| self.is_eligible(item))
                .map(promotion_remaining),
        );

        let by_category = BTreeMap::from([
            (PointCategory::DesktopSearch, counters_remaining(&counters.pc_search)),
            (PointCategory::MobileSearch, counters_remaining(&counters.mobile_search)),
            (PointCategory::DailySet, daily_set),
            (PointCategory::MorePromotions, more_promotions),
        ]);
        let total = saturating_sum(by_category.values().copied());
        tracing::debug!(?by_category, total, "earnable points computed");
        EarnablePoints { by_category, total }
    }

    fn is_eligible(&self, item: &PromotionItem) -> bool {
        !item.is_locked()
            && self
                .promotion_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&item.promotion_type))
    }
}

fn remaining(progress: i64, max: i64) -> u64 {
    u64::try_from(max.saturating_sub(progress)).unwrap_or(0)
}

/// 上游数值可能大到相加溢出，求和在 u64::MAX 处封顶
fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}

fn counters_remaining(counters: &[Counter]) -> u64 {
    saturating_sum(
        counters
            .iter()
            .map(|c| remaining(c.point_progress, c.point_progress_max)),
    )
}

fn promotion_remaining(item: &PromotionItem) -> u64 {
    remaining(item.point_progress, item.point_progress_max)
}
