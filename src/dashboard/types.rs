//! 仪表盘快照的数据结构（对应页面内嵌的 dashboard 对象）
//!
//! 上游数据字段时有时无、数字偶尔是 null / 浮点 / 字符串，反序列化一律宽松处理：
//! 缺失或无法识别的数值按 0 计。

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 解析后的仪表盘
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSnapshot {
    pub user_status: UserStatus,
    /// 每日任务，按日期（MM/DD/YYYY）分组
    #[serde(deserialize_with = "lenient_map")]
    pub daily_set_promotions: HashMap<String, Vec<PromotionItem>>,
    #[serde(deserialize_with = "lenient_vec")]
    pub more_promotions: Vec<PromotionItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserStatus {
    #[serde(deserialize_with = "lenient_i64")]
    pub available_points: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub lifetime_points: i64,
    pub counters: Counters,
}

/// 各类进度计数器；同一类可能有多条（如按设备拆分）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Counters {
    #[serde(deserialize_with = "lenient_vec")]
    pub pc_search: Vec<Counter>,
    #[serde(deserialize_with = "lenient_vec")]
    pub mobile_search: Vec<Counter>,
    #[serde(deserialize_with = "lenient_vec")]
    pub activity_and_quiz: Vec<Counter>,
    #[serde(deserialize_with = "lenient_vec")]
    pub daily_point: Vec<Counter>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Counter {
    #[serde(deserialize_with = "lenient_i64")]
    pub point_progress: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub point_progress_max: i64,
}

impl Counter {
    pub fn new(progress: i64, max: i64) -> Self {
        Self {
            point_progress: progress,
            point_progress_max: max,
        }
    }
}

/// 推广活动条目
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PromotionItem {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(deserialize_with = "lenient_string")]
    pub offer_id: String,
    /// 类型标签，如 quiz / urlreward
    #[serde(deserialize_with = "lenient_string")]
    pub promotion_type: String,
    /// "locked" 表示未解锁
    pub exclusive_locked_feature_status: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub point_progress: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub point_progress_max: i64,
    #[serde(deserialize_with = "lenient_bool")]
    pub complete: bool,
}

impl PromotionItem {
    pub fn is_locked(&self) -> bool {
        self.exclusive_locked_feature_status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("locked"))
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// null 或非数组按空列表处理；数组内单个条目坏掉时跳过该条
fn lenient_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_map<'de, D>(d: D) -> Result<HashMap<String, Vec<PromotionItem>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(date, items)| {
                let items = match items {
                    Value::Array(items) => items
                        .into_iter()
                        .filter_map(|item| serde_json::from_value(item).ok())
                        .collect(),
                    _ => Vec::new(),
                };
                (date, items)
            })
            .collect(),
        _ => HashMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variable_upstream_shapes() {
        let json = r#"{
            "userStatus": {
                "availablePoints": "1234",
                "lifetimePoints": 99999.0,
                "counters": {
                    "pcSearch": [{"pointProgress": 30, "pointProgressMax": 150}, "garbage"],
                    "mobileSearch": null,
                    "dailyPoint": [{"pointProgress": null, "pointProgressMax": 10}]
                }
            },
            "dailySetPromotions": null,
            "morePromotions": [
                {"promotionType": "quiz", "pointProgress": 0, "pointProgressMax": 30,
                 "exclusiveLockedFeatureStatus": "locked", "complete": "false", "title": null}
            ],
            "unknownField": {"ignored": true}
        }"#;
        let snapshot: DashboardSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.user_status.available_points, 1234);
        assert_eq!(snapshot.user_status.lifetime_points, 99999);
        assert_eq!(snapshot.user_status.counters.pc_search, vec![Counter::new(30, 150)]);
        assert!(snapshot.user_status.counters.mobile_search.is_empty());
        assert_eq!(snapshot.user_status.counters.daily_point, vec![Counter::new(0, 10)]);
        assert!(snapshot.daily_set_promotions.is_empty());

        let promo = &snapshot.more_promotions[0];
        assert!(promo.is_locked());
        assert!(!promo.complete);
        assert_eq!(promo.title, "");
    }

    #[test]
    fn test_empty_object() {
        let snapshot: DashboardSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snapshot.user_status.available_points, 0);
        assert!(snapshot.more_promotions.is_empty());
    }
}
