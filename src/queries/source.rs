//! 查询来源：本地生成器、静态列表、Wikipedia 热门条目
//!
//! 每个来源只负责「给出一批候选字符串」；网络与解析细节留在来源内部，引擎不关心。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;

use crate::config::QueriesSection;
use crate::core::error::SourceError;

/// 命名的候选查询来源
#[async_trait]
pub trait QuerySource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<String>, SourceError>;
}

const TOPICS: &[&str] = &[
    "weather", "sourdough bread", "marathon training", "electric cars", "houseplants",
    "jazz history", "budget travel", "chess openings", "solar panels", "home workouts",
    "coffee brewing", "space telescopes", "vegetable garden", "photography", "hiking trails",
    "board games", "ocean currents", "volcanoes", "renaissance art", "python programming",
    "bird watching", "meal prep", "mountain biking", "ancient rome", "meditation",
    "film noir", "origami", "tea ceremony", "northern lights", "podcast recommendations",
];

const TEMPLATES: &[&str] = &[
    "{}",
    "best {}",
    "{} for beginners",
    "how does {} work",
    "{} tips",
    "history of {}",
    "{} near me",
    "latest {} news",
    "what is {}",
    "{} ideas",
];

/// 内置本地生成器：话题 × 句式模板组合；不依赖网络，永远非空
#[derive(Debug, Clone, Default)]
pub struct LocalQueryGenerator;

impl LocalQueryGenerator {
    pub const NAME: &'static str = "local";

    /// 生成 `count` 条互不相同的组合（上限为话题数 × 模板数）
    pub fn generate(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let mut topics: Vec<&str> = TOPICS.to_vec();
        topics.shuffle(&mut rng);
        let mut out = Vec::with_capacity(count.min(TOPICS.len() * TEMPLATES.len()));
        // 先让每个话题各出一次，再换下一轮模板，避免连续同话题
        'outer: for round in 0..TEMPLATES.len() {
            let mut templates: Vec<&str> = TEMPLATES.to_vec();
            templates.rotate_left(round);
            for (i, topic) in topics.iter().enumerate() {
                if out.len() >= count {
                    break 'outer;
                }
                let template = templates[i % templates.len()];
                out.push(template.replace("{}", topic));
            }
        }
        out
    }
}

#[async_trait]
impl QuerySource for LocalQueryGenerator {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.generate(TOPICS.len() * 2))
    }
}

/// 配置中给定的固定查询列表
#[derive(Debug, Clone)]
pub struct StaticQuerySource {
    name: String,
    queries: Vec<String>,
}

impl StaticQuerySource {
    pub fn new(name: impl Into<String>, queries: Vec<String>) -> Self {
        Self {
            name: name.into(),
            queries,
        }
    }
}

#[async_trait]
impl QuerySource for StaticQuerySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<String>, SourceError> {
        if self.queries.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(self.queries.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TopResponse {
    #[serde(default)]
    items: Vec<TopItem>,
}

#[derive(Debug, Deserialize)]
struct TopItem {
    #[serde(default)]
    articles: Vec<TopArticle>,
}

#[derive(Debug, Deserialize)]
struct TopArticle {
    article: String,
}

/// Wikimedia 昨日浏览量最高的条目标题
pub struct WikipediaTopSource {
    client: Client,
    project: String,
}

impl WikipediaTopSource {
    pub const NAME: &'static str = "wikipedia";

    pub fn new(project: &str, timeout_secs: u64) -> Self {
        const USER_AGENT: &str = "reward-runner/0.1 (query diversity; contact: none)";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            project: project.to_string(),
        }
    }

    fn url(&self) -> String {
        let day = Utc::now() - ChronoDuration::days(1);
        format!(
            "https://wikimedia.org/api/rest_v1/metrics/pageviews/top/{}/all-access/{}",
            self.project,
            day.format("%Y/%m/%d")
        )
    }
}

/// 去掉主页、特殊页与命名空间页，下划线换回空格；一个都不剩时返回 Empty
fn article_titles(resp: TopResponse) -> Result<Vec<String>, SourceError> {
    let titles: Vec<String> = resp
        .items
        .into_iter()
        .flat_map(|item| item.articles)
        .map(|a| a.article)
        .filter(|title| title != "Main_Page" && title != "-" && !title.contains(':'))
        .map(|title| title.replace('_', " "))
        .collect();
    if titles.is_empty() {
        return Err(SourceError::Empty);
    }
    Ok(titles)
}

#[async_trait]
impl QuerySource for WikipediaTopSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self) -> Result<Vec<String>, SourceError> {
        let url = self.url();
        tracing::debug!(%url, "fetching wikipedia top articles");
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status().as_u16()));
        }
        let body: TopResponse = resp
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        article_titles(body)
    }
}

/// 按配置中的名字构造来源；未知名字记录警告并跳过
pub fn build_sources(cfg: &QueriesSection) -> Vec<Arc<dyn QuerySource>> {
    let mut sources: Vec<Arc<dyn QuerySource>> = Vec::new();
    for name in &cfg.sources {
        match name.trim().to_lowercase().as_str() {
            WikipediaTopSource::NAME => sources.push(Arc::new(WikipediaTopSource::new(
                &cfg.wikipedia_project,
                cfg.timeout_secs,
            ))),
            "static" => sources.push(Arc::new(StaticQuerySource::new(
                "static",
                cfg.static_queries.clone(),
            ))),
            LocalQueryGenerator::NAME => sources.push(Arc::new(LocalQueryGenerator)),
            other => tracing::warn!(source = %other, "unknown query source, skipped"),
        }
    }
    sources
}
