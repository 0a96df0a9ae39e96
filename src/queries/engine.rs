//! 多来源查询引擎
//!
//! 流程：并发拉取各来源（带 TTL 缓存）→ 清洗 → 每源截断 → 轮转交错 → 去重 → 空池兜底。
//! 候选池在缓存有效期内稳定；每次 `generate` 只在池内重新洗牌取前 N 条。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::QueriesSection;
use crate::core::error::SourceError;
use crate::queries::source::{build_sources, LocalQueryGenerator, QuerySource};

/// 引擎参数
#[derive(Debug, Clone)]
pub struct QueryDiversityConfig {
    pub max_per_source: usize,
    pub deduplicate: bool,
    pub mix_strategies: bool,
    pub cache_ttl: Duration,
    /// 归一化编辑相似度不低于该值视为重复（仅在 deduplicate 时生效）
    pub similarity_threshold: Option<f64>,
}

impl Default for QueryDiversityConfig {
    fn default() -> Self {
        Self {
            max_per_source: 25,
            deduplicate: true,
            mix_strategies: true,
            cache_ttl: Duration::from_secs(30 * 60),
            similarity_threshold: None,
        }
    }
}

impl From<&QueriesSection> for QueryDiversityConfig {
    fn from(section: &QueriesSection) -> Self {
        Self {
            max_per_source: section.max_per_source,
            deduplicate: section.deduplicate,
            mix_strategies: section.mix_strategies,
            cache_ttl: Duration::from_secs(section.cache_minutes.saturating_mul(60)),
            similarity_threshold: section.similarity_threshold,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedQuerySet {
    queries: Vec<String>,
    fetched_at: Instant,
}

pub struct QueryDiversityEngine {
    sources: Vec<Arc<dyn QuerySource>>,
    fallback: Arc<dyn QuerySource>,
    config: QueryDiversityConfig,
    cache: Mutex<HashMap<String, CachedQuerySet>>,
}

impl QueryDiversityEngine {
    pub fn new(sources: Vec<Arc<dyn QuerySource>>, config: QueryDiversityConfig) -> Self {
        Self {
            sources,
            fallback: Arc::new(LocalQueryGenerator),
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(section: &QueriesSection) -> Self {
        Self::new(build_sources(section), QueryDiversityConfig::from(section))
    }

    /// 替换兜底来源（默认为内置本地生成器）
    pub fn with_fallback(mut self, fallback: Arc<dyn QuerySource>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn config(&self) -> &QueryDiversityConfig {
        &self.config
    }

    /// 最多 `count` 条查询；`count == 0` 时为空
    pub async fn generate(&self, count: usize) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        let mut pool = self.candidate_pool().await;
        pool.shuffle(&mut rand::thread_rng());
        pool.truncate(count);
        tracing::info!(requested = count, produced = pool.len(), "queries generated");
        pool
    }

    /// 去重、交错后的完整候选池（未洗牌）
    pub async fn candidate_pool(&self) -> Vec<String> {
        let fetched = join_all(self.sources.iter().map(|s| self.fetch_cached(s))).await;
        let lists: Vec<Vec<String>> = fetched.into_iter().filter(|l| !l.is_empty()).collect();

        let mut pool = self.assemble(lists);
        if pool.is_empty() {
            tracing::warn!("all query sources empty, using fallback");
            let fallback = self.fetch_cached(&self.fallback).await;
            pool = self.assemble(vec![fallback]);
        }
        pool
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    fn assemble(&self, lists: Vec<Vec<String>>) -> Vec<String> {
        let merged = if self.config.mix_strategies && lists.len() > 1 {
            interleave(lists)
        } else {
            lists.into_iter().flatten().collect()
        };
        if self.config.deduplicate {
            dedupe(merged, self.config.similarity_threshold)
        } else {
            merged
        }
    }

    /// 命中有效缓存直接返回；否则拉取、清洗、截断后写回。失败或空结果不缓存。
    async fn fetch_cached(&self, source: &Arc<dyn QuerySource>) -> Vec<String> {
        let key = source.name().to_string();
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.fetched_at.elapsed() < self.config.cache_ttl {
                    tracing::debug!(source = %key, "query cache hit");
                    return entry.queries.clone();
                }
            }
        }

        let queries = match source.fetch().await {
            Ok(raw) => clean(raw, self.config.max_per_source),
            Err(SourceError::Empty) => {
                tracing::debug!(source = %key, "query source returned nothing");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(source = %key, error = %e, "query source failed");
                return Vec::new();
            }
        };
        if !queries.is_empty() {
            self.cache.lock().await.insert(
                key,
                CachedQuerySet {
                    queries: queries.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        queries
    }
}

/// 去首尾空白、压缩内部空白、丢弃空串，再截断
fn clean(raw: Vec<String>, max: usize) -> Vec<String> {
    raw.into_iter()
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|q| !q.is_empty())
        .take(max)
        .collect()
}

/// 轮流从每个列表取一条，直到全部取完
fn interleave(lists: Vec<Vec<String>>) -> Vec<String> {
    let total = lists.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for it in iters.iter_mut() {
            if let Some(q) = it.next() {
                out.push(q);
            }
        }
    }
    out
}

/// 大小写不敏感去重，保留首次出现；可选相似度阈值
fn dedupe(queries: Vec<String>, threshold: Option<f64>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept_lower: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for q in queries {
        let lower = q.to_lowercase();
        if !seen.insert(lower.clone()) {
            continue;
        }
        if let Some(t) = threshold {
            if kept_lower
                .iter()
                .any(|k| strsim::normalized_levenshtein(k, &lower) >= t)
            {
                continue;
            }
        }
        kept_lower.push(lower);
        out.push(q);
    }
    out
}
