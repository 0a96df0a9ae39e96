//! 搜索查询生成：多来源、缓存、交错与去重

pub mod engine;
pub mod source;

pub use engine::{QueryDiversityConfig, QueryDiversityEngine};
pub use source::{
    build_sources, LocalQueryGenerator, QuerySource, StaticQuerySource, WikipediaTopSource,
};
