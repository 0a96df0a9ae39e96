//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REWARDS__*` 覆盖（双下划线表示嵌套，如 `REWARDS__SCHEDULER__TIME=06:30`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::retry::{ReloadBudget, RetryTracker};
use crate::core::schedule::ScheduleSpec;
use crate::core::scheduler::SchedulerOptions;
use crate::dashboard::{Anchor, DashboardReader, EarnablePointsCalculator};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerSection,
    pub retry: RetrySection,
    pub queries: QueriesSection,
    pub session: SessionSection,
}

/// [scheduler] 段：触发时间、失败重试、每次运行执行的外部命令
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// 每日触发时间 HH:MM；与 cron 同时设置时优先
    pub time: Option<String>,
    /// 5 段 cron 表达式
    pub cron: Option<String>,
    pub max_retries: u32,
    /// 第 n 次重试等待 retry_base_secs × n
    pub retry_base_secs: u64,
    pub run_on_start: bool,
    /// 每次运行启动的会话进程（程序 + 参数）；为空时只记录警告
    pub command: Vec<String>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            time: None,
            cron: None,
            max_retries: 2,
            retry_base_secs: 60,
            run_on_start: false,
            command: Vec::new(),
        }
    }
}

impl SchedulerSection {
    pub fn spec(&self) -> ScheduleSpec {
        ScheduleSpec {
            time: self.time.clone(),
            cron: self.cron.clone(),
        }
    }

    pub fn options(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_retries: self.max_retries,
            retry_base: Duration::from_secs(self.retry_base_secs),
            run_on_start: self.run_on_start,
        }
    }
}

/// [retry] 段：会话内部操作的重试上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// 单条操作链的最大重试次数；非正数表示不重试
    pub max_attempts: i32,
    pub reload_max_attempts: u32,
    /// 页面重载的累计耗时上限（秒）
    pub reload_max_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            reload_max_attempts: 5,
            reload_max_secs: 120,
        }
    }
}

impl RetrySection {
    /// 每条操作链各用一个新的计数器
    pub fn tracker(&self) -> RetryTracker {
        RetryTracker::new(self.max_attempts)
    }

    /// 计时从调用时开始
    pub fn reload_budget(&self) -> ReloadBudget {
        ReloadBudget::new(
            self.reload_max_attempts,
            Duration::from_secs(self.reload_max_secs),
        )
    }
}

/// [queries] 段：查询来源与多样性策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueriesSection {
    /// 来源名：wikipedia / static / local
    pub sources: Vec<String>,
    pub max_per_source: usize,
    pub deduplicate: bool,
    pub mix_strategies: bool,
    pub cache_minutes: u64,
    /// 0..=1，越大越宽松；不设置时只做大小写不敏感的精确去重
    pub similarity_threshold: Option<f64>,
    pub static_queries: Vec<String>,
    /// Wikimedia 项目名，如 en.wikipedia
    pub wikipedia_project: String,
    /// 网络来源请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for QueriesSection {
    fn default() -> Self {
        Self {
            sources: vec!["wikipedia".into(), "local".into()],
            max_per_source: 25,
            deduplicate: true,
            mix_strategies: true,
            cache_minutes: 30,
            similarity_threshold: None,
            static_queries: Vec::new(),
            wikipedia_project: "en.wikipedia".into(),
            timeout_secs: 10,
        }
    }
}

/// [session] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub points_per_search: u32,
    pub promotion_types: Vec<String>,
    pub dashboard_anchor: String,
    pub login_poll_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            points_per_search: 5,
            promotion_types: vec!["quiz".into(), "urlreward".into()],
            dashboard_anchor: crate::dashboard::DEFAULT_ANCHOR.into(),
            login_poll_ms: 1500,
        }
    }
}

impl SessionSection {
    pub fn login_poll(&self) -> Duration {
        Duration::from_millis(self.login_poll_ms)
    }

    pub fn calculator(&self) -> EarnablePointsCalculator {
        EarnablePointsCalculator::new(self.promotion_types.clone())
    }

    /// 锚点按字面量匹配
    pub fn reader(&self) -> DashboardReader {
        DashboardReader::new(Anchor::literal(self.dashboard_anchor.as_str()))
    }
}

/// 从 config 目录加载配置，环境变量 REWARDS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REWARDS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REWARDS")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("queries.sources")
            .with_list_parse_key("scheduler.command")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.scheduler.max_retries, 2);
        assert_eq!(cfg.scheduler.options().retry_base, Duration::from_secs(60));
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.queries.max_per_source, 25);
        assert_eq!(cfg.session.dashboard_anchor, "var dashboard = ");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scheduler]
time = "07:15"
max_retries = 4
command = ["rewards-session", "--headless"]

[queries]
sources = ["static"]
static_queries = ["rust borrow checker", "tokio select"]
similarity_threshold = 0.85

[session]
points_per_search = 3
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.scheduler.time.as_deref(), Some("07:15"));
        assert_eq!(cfg.scheduler.max_retries, 4);
        assert_eq!(cfg.scheduler.retry_base_secs, 60);
        assert_eq!(cfg.scheduler.command, vec!["rewards-session", "--headless"]);
        assert_eq!(cfg.queries.sources, vec!["static"]);
        assert_eq!(cfg.queries.similarity_threshold, Some(0.85));
        assert!(cfg.queries.deduplicate);
        assert_eq!(cfg.session.points_per_search, 3);
        assert_eq!(cfg.retry.reload_max_secs, 120);

        // time 优先于 config/default.toml 里的 cron
        let schedule = crate::core::schedule::Schedule::parse(&cfg.scheduler.spec()).unwrap();
        assert_eq!(schedule.expression(), "15 7 * * *");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_section_builds_limits() {
        let section = RetrySection {
            max_attempts: 1,
            reload_max_attempts: 10,
            reload_max_secs: 5,
        };
        let mut tracker = section.tracker();
        assert!(tracker.register_failure());
        assert!(!tracker.register_failure());
        assert!(tracker.has_exceeded());

        let mut budget = section.reload_budget();
        assert!(budget.register_failure());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!budget.register_failure());

        let disabled = RetrySection {
            max_attempts: 0,
            ..RetrySection::default()
        };
        assert!(!disabled.tracker().register_failure());
    }

    #[test]
    fn test_session_section_builds_components() {
        let section = SessionSection {
            promotion_types: vec!["WelcomeTour".into()],
            dashboard_anchor: "window.rewards = ".into(),
            login_poll_ms: 250,
            ..SessionSection::default()
        };
        assert_eq!(section.login_poll(), Duration::from_millis(250));

        let snapshot = section
            .reader()
            .parse_document(r#"<script>window.rewards = {"morePromotions":[{"promotionType":"welcometour","pointProgressMax":20},{"promotionType":"quiz","pointProgressMax":50}]};</script>"#)
            .unwrap();
        let points = section.calculator().calculate(&snapshot, "01/01/2026");
        assert_eq!(
            points.get(crate::dashboard::PointCategory::MorePromotions),
            20
        );
        assert!(SessionSection::default()
            .reader()
            .parse_document("window.rewards = {}")
            .is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = load_config(Some(PathBuf::from("/nonexistent/rewards.toml"))).unwrap();
        assert_eq!(cfg.session.login_poll_ms, 1500);
    }
}
