//! 页面状态识别：把当前页面归入固定的会话状态集合
//!
//! 规则表按优先级有序排列，第一条满足的规则胜出；越具体的信号（如明确的封禁标题）越靠前，
//! 泛化信号（如仅凭域名）垫底。都不满足时返回 `Unknown` / `Low`，这不是错误。
//! 读取页面失败（页面已关闭或中途跳走）会原样返回给调用方。

use futures_util::future::{BoxFuture, FutureExt};
use regex::Regex;
use serde::Serialize;

use crate::browser::PageDriver;
use crate::core::error::DriverError;

/// 会话状态；`LoggedIn` 与 `Blocked` 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    EmailEntry,
    PasswordEntry,
    TwoFactorRequired,
    PasskeyPrompt,
    LoggedIn,
    Blocked,
    Unknown,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::LoggedIn | SessionState::Blocked)
    }
}

/// 识别置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// 一次识别的结果；每次调用新建，调用方只做前后比较
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateDetection {
    pub state: SessionState,
    pub confidence: Confidence,
    pub url: String,
    /// 支撑判定的文本 / 可见性证据
    pub indicators: Vec<String>,
    /// 命中的规则名
    pub rule: Option<String>,
}

impl StateDetection {
    fn unknown(url: String) -> Self {
        Self {
            state: SessionState::Unknown,
            confidence: Confidence::Low,
            url,
            indicators: Vec::new(),
            rule: None,
        }
    }
}

/// 规则条件（带标签的变体，组合后按顺序求值）
#[derive(Debug, Clone)]
pub enum Condition {
    /// URL 包含子串（大小写不敏感）
    UrlContains(String),
    /// 定位器可见
    Visible(String),
    /// 定位器文本包含子串（大小写不敏感）
    TextContains { locator: String, needle: String },
    /// 定位器文本匹配正则
    TextMatches { locator: String, pattern: Regex },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn url(needle: &str) -> Self {
        Condition::UrlContains(needle.to_lowercase())
    }

    pub fn visible(locator: &str) -> Self {
        Condition::Visible(locator.to_string())
    }

    pub fn text(locator: &str, needle: &str) -> Self {
        Condition::TextContains {
            locator: locator.to_string(),
            needle: needle.to_lowercase(),
        }
    }

    /// 正则非法时返回 regex 的错误
    pub fn matches(locator: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Condition::TextMatches {
            locator: locator.to_string(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// 满足时返回证据列表，不满足返回 None
    fn evaluate<'a>(
        &'a self,
        page: &'a dyn PageDriver,
        url: &'a str,
        timeout_ms: u64,
    ) -> BoxFuture<'a, Result<Option<Vec<String>>, DriverError>> {
        async move {
            match self {
                Condition::UrlContains(needle) => Ok(url
                    .to_lowercase()
                    .contains(needle.as_str())
                    .then(|| vec![format!("url contains \"{needle}\"")])),
                Condition::Visible(locator) => Ok(page
                    .is_visible(locator, timeout_ms)
                    .await?
                    .then(|| vec![format!("visible: {locator}")])),
                Condition::TextContains { locator, needle } => {
                    let text = page.text_content(locator, timeout_ms).await?;
                    Ok(text
                        .filter(|t| t.to_lowercase().contains(needle.as_str()))
                        .map(|t| vec![format!("text \"{}\" contains \"{needle}\"", t.trim())]))
                }
                Condition::TextMatches { locator, pattern } => {
                    let text = page.text_content(locator, timeout_ms).await?;
                    Ok(text
                        .filter(|t| pattern.is_match(t))
                        .map(|t| vec![format!("text \"{}\" matches /{}/", t.trim(), pattern.as_str())]))
                }
                Condition::All(conditions) => {
                    let mut evidence = Vec::new();
                    for condition in conditions {
                        match condition.evaluate(page, url, timeout_ms).await? {
                            Some(found) => evidence.extend(found),
                            None => return Ok(None),
                        }
                    }
                    Ok(Some(evidence))
                }
                Condition::Any(conditions) => {
                    for condition in conditions {
                        if let Some(found) = condition.evaluate(page, url, timeout_ms).await? {
                            return Ok(Some(found));
                        }
                    }
                    Ok(None)
                }
                Condition::Not(inner) => Ok(match inner.evaluate(page, url, timeout_ms).await? {
                    Some(_) => None,
                    None => Some(Vec::new()),
                }),
            }
        }
        .boxed()
    }
}

/// 单条规则：条件 → 状态 + 置信度
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub condition: Condition,
    pub state: SessionState,
    pub confidence: Confidence,
}

impl Rule {
    pub fn new(
        name: &str,
        condition: Condition,
        state: SessionState,
        confidence: Confidence,
    ) -> Self {
        Self {
            name: name.to_string(),
            condition,
            state,
            confidence,
        }
    }
}

const TITLE: &str = r#"[data-testid="title"], #loginHeader, #idDiv_SAOTCAS_Title, #iPageTitle"#;
const REWARDS_HOST: &str = "rewards.bing.com";

/// 默认规则表（登录流程 + 积分仪表盘），按优先级排列
pub fn default_rules() -> Vec<Rule> {
    use Confidence::{High, Low, Medium};
    use SessionState::*;

    vec![
        Rule::new(
            "blocked-title",
            Condition::Any(
                [
                    "account has been locked",
                    "account is locked",
                    "account has been suspended",
                    "account is suspended",
                    "we can't sign you in",
                    "we cant sign you in",
                    "unusual activity",
                ]
                .into_iter()
                .map(|needle| Condition::text(TITLE, needle))
                .collect(),
            ),
            Blocked,
            High,
        ),
        Rule::new(
            "blocked-url",
            Condition::Any(vec![
                Condition::url("account.live.com/abuse"),
                Condition::url("/suspended"),
            ]),
            Blocked,
            High,
        ),
        Rule::new(
            "otp-input",
            Condition::Any(vec![
                Condition::visible(r#"input[name="otc"]"#),
                Condition::visible("#idTxtBx_SAOTCC_OTC"),
                Condition::text(TITLE, "enter code"),
            ]),
            TwoFactorRequired,
            High,
        ),
        Rule::new(
            "approve-request",
            Condition::text(TITLE, "approve sign in request"),
            TwoFactorRequired,
            Medium,
        ),
        Rule::new(
            "passkey",
            Condition::Any(vec![
                Condition::text(TITLE, "passkey"),
                Condition::visible(r#"[data-testid="biometricVideo"]"#),
            ]),
            PasskeyPrompt,
            High,
        ),
        Rule::new(
            "password-field",
            Condition::visible(r#"input[type="password"]"#),
            PasswordEntry,
            High,
        ),
        Rule::new(
            "email-field",
            Condition::Any(vec![
                Condition::visible(r#"input[type="email"]"#),
                Condition::visible("#i0116"),
            ]),
            EmailEntry,
            High,
        ),
        Rule::new(
            "rewards-dashboard",
            Condition::All(vec![
                Condition::url(REWARDS_HOST),
                Condition::Any(vec![
                    Condition::visible("#daily-sets"),
                    Condition::visible("mee-rewards-user-status-banner"),
                ]),
            ]),
            LoggedIn,
            High,
        ),
        Rule::new(
            "rewards-host",
            Condition::All(vec![
                Condition::url(REWARDS_HOST),
                Condition::Not(Box::new(Condition::url("/welcome"))),
            ]),
            LoggedIn,
            Medium,
        ),
        Rule::new(
            "login-host",
            Condition::Any(vec![
                Condition::url("login.live.com"),
                Condition::url("login.microsoftonline.com"),
            ]),
            EmailEntry,
            Low,
        ),
    ]
}

/// 状态识别器：有序规则表 + 每个探测的超时
#[derive(Debug, Clone)]
pub struct StateClassifier {
    rules: Vec<Rule>,
    lookup_timeout_ms: u64,
}

impl Default for StateClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl StateClassifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            lookup_timeout_ms: 500,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout_ms: u64) -> Self {
        self.lookup_timeout_ms = timeout_ms;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// 按优先级求值，返回第一条满足的规则对应的状态
    pub async fn classify(&self, page: &dyn PageDriver) -> Result<StateDetection, DriverError> {
        let url = page.current_url().await?;
        for rule in &self.rules {
            if let Some(indicators) = rule
                .condition
                .evaluate(page, &url, self.lookup_timeout_ms)
                .await?
            {
                tracing::debug!(rule = %rule.name, state = ?rule.state, "page classified");
                return Ok(StateDetection {
                    state: rule.state,
                    confidence: rule.confidence,
                    url,
                    indicators,
                    rule: Some(rule.name.clone()),
                });
            }
        }
        tracing::debug!(%url, "no classifier rule matched");
        Ok(StateDetection::unknown(url))
    }
}
