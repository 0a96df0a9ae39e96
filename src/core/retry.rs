//! 重试与退避控制
//!
//! 两种限额共用一个约定：调用方每失败一次调用 `register_failure()`，返回值决定是否还能再试。
//! - [`RetryTracker`]：只按次数限制（如一次移动端搜索的重试链）
//! - [`ReloadBudget`]：次数与累计耗时双上限（页面重载），单次失败很慢时也不会无限拖延
//!
//! 两者都是纯本地状态，不做任何 I/O；真正的等待由 [`retry_async`] 之类的调用方完成。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// 按次数限制的重试计数器；每条操作链独占一个，不跨操作复用
#[derive(Debug, Clone)]
pub struct RetryTracker {
    attempts: u32,
    max_attempts: u32,
}

impl RetryTracker {
    /// 非正数的上限视为「禁用重试」：第一次失败即耗尽
    pub fn new(max_attempts: i32) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(0) as u32,
        }
    }

    /// 记录一次失败，返回是否还允许再试（`attempts <= max_attempts`）
    pub fn register_failure(&mut self) -> bool {
        self.attempts = self.attempts.saturating_add(1);
        !self.has_exceeded()
    }

    pub fn has_exceeded(&self) -> bool {
        self.attempts > self.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// 页面重载用的双上限预算：次数上限或累计耗时上限，先到者为准
///
/// 计时从构造时开始，使用 tokio 时钟（测试中可暂停 / 快进）。
#[derive(Debug, Clone)]
pub struct ReloadBudget {
    tracker: RetryTracker,
    max_elapsed: Duration,
    started_at: Instant,
}

impl ReloadBudget {
    pub fn new(max_attempts: u32, max_elapsed: Duration) -> Self {
        Self {
            tracker: RetryTracker::new(max_attempts.min(i32::MAX as u32) as i32),
            max_elapsed,
            started_at: Instant::now(),
        }
    }

    /// 记录一次失败；次数或耗时任一超限即返回 false
    pub fn register_failure(&mut self) -> bool {
        let within_attempts = self.tracker.register_failure();
        within_attempts && !self.is_time_exhausted()
    }

    pub fn has_exceeded(&self) -> bool {
        self.tracker.has_exceeded() || self.is_time_exhausted()
    }

    pub fn attempts(&self) -> u32 {
        self.tracker.attempts()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn is_time_exhausted(&self) -> bool {
        self.elapsed() >= self.max_elapsed
    }
}

/// 线性退避：第 n 次重试等待 `base × n`，可选封顶
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    base: Duration,
    max: Option<Duration>,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, max: None }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    /// attempt 从 1 开始；attempt 为 0 时不等待
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base.saturating_mul(attempt);
        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// 重试耗尽：携带最后一次错误与总尝试次数
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub last_error: E,
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gave up after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryExhausted<E> {}

/// 显式循环的重试：失败时向 tracker 登记并按退避等待，直到成功或耗尽
///
/// 不递归重入自身，栈深度与等待点都在这一层循环里可见。
pub async fn retry_async<T, E, F, Fut>(
    mut tracker: RetryTracker,
    backoff: LinearBackoff,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    loop {
        let attempt = tracker.attempts() + 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !tracker.register_failure() {
                    tracing::warn!(attempts = tracker.attempts(), error = %e, "retries exhausted");
                    return Err(RetryExhausted {
                        last_error: e,
                        attempts: tracker.attempts(),
                    });
                }
                let delay = backoff.delay_for_attempt(tracker.attempts());
                tracing::debug!(attempt, ?delay, error = %e, "attempt failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
