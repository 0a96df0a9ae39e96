//! 运行调度器：按每日时间 / cron 触发会话回调
//!
//! 状态：Idle（未安装触发器）→ Armed（已安装，无运行中任务）→ Running（回调执行中）。
//! - 计时循环只负责「到点」检测，回调在独立任务中执行，计时器不会被长时间运行的回调阻塞
//! - 运行中再次到点：直接丢弃并记录日志，不排队、不并发
//! - 回调失败按 `base × attempt` 退避重试，超过 `max_retries` 后放弃，等待下一次自然触发
//! - `stop()` 无条件回到 Idle，包括正处于重试等待时

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::error::ScheduleError;
use crate::core::retry::{LinearBackoff, RetryTracker};
use crate::core::schedule::{Schedule, ScheduleSpec};

/// 调度器每次触发时执行的回调（一次完整会话）
#[async_trait]
pub trait RunCallback: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// 调度器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Armed,
    Running,
}

/// 运行记录（每个调度器一份，只由调度器自身修改）
#[derive(Debug, Clone, Default)]
pub struct RunRecord {
    pub is_running: bool,
    pub last_run_at: Option<DateTime<Local>>,
    pub next_run_at: Option<DateTime<Local>>,
    /// 当前 / 最近一次运行的 ID
    pub run_id: Option<String>,
}

/// 单次触发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Started,
    /// 已有运行中的任务，本次触发被丢弃
    Dropped,
    /// 调度器未启动或已停止
    Idle,
}

/// 调度诊断事件（通过 [`RunScheduler::subscribe`] 注入式观察，不依赖全局状态）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Armed { expression: String },
    Fired { run_id: String },
    Dropped,
    RunSucceeded { run_id: String, attempt: u32 },
    RunFailed { run_id: String, attempt: u32, error: String },
    GaveUp { run_id: String, attempts: u32 },
    Stopped,
}

/// 调度选项（来自 `[scheduler]` 配置段）
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// 回调失败后的最大重试次数
    pub max_retries: u32,
    /// 退避基数：第 n 次重试前等待 base × n
    pub retry_base: Duration,
    /// 启动后立即触发一次
    pub run_on_start: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base: Duration::from_secs(60),
            run_on_start: false,
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    armed: bool,
    record: RunRecord,
    token: Option<CancellationToken>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    callback: Arc<dyn RunCallback>,
    options: SchedulerOptions,
    state: Mutex<SchedulerState>,
    events: broadcast::Sender<SchedulerEvent>,
}

/// 定时运行调度器；可 clone，clone 之间共享同一份状态
#[derive(Clone)]
pub struct RunScheduler {
    inner: Arc<Inner>,
}

impl RunScheduler {
    pub fn new(callback: Arc<dyn RunCallback>, options: SchedulerOptions) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                callback,
                options,
                state: Mutex::new(SchedulerState::default()),
                events,
            }),
        }
    }

    /// 订阅调度事件
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// 校验调度规格并安装触发器（需在 tokio 运行时内调用）
    ///
    /// 规格非法时保持 Idle 并返回错误。
    pub fn start(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        let schedule = match Schedule::parse(spec) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::error!(error = %e, "invalid schedule, scheduler stays idle");
                return Err(e);
            }
        };
        let expression = schedule.expression().to_string();
        let token = CancellationToken::new();
        {
            let mut state = self.inner.lock();
            if state.armed {
                return Err(ScheduleError::AlreadyStarted);
            }
            state.armed = true;
            state.token = Some(token.clone());
            state.timer = Some(tokio::spawn(timer_loop(
                Arc::clone(&self.inner),
                schedule,
                token.clone(),
            )));
        }
        tracing::info!(%expression, "scheduler armed");
        self.inner.emit(SchedulerEvent::Armed { expression });

        if self.inner.options.run_on_start {
            self.inner.fire(&token);
        }
        Ok(())
    }

    /// 移除触发器并回到 Idle；正在等待重试的运行会被放弃
    pub fn stop(&self) {
        let (token, timer) = {
            let mut state = self.inner.lock();
            state.armed = false;
            state.record.next_run_at = None;
            (state.token.take(), state.timer.take())
        };
        if let Some(token) = token {
            token.cancel();
        }
        if let Some(timer) = timer {
            timer.abort();
        }
        tracing::info!("scheduler stopped");
        self.inner.emit(SchedulerEvent::Stopped);
    }

    /// 手动触发一次（与定时触发遵循同样的防重叠规则）
    pub fn fire_now(&self) -> FireOutcome {
        let token = self.inner.lock().token.clone();
        match token {
            Some(token) => self.inner.fire(&token),
            None => FireOutcome::Idle,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        let state = self.inner.lock();
        if !state.armed {
            SchedulerPhase::Idle
        } else if state.record.is_running {
            SchedulerPhase::Running
        } else {
            SchedulerPhase::Armed
        }
    }

    pub fn record(&self) -> RunRecord {
        self.inner.lock().record.clone()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SchedulerEvent) {
        let _ = self.events.send(event);
    }

    /// 到点：检查防重叠标志，空闲则标记 Running 并在独立任务中执行
    fn fire(self: &Arc<Self>, token: &CancellationToken) -> FireOutcome {
        let run_id = {
            let mut state = self.lock();
            if !state.armed || token.is_cancelled() {
                return FireOutcome::Idle;
            }
            if state.record.is_running {
                drop(state);
                tracing::warn!("previous run still in progress, dropping this fire");
                self.emit(SchedulerEvent::Dropped);
                return FireOutcome::Dropped;
            }
            let run_id = format!("run_{}", uuid::Uuid::new_v4());
            state.record.is_running = true;
            state.record.last_run_at = Some(Local::now());
            state.record.run_id = Some(run_id.clone());
            run_id
        };

        tracing::info!(%run_id, "scheduled run started");
        self.emit(SchedulerEvent::Fired {
            run_id: run_id.clone(),
        });
        tokio::spawn(execute_run(Arc::clone(self), run_id, token.clone()));
        FireOutcome::Started
    }
}

/// 计时循环：计算下次触发时间、等待、触发；被取消即退出
async fn timer_loop(inner: Arc<Inner>, schedule: Schedule, token: CancellationToken) {
    let mut last_fire: Option<DateTime<Local>> = None;
    loop {
        let now = Local::now();
        // 以上次触发点为下界，避免时钟抖动导致同一时刻重复触发
        let base = match last_fire {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        let Some(next) = schedule.next_after(&base) else {
            tracing::error!(expression = schedule.expression(), "no future occurrence, timer exits");
            return;
        };
        {
            let mut state = inner.lock();
            // stop() 已清空 next_run_at 时不再写回
            if token.is_cancelled() {
                return;
            }
            state.record.next_run_at = Some(next);
        }
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(next = %next, ?delay, "waiting for next fire");

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        last_fire = Some(next);
        inner.fire(&token);
    }
}

/// 执行一次运行：失败按线性退避重试，超过上限后放弃；结束后清除 Running 标志
async fn execute_run(inner: Arc<Inner>, run_id: String, token: CancellationToken) {
    let mut tracker = RetryTracker::new(inner.options.max_retries.min(i32::MAX as u32) as i32);
    let backoff = LinearBackoff::new(inner.options.retry_base);

    loop {
        let attempt = tracker.attempts() + 1;
        let callback = Arc::clone(&inner.callback);
        // 回调在子任务中执行，panic 也只算一次失败
        let result = match tokio::spawn(async move { callback.run().await }).await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow::anyhow!("run panicked: {join_err}")),
        };

        match result {
            Ok(()) => {
                tracing::info!(%run_id, attempt, "scheduled run succeeded");
                inner.emit(SchedulerEvent::RunSucceeded {
                    run_id: run_id.clone(),
                    attempt,
                });
                break;
            }
            Err(e) => {
                tracing::warn!(%run_id, attempt, error = %e, "scheduled run failed");
                inner.emit(SchedulerEvent::RunFailed {
                    run_id: run_id.clone(),
                    attempt,
                    error: e.to_string(),
                });
                if !tracker.register_failure() {
                    tracing::error!(%run_id, attempts = attempt, "giving up until next scheduled fire");
                    inner.emit(SchedulerEvent::GaveUp {
                        run_id: run_id.clone(),
                        attempts: attempt,
                    });
                    break;
                }
                let delay = backoff.delay_for_attempt(tracker.attempts());
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!(%run_id, "scheduler stopped during retry wait");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    inner.lock().record.is_running = false;
}
