//! 优雅关闭
//!
//! 收到 Ctrl+C / SIGTERM 后：停止调度器（取消计时与重试等待），
//! 给正在进行的会话一段时间收尾，超时则直接退出。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::scheduler::RunScheduler;

/// 关闭原因（仅用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

/// 进程级关闭信号
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 重复调用只生效一次
    pub fn shutdown(&self, reason: ShutdownReason) {
        if !self.token.is_cancelled() {
            tracing::info!(?reason, "shutdown requested");
            self.token.cancel();
        }
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 监听 Ctrl+C 与 SIGTERM（unix）
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 用于日志
    fn name(&self) -> &'static str;
}

/// 按注册顺序执行清理，每项有独立超时
pub struct ShutdownCoordinator {
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            cleanup_tasks: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    /// 返回失败或超时的任务数；单项失败不影响后续任务
    pub async fn run_cleanup(&self) -> usize {
        let mut failed = 0;
        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!(task = name, "cleanup finished"),
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::warn!(task = name, error = %e, "cleanup failed");
                }
                Err(_) => {
                    failed += 1;
                    tracing::warn!(task = name, timeout = ?self.timeout, "cleanup timed out");
                }
            }
        }
        failed
    }
}

/// 停止调度器，并等待进行中的会话结束（受协调器超时约束）
pub struct SchedulerCleanup {
    scheduler: RunScheduler,
    poll: Duration,
}

impl SchedulerCleanup {
    pub fn new(scheduler: RunScheduler) -> Self {
        Self {
            scheduler,
            poll: Duration::from_millis(200),
        }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for SchedulerCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.scheduler.stop();
        while self.scheduler.record().is_running {
            tokio::time::sleep(self.poll).await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scheduler"
    }
}

/// 运行 `app` 直到它结束或收到关闭信号，然后执行清理
pub async fn run_with_graceful_shutdown<F, Fut>(
    manager: Arc<ShutdownManager>,
    app: F,
    cleanup: impl FnOnce() -> Fut,
) where
    F: Future<Output = ()>,
    Fut: Future<Output = ()>,
{
    manager.install_signal_handlers();

    tokio::select! {
        _ = app => tracing::info!("application finished"),
        _ = manager.wait_for_shutdown() => {}
    }

    cleanup().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schedule::ScheduleSpec;
    use crate::core::scheduler::{RunCallback, SchedulerOptions, SchedulerPhase};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagCleanup {
        called: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ShutdownCleanup for FlagCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.called.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "flag"
        }
    }

    struct Stuck;

    #[async_trait::async_trait]
    impl ShutdownCleanup for Stuck {
        async fn cleanup(&self) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    struct Noop;

    #[async_trait::async_trait]
    impl RunCallback for Noop {
        async fn run(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_app_and_runs_cleanup() {
        let manager = Arc::new(ShutdownManager::new());
        manager.shutdown(ShutdownReason::Signal);
        manager.shutdown(ShutdownReason::UserInitiated);

        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        run_with_graceful_shutdown(manager, std::future::pending::<()>(), || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_coordinator_stops_scheduler() {
        let scheduler = RunScheduler::new(Arc::new(Noop), SchedulerOptions::default());
        scheduler.start(&ScheduleSpec::daily("04:00")).unwrap();
        assert_eq!(scheduler.phase(), SchedulerPhase::Armed);

        let mut coordinator = ShutdownCoordinator::new().with_timeout(Duration::from_secs(1));
        let called = Arc::new(AtomicBool::new(false));
        coordinator.register(SchedulerCleanup::new(scheduler.clone()));
        coordinator.register(FlagCleanup {
            called: called.clone(),
        });

        assert_eq!(coordinator.run_cleanup().await, 0);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_cleanup_times_out_and_later_tasks_run() {
        let mut coordinator = ShutdownCoordinator::new().with_timeout(Duration::from_secs(2));
        let called = Arc::new(AtomicBool::new(false));
        coordinator.register(Stuck);
        coordinator.register(FlagCleanup {
            called: called.clone(),
        });

        assert_eq!(coordinator.run_cleanup().await, 1);
        assert!(called.load(Ordering::SeqCst));
    }
}
