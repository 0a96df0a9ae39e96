//! reward-runner 入口
//!
//! 加载配置、初始化日志，按配置的时间表定时启动会话进程，Ctrl+C / SIGTERM 时优雅退出。
//! 用法：`reward-runner [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reward_runner::config::{load_config, AppConfig};
use reward_runner::core::shutdown::{
    run_with_graceful_shutdown, SchedulerCleanup, ShutdownCoordinator, ShutdownManager,
};
use reward_runner::core::{RunCallback, RunScheduler};
use reward_runner::observability;
use tokio::process::Command;

/// 每次运行启动一次外部会话进程，非零退出码视为失败（交给调度器重试）
struct CommandCallback {
    command: Vec<String>,
}

#[async_trait]
impl RunCallback for CommandCallback {
    async fn run(&self) -> anyhow::Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            tracing::warn!("scheduler.command is empty, nothing to run");
            return Ok(());
        };
        tracing::info!(%program, ?args, "launching session process");
        let status = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to launch {program}"))?;
        if !status.success() {
            anyhow::bail!("{program} exited with {status}");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = match load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            AppConfig::default()
        }
    };

    let callback = Arc::new(CommandCallback {
        command: cfg.scheduler.command.clone(),
    });
    let scheduler = RunScheduler::new(callback, cfg.scheduler.options());
    scheduler
        .start(&cfg.scheduler.spec())
        .context("Failed to start scheduler")?;

    let mut coordinator = ShutdownCoordinator::new();
    coordinator.register(SchedulerCleanup::new(scheduler));

    // 调度器在后台运行，主任务只等待关闭信号
    let manager = Arc::new(ShutdownManager::new());
    run_with_graceful_shutdown(manager, std::future::pending::<()>(), || async move {
        let failed = coordinator.run_cleanup().await;
        if failed > 0 {
            tracing::warn!(failed, "shutdown finished with incomplete cleanup");
        }
    })
    .await;

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn callback(parts: &[&str]) -> CommandCallback {
        CommandCallback {
            command: parts.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_command_exit_status() {
        assert!(callback(&["sh", "-c", "exit 0"]).run().await.is_ok());
        assert!(callback(&["sh", "-c", "exit 3"]).run().await.is_err());
        assert!(callback(&["/nonexistent/session-binary"]).run().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_command_is_noop() {
        assert!(callback(&[]).run().await.is_ok());
    }
}
