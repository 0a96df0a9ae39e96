//! 移动端任务的重试：每次失败都关闭整个会话并重新创建，而不是只重做失败的那一步

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::retry::{LinearBackoff, RetryExhausted, RetryTracker};

/// 会话工厂：负责打开与关闭一个完整会话（浏览器上下文、登录态等）
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Send + Sync + 'static;

    async fn open(&self) -> anyhow::Result<Arc<Self::Session>>;

    /// 关闭失败只记录日志，不影响重试判断
    async fn close(&self, session: Arc<Self::Session>);
}

/// 每次尝试都用新会话执行 `op`；尝试结束（无论成败）都会关闭该会话
pub async fn run_with_fresh_sessions<F, T, Op, Fut>(
    factory: &F,
    mut tracker: RetryTracker,
    backoff: LinearBackoff,
    mut op: Op,
) -> Result<T, RetryExhausted<anyhow::Error>>
where
    F: SessionFactory,
    Op: FnMut(Arc<F::Session>, u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    loop {
        let attempt = tracker.attempts() + 1;
        let result = match factory.open().await {
            Ok(session) => {
                let outcome = op(Arc::clone(&session), attempt).await;
                factory.close(session).await;
                outcome
            }
            Err(e) => Err(e.context("failed to open session")),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !tracker.register_failure() {
                    tracing::error!(attempts = tracker.attempts(), error = %e, "mobile session retries exhausted");
                    return Err(RetryExhausted {
                        last_error: e,
                        attempts: tracker.attempts(),
                    });
                }
                let delay = backoff.delay_for_attempt(tracker.attempts());
                tracing::warn!(attempt, ?delay, error = %e, "mobile session failed, recreating");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingFactory {
        opened: AtomicU32,
        closed: AtomicU32,
        fail_open_first: bool,
    }

    struct Session {
        id: u32,
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        type Session = Session;

        async fn open(&self) -> anyhow::Result<Arc<Session>> {
            let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_open_first && id == 1 {
                anyhow::bail!("browser failed to launch");
            }
            Ok(Arc::new(Session { id }))
        }

        async fn close(&self, _session: Arc<Session>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_session_per_attempt() {
        let factory = CountingFactory::default();
        let backoff = LinearBackoff::new(Duration::from_secs(5));
        let seen = std::sync::Mutex::new(Vec::new());

        let result = run_with_fresh_sessions(&factory, RetryTracker::new(3), backoff, |s, attempt| {
            seen.lock().unwrap().push(s.id);
            async move {
                if attempt < 3 {
                    anyhow::bail!("search failed");
                }
                Ok(s.id)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(factory.opened.load(Ordering::SeqCst), 3);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_retries() {
        let factory = CountingFactory::default();
        let backoff = LinearBackoff::new(Duration::from_secs(1));
        let err = run_with_fresh_sessions(&factory, RetryTracker::new(2), backoff, |_, _| async {
            Err::<(), _>(anyhow::anyhow!("always"))
        })
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(factory.opened.load(Ordering::SeqCst), 3);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_counts_as_attempt() {
        let factory = CountingFactory {
            fail_open_first: true,
            ..CountingFactory::default()
        };
        let backoff = LinearBackoff::new(Duration::from_secs(1));
        let id = run_with_fresh_sessions(&factory, RetryTracker::new(1), backoff, |s, _| async move {
            Ok(s.id)
        })
        .await
        .unwrap();

        assert_eq!(id, 2);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }
}
