//! 核心层：错误类型、重试与退避、调度表达式、运行调度器、优雅关闭

pub mod error;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod shutdown;

pub use error::{DashboardError, DriverError, ScheduleError, SourceError};
pub use retry::{retry_async, LinearBackoff, ReloadBudget, RetryExhausted, RetryTracker};
pub use schedule::{Schedule, ScheduleSpec};
pub use scheduler::{
    FireOutcome, RunCallback, RunRecord, RunScheduler, SchedulerEvent, SchedulerOptions,
    SchedulerPhase,
};
pub use shutdown::{SchedulerCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason};
