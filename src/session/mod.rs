//! 会话层辅助：按配置装配、登录闸门、移动端会话重建、结果报告

pub mod gate;
pub mod mobile;
pub mod plan;
pub mod report;

pub use gate::{decide, settle, GateDecision};
pub use mobile::{run_with_fresh_sessions, SessionFactory};
pub use plan::SessionPlan;
pub use report::{PointsLedger, SessionReport};
