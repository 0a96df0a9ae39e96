//! reward-runner：积分奖励服务的会话编排与容错核心
//!
//! 模块划分：
//! - **browser**: 页面驱动接口与页面状态识别
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、重试 / 退避、调度器、优雅关闭
//! - **dashboard**: 内嵌对象提取、仪表盘快照与可得积分计算
//! - **observability**: 日志初始化
//! - **queries**: 多来源搜索查询生成
//! - **session**: 登录闸门、移动端会话重建、会话报告

pub mod browser;
pub mod config;
pub mod core;
pub mod dashboard;
pub mod observability;
pub mod queries;
pub mod session;

pub use crate::core::{RunCallback, RunScheduler, ScheduleSpec};
