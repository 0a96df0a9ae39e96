//! 登录闸门：把识别结果翻译成下一步动作，并在页面未稳定时有限次重新识别

use std::time::Duration;

use serde::Serialize;

use crate::browser::{PageDriver, SessionState, StateClassifier, StateDetection};
use crate::core::error::DriverError;
use crate::core::retry::ReloadBudget;

/// 闸门给出的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateDecision {
    /// 已登录，继续任务
    Proceed,
    SubmitEmail,
    SubmitPassword,
    /// 需要人工（二次验证码、通行密钥）
    AwaitHuman,
    /// 状态未知，重载或稍后再识别
    Retry,
    /// 账号被封禁 / 锁定，结束本次会话
    Abort,
}

pub fn decide(detection: &StateDetection) -> GateDecision {
    match detection.state {
        SessionState::LoggedIn => GateDecision::Proceed,
        SessionState::Blocked => GateDecision::Abort,
        SessionState::EmailEntry => GateDecision::SubmitEmail,
        SessionState::PasswordEntry => GateDecision::SubmitPassword,
        SessionState::TwoFactorRequired | SessionState::PasskeyPrompt => GateDecision::AwaitHuman,
        SessionState::Unknown => GateDecision::Retry,
    }
}

/// 反复识别直到得到非 `Unknown` 的状态或预算耗尽
///
/// 预算耗尽时返回最后一次（仍为 `Unknown`）的识别结果，由调用方决定是否放弃；
/// 页面读取失败直接返回错误。
pub async fn settle(
    page: &dyn PageDriver,
    classifier: &StateClassifier,
    budget: &mut ReloadBudget,
    poll: Duration,
) -> Result<StateDetection, DriverError> {
    loop {
        let detection = classifier.classify(page).await?;
        if detection.state != SessionState::Unknown {
            tracing::info!(state = ?detection.state, attempts = budget.attempts(), "page state settled");
            return Ok(detection);
        }
        if !budget.register_failure() {
            tracing::warn!(
                attempts = budget.attempts(),
                elapsed = ?budget.elapsed(),
                url = %detection.url,
                "page state did not settle"
            );
            return Ok(detection);
        }
        tokio::time::sleep(poll).await;
    }
}
