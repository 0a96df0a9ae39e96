//! 页面观察层：驱动接口与页面状态识别

pub mod classifier;
#[cfg(feature = "browser")]
pub mod chrome;
pub mod driver;
#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{
    default_rules, Condition, Confidence, Rule, SessionState, StateClassifier, StateDetection,
};
#[cfg(feature = "browser")]
pub use chrome::ChromeTabDriver;
pub use driver::PageDriver;
