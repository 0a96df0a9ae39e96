//! 测试用内存页面：按帧脚本化 URL、可见元素、文本与脚本结果

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::PageDriver;
use crate::core::error::DriverError;

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub url: String,
    pub visible: HashSet<String>,
    pub texts: HashMap<String, String>,
    pub eval: Value,
    pub closed: bool,
}

/// 每次 `current_url()` 切换到下一帧（停在最后一帧），其余探测读取当前帧
pub struct FakePage {
    frames: Vec<Frame>,
    /// (当前帧, 下一次 current_url 将切换到的帧)
    cursor: Mutex<(usize, usize)>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        Self::sequence(vec![Frame {
            url: url.to_string(),
            ..Frame::default()
        }])
    }

    pub fn closed() -> Self {
        Self::sequence(vec![Frame {
            closed: true,
            ..Frame::default()
        }])
    }

    pub fn sequence(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            cursor: Mutex::new((0, 0)),
        }
    }

    pub fn with_visible(mut self, locator: &str) -> Self {
        for frame in &mut self.frames {
            frame.visible.insert(locator.to_string());
        }
        self
    }

    pub fn with_text(mut self, locator: &str, text: &str) -> Self {
        for frame in &mut self.frames {
            frame.texts.insert(locator.to_string(), text.to_string());
        }
        self
    }

    pub fn with_eval(mut self, value: Value) -> Self {
        for frame in &mut self.frames {
            frame.eval = value.clone();
        }
        self
    }

    fn frame(&self) -> Result<Frame, DriverError> {
        let (index, _) = *self.cursor.lock().unwrap();
        let frame = self.frames[index.min(self.frames.len() - 1)].clone();
        if frame.closed {
            return Err(DriverError::PageClosed("target closed".into()));
        }
        Ok(frame)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn current_url(&self) -> Result<String, DriverError> {
        {
            let mut cursor = self.cursor.lock().unwrap();
            let next = cursor.1.min(self.frames.len() - 1);
            *cursor = (next, next + 1);
        }
        Ok(self.frame()?.url)
    }

    async fn is_visible(&self, locator: &str, _timeout_ms: u64) -> Result<bool, DriverError> {
        Ok(self.frame()?.visible.contains(locator))
    }

    async fn text_content(
        &self,
        locator: &str,
        _timeout_ms: u64,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.frame()?.texts.get(locator).cloned())
    }

    async fn evaluate(&self, _script: &str) -> Result<Value, DriverError> {
        Ok(self.frame()?.eval)
    }
}
