//! 内嵌对象提取：在文档文本里找到锚点后紧跟的那个结构化对象
//!
//! 从锚点结束处逐字符扫描，维护花括号深度、当前字符串的引号字符与转义状态；
//! 只有字符串外的 `{` / `}` 改变深度。深度回到 0 时整段（含首尾花括号）即为结果。
//! 锚点缺失、括号不平衡、超过扫描上限一律返回「未找到」，从不返回截断的半个对象。

use regex::Regex;
use thiserror::Error;

/// 默认最大扫描长度（字节）
pub const DEFAULT_MAX_SCAN_BYTES: usize = 4 * 1024 * 1024;

/// 对象前的锚点：字面串或正则
#[derive(Debug, Clone)]
pub enum Anchor {
    Literal(String),
    Pattern(Regex),
}

impl Anchor {
    pub fn literal(s: impl Into<String>) -> Self {
        Anchor::Literal(s.into())
    }

    pub fn pattern(re: &str) -> Result<Self, regex::Error> {
        Ok(Anchor::Pattern(Regex::new(re)?))
    }

    /// 锚点在文本中第一次出现的结束位置
    fn end_in(&self, text: &str) -> Option<usize> {
        match self {
            Anchor::Literal(s) => text.find(s.as_str()).map(|i| i + s.len()),
            Anchor::Pattern(re) => re.find(text).map(|m| m.end()),
        }
    }
}

/// 提取不到的原因（都属于正常结果，调用方换一份文档重试或放弃）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("anchor not found")]
    AnchorNotFound,
    #[error("no object follows the anchor")]
    NoObjectAfterAnchor,
    #[error("unbalanced braces")]
    Unbalanced,
    #[error("object exceeds scan limit of {0} bytes")]
    ScanLimitExceeded(usize),
}

/// 平衡花括号扫描器
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedObjectExtractor {
    max_scan: usize,
}

impl Default for EmbeddedObjectExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCAN_BYTES)
    }
}

impl EmbeddedObjectExtractor {
    pub fn new(max_scan: usize) -> Self {
        Self { max_scan }
    }

    /// 只关心找没找到时使用
    pub fn find<'t>(&self, text: &'t str, anchor: &Anchor) -> Option<&'t str> {
        self.extract(text, anchor).ok()
    }

    /// 返回对象原文（锚点与对象之间只允许空白）
    pub fn extract<'t>(&self, text: &'t str, anchor: &Anchor) -> Result<&'t str, ExtractError> {
        let anchor_end = anchor.end_in(text).ok_or(ExtractError::AnchorNotFound)?;
        let bytes = text.as_bytes();

        let start = bytes[anchor_end..]
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|offset| anchor_end + offset)
            .ok_or(ExtractError::NoObjectAfterAnchor)?;
        if bytes[start] != b'{' {
            return Err(ExtractError::NoObjectAfterAnchor);
        }

        let mut depth: usize = 0;
        let mut quote: Option<u8> = None;
        let mut escaped = false;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if offset >= self.max_scan {
                return Err(ExtractError::ScanLimitExceeded(self.max_scan));
            }
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == q {
                    quote = None;
                }
                continue;
            }
            match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        // 花括号与引号都是 ASCII，切片边界必在字符边界上
                        return Ok(&text[start..=start + offset]);
                    }
                }
                _ => {}
            }
        }
        Err(ExtractError::Unbalanced)
    }
}
