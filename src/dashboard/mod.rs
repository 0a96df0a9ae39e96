//! 仪表盘：从页面文档中提取内嵌 dashboard 对象，解析并计算可得积分

pub mod extract;
pub mod points;
pub mod types;

pub use extract::{Anchor, EmbeddedObjectExtractor, ExtractError, DEFAULT_MAX_SCAN_BYTES};
pub use points::{EarnablePoints, EarnablePointsCalculator, PointCategory};
pub use types::{Counter, Counters, DashboardSnapshot, PromotionItem, UserStatus};

use crate::browser::PageDriver;
use crate::core::error::DashboardError;

/// 页面脚本中 dashboard 对象前的默认锚点
pub const DEFAULT_ANCHOR: &str = "var dashboard = ";

const DOCUMENT_SCRIPT: &str = "document.documentElement.outerHTML";

/// 仪表盘读取器：锚点 + 提取器
#[derive(Debug, Clone)]
pub struct DashboardReader {
    anchor: Anchor,
    extractor: EmbeddedObjectExtractor,
}

impl Default for DashboardReader {
    fn default() -> Self {
        Self::new(Anchor::literal(DEFAULT_ANCHOR))
    }
}

impl DashboardReader {
    pub fn new(anchor: Anchor) -> Self {
        Self {
            anchor,
            extractor: EmbeddedObjectExtractor::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: EmbeddedObjectExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// 从文档原文解析
    pub fn parse_document(&self, document: &str) -> Result<DashboardSnapshot, DashboardError> {
        let raw = self.extractor.extract(document, &self.anchor)?;
        Ok(serde_json::from_str(raw)?)
    }

    /// 通过驱动读取当前页面 HTML 后解析；每次调用都重新读取，不缓存
    pub async fn load_from_page(
        &self,
        page: &dyn PageDriver,
    ) -> Result<DashboardSnapshot, DashboardError> {
        let document = page.evaluate(DOCUMENT_SCRIPT).await?;
        let document = document
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(DashboardError::EmptyDocument)?;
        match self.parse_document(document) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, doc_len = document.len(), "dashboard extraction failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakePage;

    const DOC: &str = r#"<html><script>
        var dashboard = {"userStatus":{"availablePoints":5000,"counters":{
            "pcSearch":[{"pointProgress":50,"pointProgressMax":150}]}},
            "morePromotions":[{"promotionType":"quiz","title":"{tricky}","pointProgress":0,"pointProgressMax":10}]};
        window.x = {};
    </script></html>"#;

    #[test]
    fn test_parse_document() {
        let snapshot = DashboardReader::default().parse_document(DOC).unwrap();
        assert_eq!(snapshot.user_status.available_points, 5000);
        assert_eq!(snapshot.more_promotions[0].title, "{tricky}");

        let points = EarnablePointsCalculator::default().calculate(&snapshot, "01/01/2026");
        assert_eq!(points.total, 110);
    }

    #[test]
    fn test_invalid_json_inside_balanced_braces() {
        let doc = "var dashboard = {not: 'json'};";
        let err = DashboardReader::default().parse_document(doc).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidJson(_)));
    }

    #[test]
    fn test_missing_anchor() {
        let err = DashboardReader::default()
            .parse_document("<html></html>")
            .unwrap_err();
        assert!(matches!(
            err,
            DashboardError::NotFound(ExtractError::AnchorNotFound)
        ));
    }

    #[tokio::test]
    async fn test_load_from_page() {
        let page = FakePage::new("https://rewards.bing.com/")
            .with_eval(serde_json::Value::String(DOC.to_string()));
        let snapshot = DashboardReader::default().load_from_page(&page).await.unwrap();
        assert_eq!(snapshot.user_status.counters.pc_search.len(), 1);

        let empty = FakePage::new("https://rewards.bing.com/");
        let err = DashboardReader::default().load_from_page(&empty).await.unwrap_err();
        assert!(matches!(err, DashboardError::EmptyDocument));
    }
}
