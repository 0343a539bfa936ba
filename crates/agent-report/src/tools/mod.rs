//! Financial analysis toolbox
//!
//! All tools run against the conversation's [`DocumentState`]. Misuse such as
//! a zero denominator or a missing document is reported as text so the model
//! can recover.

pub mod analysis;
pub mod document;
pub mod extract;
pub mod ratio;

pub use analysis::{AnalyzeLeverageTool, AnalyzeLiquidityTool, AnalyzeProfitabilityTool};
pub use document::{LoadDocumentTool, SearchDocumentTool};
pub use extract::{ExtractStructuredFieldTool, FinancialField, extract_all, extract_field};
pub use ratio::ComputeRatioTool;

use crate::document::{DocumentLoader, DocumentState};
use agent_tools::ToolRegistry;
use std::sync::Arc;

/// Returned by content tools before any document is loaded
pub const NO_DOCUMENT_LOADED: &str = "尚未加载文档，请先使用 load_document 工具加载财务报告文件";

/// Registry with every analysis tool, in the order they are advertised
pub fn analysis_toolbox(loader: Arc<dyn DocumentLoader>) -> ToolRegistry<DocumentState> {
    ToolRegistry::new()
        .with(LoadDocumentTool::new(loader))
        .with(SearchDocumentTool)
        .with(ExtractStructuredFieldTool)
        .with(ComputeRatioTool)
        .with(AnalyzeProfitabilityTool)
        .with(AnalyzeLiquidityTool)
        .with(AnalyzeLeverageTool)
}

/// Two decimals with thousands separators, e.g. `1,234.56`
pub fn format_amount(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*d);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FileDocumentLoader;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1234.56), "1,234.56");
        assert_eq!(format_amount(0.5), "0.50");
        assert_eq!(format_amount(-1_234_567.0), "-1,234,567.00");
        assert_eq!(format_amount(999.999), "1,000.00");
    }

    #[test]
    fn test_toolbox_order() {
        let toolbox = analysis_toolbox(Arc::new(FileDocumentLoader));
        assert_eq!(
            toolbox.names(),
            vec![
                "load_document",
                "search_document",
                "extract_structured_field",
                "compute_ratio",
                "analyze_profitability",
                "analyze_liquidity",
                "analyze_leverage",
            ]
        );
    }
}
