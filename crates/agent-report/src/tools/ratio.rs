//! Single ratio computation

use crate::document::DocumentState;
use agent_llm::tools::schema;
use agent_tools::{Tool, params};
use async_trait::async_trait;
use serde_json::Value;

/// Ratios conventionally quoted as percentages
const PERCENT_RATIOS: &[&str] = &["ROE", "ROA", "profit_margin", "debt_ratio"];

fn display_name(name: &str) -> &str {
    match name {
        "ROE" => "净资产收益率",
        "ROA" => "总资产收益率",
        "current_ratio" => "流动比率",
        "debt_ratio" => "资产负债率",
        "profit_margin" => "利润率",
        other => other,
    }
}

/// `name: value`, as a percentage for the ratios quoted that way
pub fn compute_ratio(name: &str, numerator: f64, denominator: f64) -> String {
    if denominator == 0.0 {
        return "错误：分母不能为零".to_string();
    }

    let ratio = numerator / denominator;
    if PERCENT_RATIOS.contains(&name) {
        format!("{}: {:.2}%", display_name(name), ratio * 100.0)
    } else {
        format!("{}: {:.2}", display_name(name), ratio)
    }
}

pub struct ComputeRatioTool;

#[async_trait]
impl Tool<DocumentState> for ComputeRatioTool {
    async fn execute(&self, params: Value, _state: &mut DocumentState) -> agent_tools::Result<String> {
        let name = params::required_str(&params, "name")?;
        let numerator = params::required_f64(&params, "numerator")?;
        let denominator = params::required_f64(&params, "denominator")?;
        Ok(compute_ratio(name, numerator, denominator))
    }

    fn name(&self) -> &str {
        "compute_ratio"
    }

    fn description(&self) -> &str {
        "Compute a financial ratio such as ROE, ROA, current_ratio or debt_ratio"
    }

    fn input_schema(&self) -> Value {
        schema::object(
            &[
                ("name", schema::string("Ratio name, e.g. ROE, ROA, current_ratio, debt_ratio, profit_margin")),
                ("numerator", schema::number("Numerator")),
                ("denominator", schema::number("Denominator")),
            ],
            &["name", "numerator", "denominator"],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_percentage_ratios() {
        assert_eq!(compute_ratio("ROE", 15.0, 100.0), "净资产收益率: 15.00%");
        assert_eq!(compute_ratio("debt_ratio", 60.0, 100.0), "资产负债率: 60.00%");
    }

    #[test]
    fn test_plain_ratios() {
        assert_eq!(compute_ratio("current_ratio", 500.0, 300.0), "流动比率: 1.67");
        assert_eq!(compute_ratio("asset_turnover", 1.0, 4.0), "asset_turnover: 0.25");
    }

    #[test]
    fn test_zero_denominator() {
        assert_eq!(compute_ratio("ROA", 1.0, 0.0), "错误：分母不能为零");
    }

    #[tokio::test]
    async fn test_tool_needs_no_document() {
        let out = ComputeRatioTool
            .execute(
                json!({"name": "ROA", "numerator": "150", "denominator": 2000}),
                &mut DocumentState::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, "总资产收益率: 7.50%");
    }
}
