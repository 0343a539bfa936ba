//! Regex extraction of headline figures from report text

use super::{NO_DOCUMENT_LOADED, format_amount};
use crate::document::DocumentState;
use agent_llm::tools::schema;
use agent_tools::{Tool, params};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::fmt::Write;
use std::str::FromStr;
use std::sync::LazyLock;

/// Figures the extractor knows how to find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinancialField {
    Revenue,
    NetIncome,
    TotalAssets,
    TotalLiabilities,
    Equity,
    CurrentAssets,
    CurrentLiabilities,
    Cash,
    /// Net income attributable to shareholders after non-recurring items
    OperatingIncome,
}

impl FinancialField {
    /// Every field, in the order `all` reports them
    pub const ALL: [FinancialField; 9] = [
        Self::OperatingIncome,
        Self::Revenue,
        Self::NetIncome,
        Self::TotalAssets,
        Self::TotalLiabilities,
        Self::Equity,
        Self::CurrentAssets,
        Self::CurrentLiabilities,
        Self::Cash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::NetIncome => "net_income",
            Self::TotalAssets => "total_assets",
            Self::TotalLiabilities => "total_liabilities",
            Self::Equity => "equity",
            Self::CurrentAssets => "current_assets",
            Self::CurrentLiabilities => "current_liabilities",
            Self::Cash => "cash",
            Self::OperatingIncome => "operating_income",
        }
    }

    /// Label used in the report's own language
    pub fn label(self) -> &'static str {
        match self {
            Self::Revenue => "营业收入",
            Self::NetIncome => "净利润",
            Self::TotalAssets => "总资产",
            Self::TotalLiabilities => "总负债",
            Self::Equity => "股东权益",
            Self::CurrentAssets => "流动资产",
            Self::CurrentLiabilities => "流动负债",
            Self::Cash => "货币资金",
            Self::OperatingIncome => "归属于上市公司股东的扣除非经常性损益的净利润",
        }
    }

    fn patterns(self) -> &'static [Regex] {
        &PATTERNS[self as usize]
    }
}

impl FromStr for FinancialField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s.trim())
            .ok_or(())
    }
}

const NUMBER: &str = r"([\d,，.]+)";

/// Pattern lists indexed by field discriminant; earlier patterns win
static PATTERNS: LazyLock<Vec<Vec<Regex>>> = LazyLock::new(|| {
    let table: [&[&str]; 9] = [
        // Revenue
        &[r"营业收入[：:]\s*", r"营业总收入[：:]\s*", r"一、营业总收入\s+"],
        // NetIncome
        &[r"净利润[：:]\s*", r"归属于.*净利润[：:]\s*", r"四、净利润.*\s+"],
        // TotalAssets
        &[r"资产总计[：:]\s*", r"总资产[：:]\s*"],
        // TotalLiabilities
        &[r"负债合计[：:]\s*", r"负债总计[：:]\s*"],
        // Equity
        &[r"所有者权益.*合计[：:]\s*", r"股东权益合计[：:]\s*"],
        // CurrentAssets
        &[r"流动资产合计[：:]\s*"],
        // CurrentLiabilities
        &[r"流动负债合计[：:]\s*"],
        // Cash
        &[r"货币资金[：:]\s*", r"现金及现金等价物[：:]\s*"],
        // OperatingIncome
        &[
            r"归属于上市公司股东的扣除非经常性损益的净利润[：:]\s*",
            r"非经常性损益净利润[：:]\s*",
        ],
    ];

    table
        .iter()
        .map(|prefixes| {
            prefixes
                .iter()
                .filter_map(|prefix| Regex::new(&format!("{prefix}{NUMBER}")).ok())
                .collect()
        })
        .collect()
});

/// First value any of the field's patterns yields, separators stripped
pub fn extract_field(text: &str, field: FinancialField) -> Option<f64> {
    field.patterns().iter().find_map(|pattern| {
        let raw = pattern.captures(text)?.get(1)?.as_str();
        raw.replace([',', '，'], "").parse::<f64>().ok()
    })
}

/// Value of every field, in [`FinancialField::ALL`] order
pub fn extract_all(text: &str) -> Vec<(FinancialField, Option<f64>)> {
    FinancialField::ALL
        .into_iter()
        .map(|field| (field, extract_field(text, field)))
        .collect()
}

fn render(field: FinancialField, value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{}: {}", field.label(), format_amount(v)),
        None => format!("{}: 未能从报告中提取到 '{}' 相关数据", field.label(), field.as_str()),
    }
}

pub struct ExtractStructuredFieldTool;

#[async_trait]
impl Tool<DocumentState> for ExtractStructuredFieldTool {
    async fn execute(&self, params: Value, state: &mut DocumentState) -> agent_tools::Result<String> {
        let requested = params::required_str(&params, "field_name")?;
        let Some(document) = state.document() else {
            return Ok(NO_DOCUMENT_LOADED.to_string());
        };

        if requested.trim() == "all" {
            let mut out = String::from("提取的财务数据：\n");
            for (field, value) in extract_all(&document.text) {
                let _ = writeln!(out, "- {}", render(field, value));
            }
            return Ok(out);
        }

        match requested.parse::<FinancialField>() {
            Ok(field) => Ok(render(field, extract_field(&document.text, field))),
            Err(()) => Ok(format!("不支持的数据类型: {requested}")),
        }
    }

    fn name(&self) -> &str {
        "extract_structured_field"
    }

    fn description(&self) -> &str {
        "Extract a headline figure (or all of them) from the loaded report"
    }

    fn input_schema(&self) -> Value {
        let mut names: Vec<&str> = FinancialField::ALL.iter().map(|f| f.as_str()).collect();
        names.push("all");
        schema::object(
            &[("field_name", schema::string_enum("Figure to extract", &names))],
            &["field_name"],
        )
    }
}
