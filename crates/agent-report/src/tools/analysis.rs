//! Rule-of-thumb assessments over figures the model has already extracted

use crate::document::DocumentState;
use agent_llm::tools::schema;
use agent_tools::{Tool, params};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write;

const CONCLUSION: &str = "\n分析结论：\n";

/// Margin, ROA and non-recurring-adjusted margin with verdicts
pub fn profitability_report(
    revenue: f64,
    net_income: f64,
    total_assets: f64,
    operating_income: f64,
) -> String {
    if revenue == 0.0 || total_assets == 0.0 {
        return "错误：收入或总资产不能为零".to_string();
    }

    let margin = net_income / revenue * 100.0;
    let roa = net_income / total_assets * 100.0;
    let operating_margin = operating_income / revenue * 100.0;

    let mut out = format!(
        "盈利能力分析报告：\n- 利润率: {margin:.2}%\n- 总资产收益率(ROA): {roa:.2}%\n\
         - 扣除非经常性损益后的净利润率: {operating_margin:.2}%\n{CONCLUSION}"
    );
    out.push_str(if margin > 15.0 {
        "- 利润率表现优秀，盈利能力强\n"
    } else if margin > 5.0 {
        "- 利润率处于合理水平\n"
    } else {
        "- 利润率偏低，需要关注成本控制\n"
    });
    out.push_str(if roa > 10.0 {
        "- 资产使用效率高，投资回报良好\n"
    } else if roa > 5.0 {
        "- 资产使用效率中等\n"
    } else {
        "- 资产使用效率较低，需要优化资产配置\n"
    });
    out
}

/// Current, quick and cash ratios with verdicts
pub fn liquidity_report(current_assets: f64, current_liabilities: f64, cash: f64, inventory: f64) -> String {
    if current_liabilities == 0.0 {
        return "错误：流动负债不能为零".to_string();
    }

    let current = current_assets / current_liabilities;
    let quick = (current_assets - inventory) / current_liabilities;
    let cash_ratio = cash / current_liabilities;

    let mut out = format!(
        "流动性分析报告：\n- 流动比率: {current:.2}\n- 速动比率: {quick:.2}\n- 现金比率: {cash_ratio:.2}\n{CONCLUSION}"
    );
    out.push_str(if current >= 2.0 {
        "- 流动比率健康，短期偿债能力强\n"
    } else if current >= 1.0 {
        "- 流动比率基本合理\n"
    } else {
        "- 流动比率偏低，存在短期偿债风险\n"
    });
    out.push_str(if quick >= 1.0 {
        "- 速动比率良好，变现能力强\n"
    } else {
        "- 速动比率偏低，需要关注存货周转\n"
    });
    out
}

/// Capital structure ratios; interest coverage only when both inputs are positive
pub fn leverage_report(
    total_assets: f64,
    total_liabilities: f64,
    equity: f64,
    interest_expense: f64,
    ebit: f64,
) -> String {
    if total_assets == 0.0 || equity == 0.0 {
        return "错误：总资产或股东权益不能为零".to_string();
    }

    let debt_ratio = total_liabilities / total_assets * 100.0;
    let equity_ratio = equity / total_assets * 100.0;
    let debt_to_equity = total_liabilities / equity;

    let mut out = format!(
        "杠杆与资本结构分析：\n- 资产负债率: {debt_ratio:.2}%\n- 股东权益比率: {equity_ratio:.2}%\n\
         - 负债权益比: {debt_to_equity:.2}\n{CONCLUSION}"
    );
    out.push_str(if debt_ratio < 40.0 {
        "- 负债水平较低，财务风险小\n"
    } else if debt_ratio < 60.0 {
        "- 负债水平适中，资本结构合理\n"
    } else {
        "- 负债水平较高，需要关注财务风险\n"
    });

    if interest_expense > 0.0 && ebit > 0.0 {
        let coverage = ebit / interest_expense;
        let _ = writeln!(out, "- 利息保障倍数: {coverage:.2}倍");
        out.push_str(if coverage > 5.0 {
            "  → 利息偿付能力强\n"
        } else if coverage > 2.0 {
            "  → 利息偿付能力尚可\n"
        } else {
            "  → 利息偿付压力较大\n"
        });
    }
    out
}

pub struct AnalyzeProfitabilityTool;

#[async_trait]
impl Tool<DocumentState> for AnalyzeProfitabilityTool {
    async fn execute(&self, params: Value, _state: &mut DocumentState) -> agent_tools::Result<String> {
        Ok(profitability_report(
            params::required_f64(&params, "revenue")?,
            params::required_f64(&params, "net_income")?,
            params::required_f64(&params, "total_assets")?,
            params::optional_f64(&params, "operating_income")?.unwrap_or_default(),
        ))
    }

    fn name(&self) -> &str {
        "analyze_profitability"
    }

    fn description(&self) -> &str {
        "Assess profitability from revenue, net income, total assets and adjusted net income"
    }

    fn input_schema(&self) -> Value {
        schema::object(
            &[
                ("revenue", schema::number("营业收入")),
                ("net_income", schema::number("净利润")),
                ("total_assets", schema::number("总资产")),
                (
                    "operating_income",
                    schema::number("归属于上市公司股东的扣除非经常性损益的净利润"),
                ),
            ],
            &["revenue", "net_income", "total_assets", "operating_income"],
        )
    }
}

pub struct AnalyzeLiquidityTool;

#[async_trait]
impl Tool<DocumentState> for AnalyzeLiquidityTool {
    async fn execute(&self, params: Value, _state: &mut DocumentState) -> agent_tools::Result<String> {
        Ok(liquidity_report(
            params::required_f64(&params, "current_assets")?,
            params::required_f64(&params, "current_liabilities")?,
            params::required_f64(&params, "cash")?,
            params::optional_f64(&params, "inventory")?.unwrap_or_default(),
        ))
    }

    fn name(&self) -> &str {
        "analyze_liquidity"
    }

    fn description(&self) -> &str {
        "Assess short-term solvency from current assets, current liabilities, cash and inventory"
    }

    fn input_schema(&self) -> Value {
        schema::object(
            &[
                ("current_assets", schema::number("流动资产")),
                ("current_liabilities", schema::number("流动负债")),
                ("cash", schema::number("现金及现金等价物")),
                ("inventory", schema::number("存货")),
            ],
            &["current_assets", "current_liabilities", "cash", "inventory"],
        )
    }
}

pub struct AnalyzeLeverageTool;

#[async_trait]
impl Tool<DocumentState> for AnalyzeLeverageTool {
    async fn execute(&self, params: Value, _state: &mut DocumentState) -> agent_tools::Result<String> {
        Ok(leverage_report(
            params::required_f64(&params, "total_assets")?,
            params::required_f64(&params, "total_liabilities")?,
            params::required_f64(&params, "equity")?,
            params::optional_f64(&params, "interest_expense")?.unwrap_or_default(),
            params::optional_f64(&params, "ebit")?.unwrap_or_default(),
        ))
    }

    fn name(&self) -> &str {
        "analyze_leverage"
    }

    fn description(&self) -> &str {
        "Assess capital structure and interest coverage"
    }

    fn input_schema(&self) -> Value {
        schema::object(
            &[
                ("total_assets", schema::number("总资产")),
                ("total_liabilities", schema::number("总负债")),
                ("equity", schema::number("股东权益")),
                ("interest_expense", schema::number("利息费用")),
                ("ebit", schema::number("息税前利润")),
            ],
            &["total_assets", "total_liabilities", "equity", "interest_expense", "ebit"],
        )
    }
}
