//! Report identity: exchange, stock code, fiscal year and quarter

use crate::error::{ReportError, Result};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported stock exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeCode {
    /// Shanghai Stock Exchange
    SH,
    /// Shenzhen Stock Exchange
    SZ,
    /// Beijing Stock Exchange
    BJ,
}

impl ExchangeCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SH => "SH",
            Self::SZ => "SZ",
            Self::BJ => "BJ",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::SH => "Shanghai Stock Exchange",
            Self::SZ => "Shenzhen Stock Exchange",
            Self::BJ => "Beijing Stock Exchange",
        }
    }
}

impl fmt::Display for ExchangeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeCode {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SH" => Ok(Self::SH),
            "SZ" => Ok(Self::SZ),
            "BJ" => Ok(Self::BJ),
            _ => Err(ReportError::UnsupportedExchange(s.to_string())),
        }
    }
}

/// Identity of one periodic report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportKey {
    exchange_code: ExchangeCode,
    stock_code: String,
    fiscal_year: i32,
    period_type: u8,
}

impl ReportKey {
    /// Build a key; `period_type` is the quarter, 1 through 4
    pub fn new(
        exchange_code: ExchangeCode,
        stock_code: impl Into<String>,
        fiscal_year: i32,
        period_type: u8,
    ) -> Result<Self> {
        let stock_code = stock_code.into().trim().to_string();
        if stock_code.is_empty() {
            return Err(ReportError::InvalidKey("stock code is empty".to_string()));
        }
        if !(1..=4).contains(&period_type) {
            return Err(ReportError::InvalidKey(format!(
                "period must be a quarter 1-4, got {period_type}"
            )));
        }
        Ok(Self {
            exchange_code,
            stock_code,
            fiscal_year,
            period_type,
        })
    }

    /// Key for the quarter containing today's date
    pub fn current_period(exchange_code: ExchangeCode, stock_code: impl Into<String>) -> Result<Self> {
        Self::for_date(exchange_code, stock_code, Local::now().date_naive())
    }

    /// Key for the quarter containing `date`
    pub fn for_date(
        exchange_code: ExchangeCode,
        stock_code: impl Into<String>,
        date: NaiveDate,
    ) -> Result<Self> {
        Self::new(exchange_code, stock_code, date.year(), quarter_of(date.month()))
    }

    pub fn exchange_code(&self) -> ExchangeCode {
        self.exchange_code
    }

    pub fn stock_code(&self) -> &str {
        &self.stock_code
    }

    pub fn fiscal_year(&self) -> i32 {
        self.fiscal_year
    }

    pub fn period_type(&self) -> u8 {
        self.period_type
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}Q{}",
            self.exchange_code, self.stock_code, self.fiscal_year, self.period_type
        )
    }
}

fn quarter_of(month: u32) -> u8 {
    ((month - 1) / 3 + 1) as u8
}
