//! Exchange scrapers
//!
//! [`ScraperDispatcher`] picks the scraper for a key's exchange, opens a
//! browser page, and bounds the whole scrape with a timeout. Each exchange
//! variant knows its own search page and markup.

mod beijing;
pub mod driver;
mod shanghai;
mod shenzhen;

#[cfg(feature = "browser")]
pub mod chromium;

pub use beijing::BeijingScraper;
pub use driver::{BrowserDriver, DriverError, DriverResult, ElementInfo, PageSession};
pub use shanghai::ShanghaiScraper;
pub use shenzhen::ShenzhenScraper;

#[cfg(feature = "browser")]
pub use chromium::ChromiumDriver;

use crate::error::{ReportError, Result};
use crate::key::{ExchangeCode, ReportKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

/// Where a report can be downloaded, as found on the exchange site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult {
    company_name: String,
    file_url: String,
}

impl ScrapeResult {
    /// Both fields must be non-blank
    pub fn new(company_name: impl Into<String>, file_url: impl Into<String>) -> Result<Self> {
        let company_name = company_name.into().trim().to_string();
        let file_url = file_url.into().trim().to_string();
        if company_name.is_empty() || file_url.is_empty() {
            return Err(ReportError::InvalidKey(
                "scrape result needs a company name and a file url".to_string(),
            ));
        }
        Ok(Self {
            company_name,
            file_url,
        })
    }

    pub fn company_name(&self) -> &str {
        &self.company_name
    }

    pub fn file_url(&self) -> &str {
        &self.file_url
    }
}

/// Finds report download locations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportScraper: Send + Sync {
    /// Candidate reports for `key`, best first; empty when nothing matched
    async fn scrape(&self, key: &ReportKey) -> Result<Vec<ScrapeResult>>;
}

/// Page-level scraping routine for one exchange
#[async_trait]
pub trait ExchangeScraper: Send + Sync {
    fn exchange(&self) -> ExchangeCode;

    /// Search the exchange for `key` on an already open page
    ///
    /// `wait` bounds every individual wait for the page to settle.
    async fn scrape_page(
        &self,
        page: &mut dyn PageSession,
        key: &ReportKey,
        wait: Duration,
    ) -> DriverResult<Vec<ScrapeResult>>;
}

/// Routes a scrape to the scraper for the key's exchange
pub struct ScraperDispatcher {
    driver: Arc<dyn BrowserDriver>,
    shanghai: ShanghaiScraper,
    shenzhen: ShenzhenScraper,
    beijing: BeijingScraper,
    scrape_timeout: Duration,
    wait_timeout: Duration,
}

impl ScraperDispatcher {
    pub fn new(driver: Arc<dyn BrowserDriver>, scrape_timeout: Duration, wait_timeout: Duration) -> Self {
        Self {
            driver,
            shanghai: ShanghaiScraper,
            shenzhen: ShenzhenScraper,
            beijing: BeijingScraper,
            scrape_timeout,
            wait_timeout,
        }
    }

    fn variant(&self, exchange: ExchangeCode) -> &dyn ExchangeScraper {
        match exchange {
            ExchangeCode::SH => &self.shanghai,
            ExchangeCode::SZ => &self.shenzhen,
            ExchangeCode::BJ => &self.beijing,
        }
    }

    /// Scrape by raw exchange code; unknown codes fail before any browser work
    pub async fn scrape_raw(
        &self,
        exchange_code: &str,
        stock_code: &str,
        fiscal_year: i32,
        period_type: u8,
    ) -> Result<Vec<ScrapeResult>> {
        let key = ReportKey::new(exchange_code.parse()?, stock_code, fiscal_year, period_type)?;
        self.scrape(&key).await
    }
}

#[async_trait]
impl ReportScraper for ScraperDispatcher {
    #[instrument(skip(self), fields(key = %key))]
    async fn scrape(&self, key: &ReportKey) -> Result<Vec<ScrapeResult>> {
        let scraper = self.variant(key.exchange_code());
        let exchange = scraper.exchange();
        let failure = |reason: String| ReportError::ScrapeFailure { exchange, reason };

        info!(exchange = exchange.display_name(), "Scraping exchange site");
        let mut page = self
            .driver
            .open()
            .await
            .map_err(|e| failure(format!("could not open browser: {e}")))?;

        let outcome = tokio::time::timeout(
            self.scrape_timeout,
            scraper.scrape_page(page.as_mut(), key, self.wait_timeout),
        )
        .await;

        if let Err(e) = page.close().await {
            warn!(error = %e, "Failed to close browser page");
        }

        match outcome {
            Err(_) => Err(failure(format!("timed out after {:?}", self.scrape_timeout))),
            Ok(Err(e)) => Err(failure(e.to_string())),
            Ok(Ok(results)) => {
                info!(count = results.len(), "Scrape finished");
                Ok(results)
            }
        }
    }
}

/// Resolve a possibly relative href against `base`
pub(crate) fn resolve(base: &str, href: &str) -> DriverResult<String> {
    let base = Url::parse(base).map_err(|e| DriverError::new(format!("bad base url {base}: {e}")))?;
    base.join(href.trim())
        .map(String::from)
        .map_err(|e| DriverError::new(format!("bad link {href}: {e}")))
}

/// Title fragment the exchanges use for a quarter's report
fn period_label(period_type: u8) -> &'static str {
    match period_type {
        1 => "第一季度",
        2 => "半年度",
        3 => "第三季度",
        _ => "年度报告",
    }
}

/// Whether a listing title names the key's fiscal year and quarter
pub(crate) fn title_matches_period(title: &str, key: &ReportKey) -> bool {
    let label = period_label(key.period_type());
    let period_ok = if key.period_type() == 4 {
        title.contains(label) && !title.contains("半年度")
    } else {
        title.contains(label)
    };
    period_ok && title.contains(&key.fiscal_year().to_string())
}

/// Stable reorder putting rows whose title matches the key's period first
pub(crate) fn rank_by_period(rows: Vec<(String, ScrapeResult)>, key: &ReportKey) -> Vec<ScrapeResult> {
    let (mut matching, rest): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|(title, _)| title_matches_period(title, key));
    matching.extend(rest);
    matching.into_iter().map(|(_, result)| result).collect()
}
