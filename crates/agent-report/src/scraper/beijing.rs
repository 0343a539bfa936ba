//! Beijing Stock Exchange periodic report search

use super::driver::{DriverResult, PageSession};
use super::{ExchangeScraper, ScrapeResult, rank_by_period, resolve};
use crate::key::{ExchangeCode, ReportKey};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const BASE: &str = "https://www.bse.cn";
const SEARCH_PAGE: &str = "https://www.bse.cn/disclosure/periodical_report.html";

const LOADING: &str = ".loading";
const SEARCH_INPUT: &str = "#companyCode";
const SEARCH_BUTTON: &str = "#btn-search";
const RESULT_LIST: &str = ".table-list";
const RESULT_LINKS: &str = ".table-list td.title a";

pub struct BeijingScraper;

#[async_trait]
impl ExchangeScraper for BeijingScraper {
    fn exchange(&self) -> ExchangeCode {
        ExchangeCode::BJ
    }

    async fn scrape_page(
        &self,
        page: &mut dyn PageSession,
        key: &ReportKey,
        wait: Duration,
    ) -> DriverResult<Vec<ScrapeResult>> {
        page.goto(SEARCH_PAGE).await?;
        page.wait_for(SEARCH_INPUT, wait).await?;
        page.fill(SEARCH_INPUT, key.stock_code()).await?;
        page.click(SEARCH_BUTTON).await?;
        page.wait_hidden(LOADING, wait).await?;
        page.wait_for(RESULT_LIST, wait).await?;

        let mut rows = Vec::new();
        for link in page.query_all(RESULT_LINKS).await? {
            let Some(href) = link.attr("href") else {
                continue;
            };
            let title = link.attr("title").unwrap_or(&link.text).trim().to_string();
            let name = format!("{}{}", key.stock_code(), title);
            if let Ok(result) = ScrapeResult::new(name, resolve(BASE, href)?) {
                rows.push((title, result));
            }
        }

        debug!(rows = rows.len(), "Beijing listing parsed");
        Ok(rank_by_period(rows, key))
    }
}

#[cfg(test)]
mod tests {
    use super::super::driver::testing::{ScriptedPage, element};
    use super::*;

    #[tokio::test]
    async fn test_reads_listing() {
        let mut page = ScriptedPage::default()
            .with(SEARCH_INPUT, vec![element("", &[])])
            .with(RESULT_LIST, vec![element("", &[])])
            .with(
                RESULT_LINKS,
                vec![element(
                    "2025年半年度报告",
                    &[("href", "/disclosure/2025/830799_h1.pdf")],
                )],
            );
        let key = ReportKey::new(ExchangeCode::BJ, "830799", 2025, 2).unwrap();

        let results = BeijingScraper
            .scrape_page(&mut page, &key, Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(results[0].file_url(), "https://www.bse.cn/disclosure/2025/830799_h1.pdf");
        assert_eq!(results[0].company_name(), "8307992025年半年度报告");
    }
}
