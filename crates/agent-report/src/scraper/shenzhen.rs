//! Shenzhen Stock Exchange periodic report search
//!
//! The listing links to an announcement page; the PDF location is the
//! download button's href with its `/download` segment removed.

use super::driver::{DriverError, DriverResult, PageSession};
use super::{ExchangeScraper, ScrapeResult, resolve, title_matches_period};
use crate::key::{ExchangeCode, ReportKey};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const BASE: &str = "https://www.szse.cn";
const SEARCH_PAGE: &str = "https://www.szse.cn/disclosure/listed/fixed/index.html";

const LOADING: &str = ".c-loading-overlay";
const SEARCH_INPUT: &str = "#input_code";
const SEARCH_BUTTON: &str = "#query-btn";
const COMPANY_LINKS: &str = ".disclosure-tbody .title-name a";
const TITLE_LINKS: &str = ".disclosure-tbody .annon-title-link";
const DOWNLOAD_BUTTON: &str = "#annouceDownloadBtn";

pub struct ShenzhenScraper;

#[async_trait]
impl ExchangeScraper for ShenzhenScraper {
    fn exchange(&self) -> ExchangeCode {
        ExchangeCode::SZ
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
        page.wait_hidden(LOADING, wait).await?;
        page.click(SEARCH_BUTTON).await?;
        page.wait_hidden(LOADING, wait).await?;

        let companies = page.query_all(COMPANY_LINKS).await?;
        let titles = page.query_all(TITLE_LINKS).await?;
        debug!(rows = titles.len(), "Shenzhen listing parsed");

        // Rows pair up by position; prefer the first one naming the period
        let rows: Vec<_> = companies.iter().zip(titles.iter()).collect();
        let Some((company, title)) = rows
            .iter()
            .find(|(_, t)| title_matches_period(&t.text, key))
            .or_else(|| rows.first())
        else {
            return Ok(Vec::new());
        };

        let company_name = company
            .attr("title")
            .map(str::to_string)
            .unwrap_or_else(|| company.text.clone());
        let detail_href = title
            .attr("href")
            .ok_or_else(|| DriverError::new("announcement link has no href"))?;

        page.goto(&resolve(BASE, detail_href)?).await?;
        page.wait_for(DOWNLOAD_BUTTON, wait).await?;

        let download_href = page
            .query_all(DOWNLOAD_BUTTON)
            .await?
            .into_iter()
            .find_map(|b| b.attr("href").map(str::to_string))
            .ok_or_else(|| DriverError::new("download button has no href"))?;
        let file_url = resolve(BASE, &download_href)?.replace("/download", "");

        Ok(ScrapeResult::new(company_name, file_url).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::driver::testing::{ScriptedPage, element};
    use super::*;

    fn listing() -> ScriptedPage {
        ScriptedPage::default()
            .with(SEARCH_INPUT, vec![element("", &[])])
            .with(
                COMPANY_LINKS,
                vec![
                    element("平安银行", &[("title", "平安银行")]),
                    element("平安银行", &[("title", "平安银行")]),
                ],
            )
            .with(
                TITLE_LINKS,
                vec![
                    element("平安银行：2024年年度报告", &[("href", "/disclosure/listed/bulletinDetail/index.html?a")]),
                    element("平安银行：2025年第一季度报告", &[("href", "/disclosure/listed/bulletinDetail/index.html?b")]),
                ],
            )
            .with(
                DOWNLOAD_BUTTON,
                vec![element("下载", &[("href", "https://disc.static.szse.cn/download/disc/disk03/finalpage/b.PDF")])],
            )
    }

    #[tokio::test]
    async fn test_follows_announcement_to_pdf() {
        let mut page = listing();
        let key = ReportKey::new(ExchangeCode::SZ, "000001", 2025, 1).unwrap();

        let results = ShenzhenScraper
            .scrape_page(&mut page, &key, Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].company_name(), "平安银行");
        assert_eq!(results[0].file_url(), "https://disc.static.szse.cn/disc/disk03/finalpage/b.PDF");
        assert!(
            page.actions()
                .contains(&"goto https://www.szse.cn/disclosure/listed/bulletinDetail/index.html?b".to_string())
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_first_row() {
        let mut page = listing();
        let key = ReportKey::new(ExchangeCode::SZ, "000001", 2023, 3).unwrap();

        ShenzhenScraper
            .scrape_page(&mut page, &key, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(page.actions().iter().any(|a| a.ends_with("index.html?a")));
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let mut page = ScriptedPage::default().with(SEARCH_INPUT, vec![element("", &[])]);
        let key = ReportKey::new(ExchangeCode::SZ, "000001", 2025, 1).unwrap();

        let results = ShenzhenScraper
            .scrape_page(&mut page, &key, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
