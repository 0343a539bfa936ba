//! Shanghai Stock Exchange periodic report search

use super::driver::{DriverResult, PageSession};
use super::{ExchangeScraper, ScrapeResult, rank_by_period, resolve};
use crate::key::{ExchangeCode, ReportKey};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const SEARCH_PAGE: &str = "https://www.sse.com.cn/disclosure/listedinfo/regular/";
const DOWNLOAD_BASE: &str = "https://static.sse.com.cn";

const LOADING: &str = ".loading";
const SEARCH_INPUT: &str = ".sse_searchInput > input";
const SEARCH_BUTTON: &str = "span.search_btn.bi-search";
const RESULT_TABLE: &str = ".table-responsive";
const RESULT_LINKS: &str = ".table-responsive a.table_titlewrap";

pub struct ShanghaiScraper;

#[async_trait]
impl ExchangeScraper for ShanghaiScraper {
    fn exchange(&self) -> ExchangeCode {
        ExchangeCode::SH
    }

    async fn scrape_page(
        &self,
        page: &mut dyn PageSession,
        key: &ReportKey,
        wait: Duration,
    ) -> DriverResult<Vec<ScrapeResult>> {
        page.goto(SEARCH_PAGE).await?;
        page.wait_hidden(LOADING, wait).await?;

        page.wait_for(SEARCH_INPUT, wait).await?;
        page.fill(SEARCH_INPUT, key.stock_code()).await?;
        page.click(SEARCH_BUTTON).await?;

        page.wait_hidden(LOADING, wait).await?;
        page.wait_for(RESULT_TABLE, wait).await?;

        let mut rows = Vec::new();
        for link in page.query_all(RESULT_LINKS).await? {
            let Some(href) = link.attr("href").filter(|h| !h.trim().is_empty()) else {
                continue;
            };
            let title = link.text.trim().to_string();
            let name = format!("{}{}", key.stock_code(), title);
            if let Ok(result) = ScrapeResult::new(name, resolve(DOWNLOAD_BASE, href)?) {
                rows.push((title, result));
            }
        }

        debug!(rows = rows.len(), "Shanghai listing parsed");
        Ok(rank_by_period(rows, key))
    }
}
