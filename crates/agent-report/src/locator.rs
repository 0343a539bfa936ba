//! Cache-first report lookup

use crate::cache::{CachedReportRecord, ReportCache};
use crate::error::{ReportError, Result};
use crate::key::ReportKey;
use crate::scraper::{ReportScraper, ScrapeResult};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Where a located report came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateSource {
    Cache,
    Scraped,
}

/// A located report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub result: ScrapeResult,
    pub source: LocateSource,
}

/// Stages of a cache miss, announced before they start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateStage {
    Scraping,
    Persisting,
}

/// Hook told about each stage of a cache miss
///
/// Returning an error aborts the lookup before the stage runs.
#[async_trait]
pub trait LocateObserver: Send {
    async fn entered(&mut self, stage: LocateStage) -> Result<()>;
}

/// Observer that ignores every stage
pub struct NoopObserver;

#[async_trait]
impl LocateObserver for NoopObserver {
    async fn entered(&mut self, _stage: LocateStage) -> Result<()> {
        Ok(())
    }
}

/// Finds a report's download location, scraping only on a cache miss
pub struct ReportLocator {
    cache: Arc<dyn ReportCache>,
    scraper: Arc<dyn ReportScraper>,
}

impl ReportLocator {
    pub fn new(cache: Arc<dyn ReportCache>, scraper: Arc<dyn ReportScraper>) -> Self {
        Self { cache, scraper }
    }

    pub async fn locate(&self, key: &ReportKey) -> Result<Located> {
        self.locate_with(key, &mut NoopObserver).await
    }

    /// Cached records are returned as stored, without checking the link
    #[instrument(skip(self, observer), fields(key = %key))]
    pub async fn locate_with(
        &self,
        key: &ReportKey,
        observer: &mut dyn LocateObserver,
    ) -> Result<Located> {
        if let Some(record) = self.cache.find(key).await? {
            info!(company = %record.company_name, "Report location cached");
            return Ok(Located {
                result: record.to_result()?,
                source: LocateSource::Cache,
            });
        }

        observer.entered(LocateStage::Scraping).await?;
        let first = self
            .scraper
            .scrape(key)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ReportError::NotFound(key.to_string()))?;

        observer.entered(LocateStage::Persisting).await?;
        let stored = self
            .cache
            .insert(CachedReportRecord::new(key.clone(), &first))
            .await?;
        info!(company = %stored.company_name, url = %stored.file_url, "Report location stored");

        Ok(Located {
            result: stored.to_result()?,
            source: LocateSource::Scraped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryReportCache, MockReportCache};
    use crate::key::ExchangeCode;
    use crate::scraper::MockReportScraper;

    fn key() -> ReportKey {
        ReportKey::new(ExchangeCode::SH, "600000", 2025, 1).unwrap()
    }

    fn x_bank() -> ScrapeResult {
        ScrapeResult::new("X Bank", "https://x/doc.pdf").unwrap()
    }

    #[derive(Default)]
    struct Recorder(Vec<LocateStage>);

    #[async_trait]
    impl LocateObserver for Recorder {
        async fn entered(&mut self, stage: LocateStage) -> Result<()> {
            self.0.push(stage);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_scraper() {
        let cache = MemoryReportCache::new();
        cache
            .insert(CachedReportRecord::new(key(), &x_bank()))
            .await
            .unwrap();

        let mut scraper = MockReportScraper::new();
        scraper.expect_scrape().times(0);

        let locator = ReportLocator::new(Arc::new(cache), Arc::new(scraper));
        let mut recorder = Recorder::default();
        let located = locator.locate_with(&key(), &mut recorder).await.unwrap();

        assert_eq!(located.source, LocateSource::Cache);
        assert_eq!(located.result, x_bank());
        assert!(recorder.0.is_empty());
    }

    #[tokio::test]
    async fn test_miss_scrapes_and_persists_once() {
        let mut cache = MockReportCache::new();
        cache.expect_find().times(1).returning(|_| Ok(None));
        cache
            .expect_insert()
            .times(1)
            .withf(|r| r.key == key() && r.file_url == "https://x/doc.pdf")
            .returning(Ok);

        let mut scraper = MockReportScraper::new();
        scraper
            .expect_scrape()
            .times(1)
            .returning(|_| Ok(vec![x_bank(), ScrapeResult::new("Other", "https://x/other.pdf").unwrap()]));

        let locator = ReportLocator::new(Arc::new(cache), Arc::new(scraper));
        let mut recorder = Recorder::default();
        let located = locator.locate_with(&key(), &mut recorder).await.unwrap();

        assert_eq!(located.source, LocateSource::Scraped);
        assert_eq!(located.result, x_bank());
        assert_eq!(recorder.0, vec![LocateStage::Scraping, LocateStage::Persisting]);
    }

    #[tokio::test]
    async fn test_second_locate_hits_cache() {
        let cache = Arc::new(MemoryReportCache::new());
        let mut scraper = MockReportScraper::new();
        scraper.expect_scrape().times(1).returning(|_| Ok(vec![x_bank()]));

        let locator = ReportLocator::new(cache.clone(), Arc::new(scraper));
        let first = locator.locate(&key()).await.unwrap();
        let second = locator.locate(&key()).await.unwrap();

        assert_eq!(first.result, second.result);
        assert_eq!(second.source, LocateSource::Cache);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_results_is_not_found() {
        let cache = Arc::new(MemoryReportCache::new());
        let mut scraper = MockReportScraper::new();
        scraper.expect_scrape().returning(|_| Ok(vec![]));

        let locator = ReportLocator::new(cache.clone(), Arc::new(scraper));
        let err = locator.locate(&key()).await.unwrap_err();

        assert!(matches!(err, ReportError::NotFound(_)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_scrape_failure_propagates() {
        let mut cache = MockReportCache::new();
        cache.expect_find().returning(|_| Ok(None));
        cache.expect_insert().times(0);

        let mut scraper = MockReportScraper::new();
        scraper.expect_scrape().returning(|_| {
            Err(ReportError::ScrapeFailure {
                exchange: ExchangeCode::SH,
                reason: "timed out".to_string(),
            })
        });

        let locator = ReportLocator::new(Arc::new(cache), Arc::new(scraper));
        assert!(matches!(
            locator.locate(&key()).await,
            Err(ReportError::ScrapeFailure { .. })
        ));
    }
}
