//! Periodic financial report retrieval and analysis
//!
//! Given an exchange, a stock code and a reporting period, the pipeline:
//!
//! - looks the report's download location up in a local cache
//! - scrapes the exchange's disclosure site on a miss and remembers the answer
//! - downloads the report with the stored browser session
//! - runs a tool-augmented reasoning loop over its text
//!
//! Progress is streamed to the caller as [`ProgressEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_report::{ExchangeCode, Orchestrator, ReportKey};
//!
//! let key = ReportKey::new(ExchangeCode::SH, "600000", 2025, 1)?;
//! let mut run = orchestrator.run(key, None);
//! while let Some(event) = run.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod fetcher;
pub mod key;
pub mod locator;
pub mod pipeline;
pub mod prompts;
pub mod scraper;
pub mod tools;

pub use cache::{CachedReportRecord, MemoryReportCache, ReportCache, SqliteReportCache};
pub use config::ReportConfig;
pub use document::{DocumentLoader, DocumentState, FileDocumentLoader, LoadedDocument};
pub use error::{ReportError, Result};
pub use fetcher::{ReportDownloader, ReportFetcher};
pub use key::{ExchangeCode, ReportKey};
pub use locator::{LocateSource, Located, ReportLocator};
pub use pipeline::{EventStatus, Orchestrator, PipelineRun, ProgressEvent};
pub use scraper::{ReportScraper, ScrapeResult, ScraperDispatcher};
pub use tools::analysis_toolbox;
