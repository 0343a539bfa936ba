//! Locate, download and analyse one periodic report
//!
//! Events are written to stdout as `data: <json>` records separated by a
//! blank line, so the output can be relayed as an event stream.
//!
//! # Usage
//!
//! ```bash
//! export DEEPSEEK_API_KEY="sk-..."
//! cargo run --features browser --bin report-agent -- SH 600000 --year 2025 --quarter 1
//! ```

use agent_llm::providers::{OpenAIConfig, OpenAIProvider};
use agent_report::scraper::BrowserDriver;
use agent_report::{
    EventStatus, ExchangeCode, FileDocumentLoader, Orchestrator, ReportConfig, ReportFetcher,
    ReportKey, ReportLocator, ScraperDispatcher, SqliteReportCache, analysis_toolbox,
};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "report-agent")]
#[command(about = "Locate, download and analyse an exchange-listed company's periodic report", long_about = None)]
struct Args {
    /// Exchange code: SH, SZ or BJ
    exchange: ExchangeCode,

    /// Stock code, e.g. 600000
    stock: String,

    /// Fiscal year; defaults to the current year
    #[arg(long)]
    year: Option<i32>,

    /// Quarter 1-4; defaults to the current quarter
    #[arg(long)]
    quarter: Option<u8>,

    /// Continue an earlier analysis conversation
    #[arg(long)]
    thread_id: Option<String>,
}

impl Args {
    fn key(&self) -> agent_report::Result<ReportKey> {
        let current = ReportKey::current_period(self.exchange, self.stock.clone())?;
        ReportKey::new(
            self.exchange,
            self.stock.clone(),
            self.year.unwrap_or(current.fiscal_year()),
            self.quarter.unwrap_or(current.period_type()),
        )
    }
}

#[cfg(feature = "browser")]
fn browser_driver(config: &ReportConfig) -> Arc<dyn BrowserDriver> {
    Arc::new(agent_report::scraper::ChromiumDriver::new(config.headless))
}

#[cfg(not(feature = "browser"))]
fn browser_driver(_config: &ReportConfig) -> Arc<dyn BrowserDriver> {
    Arc::new(NoBrowser)
}

/// Stand-in when built without a browser; cached reports still work
#[cfg(not(feature = "browser"))]
struct NoBrowser;

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl BrowserDriver for NoBrowser {
    async fn open(
        &self,
    ) -> agent_report::scraper::DriverResult<Box<dyn agent_report::scraper::PageSession>> {
        Err(agent_report::scraper::DriverError::new(
            "built without the `browser` feature; rebuild with --features browser to scrape",
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agent_utils::init_tracing_with("warn,agent_report=info,agent_runtime=info");

    let args = Args::parse();
    let key = args.key()?;
    let app = agent_utils::Config::from_env();
    let config = ReportConfig::from_env()?;
    info!(app = %app.app_name, environment = %app.environment, "Configuration loaded");

    let provider = OpenAIProvider::with_config(
        OpenAIConfig::new(config.require_api_key()?)
            .with_api_base(config.api_base.clone())
            .with_timeout(180),
    )?;

    let locator = ReportLocator::new(
        Arc::new(SqliteReportCache::open(&config.database_path)?),
        Arc::new(ScraperDispatcher::new(
            browser_driver(&config),
            config.scrape_timeout,
            config.wait_timeout,
        )),
    );
    let fetcher = ReportFetcher::new(
        &config.download_dir,
        &config.cookie_file,
        config.download_rate_per_sec,
    )?;

    let orchestrator = Orchestrator::new(
        locator,
        Arc::new(fetcher),
        Arc::new(provider),
        analysis_toolbox(Arc::new(FileDocumentLoader)),
    )
    .with_config(&config);

    info!(key = %key, model = %config.model, "Starting report pipeline");
    let mut run = orchestrator.run(key, args.thread_id);

    let mut failed = false;
    let mut stdout = std::io::stdout();
    while let Some(event) = run.next().await {
        failed |= event.status == EventStatus::Error;
        write!(stdout, "data: {}\n\n", serde_json::to_string(&event)?)?;
        stdout.flush()?;
    }

    if failed {
        anyhow::bail!("report pipeline failed");
    }
    Ok(())
}
