//! Per-run state machine: cache lookup, scrape, download, analysis

use super::{PipelineRun, ProgressEvent};
use crate::config::ReportConfig;
use crate::document::DocumentState;
use crate::error::{ReportError, Result};
use crate::fetcher::ReportDownloader;
use crate::key::ReportKey;
use crate::locator::{LocateObserver, LocateSource, ReportLocator};
use crate::prompts;
use agent_llm::{LLMProvider, Message};
use agent_runtime::{
    LoopConfig, MemorySessionStore, ReasoningLoop, RuntimeError, SessionStore, TurnEvent,
};
use agent_tools::ToolRegistry;
use async_trait::async_trait;
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

/// Runs the whole pipeline for one report key at a time
///
/// Cheap to clone; every run gets its own producer task and cancellation
/// token while the cache, sessions and tools are shared.
#[derive(Clone)]
pub struct Orchestrator {
    locator: Arc<ReportLocator>,
    downloader: Arc<dyn ReportDownloader>,
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry<DocumentState>>,
    sessions: Arc<dyn SessionStore<DocumentState>>,
    loop_config: LoopConfig,
    event_buffer: usize,
}

impl Orchestrator {
    pub fn new(
        locator: ReportLocator,
        downloader: Arc<dyn ReportDownloader>,
        provider: Arc<dyn LLMProvider>,
        tools: ToolRegistry<DocumentState>,
    ) -> Self {
        Self {
            locator: Arc::new(locator),
            downloader,
            provider,
            tools: Arc::new(tools),
            sessions: Arc::new(MemorySessionStore::new()),
            loop_config: LoopConfig {
                system_prompt: Some(prompts::SYSTEM_PROMPT.to_string()),
                ..LoopConfig::default()
            },
            event_buffer: 32,
        }
    }

    /// Apply model, sampling, step ceiling and channel size from `config`
    pub fn with_config(mut self, config: &ReportConfig) -> Self {
        self.loop_config.model.clone_from(&config.model);
        self.loop_config.max_tokens = config.max_tokens;
        self.loop_config.temperature = Some(config.temperature);
        self.loop_config.recursion_limit = config.recursion_limit;
        self.event_buffer = config.event_buffer.max(1);
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore<DocumentState>>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Start a run; events arrive on the returned handle
    ///
    /// Without a `thread_id` the analysis gets a fresh conversation. Reusing
    /// a thread id continues that conversation.
    pub fn run(&self, key: ReportKey, thread_id: Option<String>) -> PipelineRun {
        let thread_id = thread_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let cancel = CancellationToken::new();

        let span = info_span!("pipeline", key = %key, thread_id = %thread_id);
        let this = self.clone();
        let token = cancel.clone();
        tokio::spawn(
            async move {
                let mut events = Emitter::new(tx, token);
                this.produce(&key, &thread_id, &mut events).await;
            }
            .instrument(span),
        );

        PipelineRun::new(rx, cancel)
    }

    async fn produce(&self, key: &ReportKey, thread_id: &str, events: &mut Emitter) {
        match self.execute(key, thread_id, events).await {
            Ok(report) => {
                info!("Pipeline complete");
                let _ = events.send(ProgressEvent::complete(report)).await;
            }
            Err(ReportError::Cancelled) => info!(stage = events.stage, "Pipeline cancelled"),
            Err(e) => {
                warn!(stage = events.stage, error = %e, "Pipeline failed");
                let _ = events.send(ProgressEvent::error(events.stage, e.to_string())).await;
            }
        }
    }

    async fn execute(
        &self,
        key: &ReportKey,
        thread_id: &str,
        events: &mut Emitter,
    ) -> Result<serde_json::Value> {
        let cancel = events.cancel.clone();

        events
            .progress("query", format!("正在查询 {key} 的报告缓存"))
            .await?;
        let located = guarded(&cancel, self.locator.locate_with(key, events)).await?;
        let report = located.result;

        events
            .progress("download", format!("正在下载 {} 的财务报告", report.company_name()))
            .await?;
        let local_path = guarded(
            &cancel,
            self.downloader.fetch(report.file_url(), report.company_name()),
        )
        .await?;

        events
            .progress("analyze", format!("正在分析 {}", local_path.display()))
            .await?;
        self.analyze(&local_path, thread_id, events).await?;

        Ok(json!({
            "exchange_code": key.exchange_code(),
            "stock_code": key.stock_code(),
            "fiscal_year": key.fiscal_year(),
            "period_type": key.period_type(),
            "company_name": report.company_name(),
            "file_url": report.file_url(),
            "local_path": local_path,
            "thread_id": thread_id,
            "cached": located.source == LocateSource::Cache,
        }))
    }

    /// Play the analysis script on `thread_id`, forwarding every turn
    async fn analyze(&self, path: &Path, thread_id: &str, events: &Emitter) -> Result<()> {
        let reasoning = ReasoningLoop::builder(
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            Arc::clone(&self.sessions),
        )
        .config(self.loop_config.clone())
        .cancellation(events.cancel.clone())
        .build();
        let reasoning = &reasoning;

        for (index, prompt) in prompts::analysis_script(path).into_iter().enumerate() {
            let step = index + 1;
            let (turn_tx, mut turn_rx) = mpsc::channel::<TurnEvent>(self.event_buffer);

            let run = async move {
                reasoning
                    .run_streamed(thread_id, vec![Message::user(prompt)], &turn_tx)
                    .await
            };
            let forward = async move {
                while let Some(turn) = turn_rx.recv().await {
                    events.send(ProgressEvent::analyzing(step, &turn)).await?;
                }
                Ok::<_, ReportError>(())
            };

            let (answer, forwarded) = tokio::join!(run, forward);
            match answer {
                Ok(text) => info!(step, answer_length = text.len(), "Analysis step finished"),
                Err(RuntimeError::Cancelled) => return Err(ReportError::Cancelled),
                Err(e) => return Err(e.into()),
            }
            forwarded?;
        }
        Ok(())
    }
}

/// Race `fut` against cancellation
async fn guarded<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ReportError::Cancelled),
        result = fut => result,
    }
}

/// Event sink of one run; remembers the stage for error reporting
struct Emitter {
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
    stage: &'static str,
}

impl Emitter {
    fn new(tx: mpsc::Sender<ProgressEvent>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            stage: "init",
        }
    }

    async fn progress(&mut self, stage: &'static str, message: String) -> Result<()> {
        self.stage = stage;
        info!(stage, "{message}");
        self.send(ProgressEvent::progress(stage, message)).await
    }

    /// A closed receiver cancels the run
    async fn send(&self, event: ProgressEvent) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ReportError::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| {
                self.cancel.cancel();
                ReportError::Cancelled
            }),
        }
    }
}

#[async_trait]
impl LocateObserver for Emitter {
    async fn entered(&mut self, stage: crate::locator::LocateStage) -> Result<()> {
        use crate::locator::LocateStage;
        match stage {
            LocateStage::Scraping => self.progress("scrape", "缓存未命中，正在从交易所网站检索报告".to_string()).await,
            LocateStage::Persisting => self.progress("persist", "正在保存报告信息".to_string()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachedReportRecord, MemoryReportCache, ReportCache};
    use crate::document::FileDocumentLoader;
    use crate::fetcher::MockReportDownloader;
    use crate::key::ExchangeCode;
    use crate::scraper::{MockReportScraper, ScrapeResult};
    use crate::tools::analysis_toolbox;
    use agent_llm::{LLMError, Role};
    use agent_llm::mock::{ScriptedProvider, text, tool_calls};
    use std::path::PathBuf;

    fn key() -> ReportKey {
        ReportKey::new(ExchangeCode::SH, "600000", 2025, 1).unwrap()
    }

    fn x_bank() -> ScrapeResult {
        ScrapeResult::new("X Bank", "https://x/doc.pdf").unwrap()
    }

    fn orchestrator(
        cache: Arc<dyn ReportCache>,
        scraper: MockReportScraper,
        downloader: impl ReportDownloader + 'static,
        provider: Arc<ScriptedProvider>,
    ) -> Orchestrator {
        Orchestrator::new(
            ReportLocator::new(cache, Arc::new(scraper)),
            Arc::new(downloader),
            provider,
            analysis_toolbox(Arc::new(FileDocumentLoader)),
        )
    }

    fn tags(events: &[ProgressEvent]) -> Vec<String> {
        events.iter().map(ProgressEvent::tag).collect()
    }

    #[tokio::test]
    async fn test_fetch_failure_after_cache_hit() {
        let cache = Arc::new(MemoryReportCache::new());
        cache
            .insert(CachedReportRecord::new(key(), &x_bank()))
            .await
            .unwrap();

        let mut scraper = MockReportScraper::new();
        scraper.expect_scrape().never();
        let mut downloader = MockReportDownloader::new();
        downloader.expect_fetch().times(1).returning(|url, _| {
            Err(ReportError::FetchFailure {
                url: url.to_string(),
                status: Some(403),
                reason: "forbidden".to_string(),
            })
        });
        let provider = Arc::new(ScriptedProvider::new([]));

        let events = orchestrator(cache, scraper, downloader, Arc::clone(&provider))
            .run(key(), None)
            .collect()
            .await;

        assert_eq!(tags(&events), vec!["progress/query", "progress/download", "error/download"]);
        assert!(events[2].message.as_deref().unwrap().contains("HTTP 403"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cache_miss_runs_full_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("X Bank.txt");
        std::fs::write(&report_path, "利润表\n营业收入：1,234.56\n净利润：100").unwrap();
        let path_arg = report_path.to_string_lossy().to_string();

        let cache = Arc::new(MemoryReportCache::new());
        let mut scraper = MockReportScraper::new();
        scraper.expect_scrape().times(1).returning(|_| Ok(vec![x_bank()]));
        let mut downloader = MockReportDownloader::new();
        let returned = report_path.clone();
        downloader
            .expect_fetch()
            .withf(|url, name| url == "https://x/doc.pdf" && name == "X Bank")
            .times(1)
            .returning(move |_, _| Ok(returned.clone()));

        let provider = Arc::new(ScriptedProvider::new([
            tool_calls(&[("load_document", json!({"path": path_arg}))]),
            text("文件已加载"),
            tool_calls(&[("extract_structured_field", json!({"field_name": "all"}))]),
            text("营业收入 1,234.56"),
            text("整体财务状况稳健"),
        ]));

        let events = orchestrator(
            Arc::clone(&cache) as Arc<dyn ReportCache>,
            scraper,
            downloader,
            Arc::clone(&provider),
        )
        .run(key(), Some("thread-1".to_string()))
        .collect()
        .await;

        assert_eq!(
            tags(&events),
            vec![
                "progress/query",
                "progress/scrape",
                "progress/persist",
                "progress/download",
                "progress/analyze",
                "analyzing/1",
                "analyzing/1",
                "analyzing/2",
                "analyzing/2",
                "analyzing/3",
                "complete/complete",
            ]
        );
        assert_eq!(cache.len(), 1);

        let done = events.last().unwrap().data.clone().unwrap();
        assert_eq!(done["company_name"], "X Bank");
        assert_eq!(done["thread_id"], "thread-1");
        assert_eq!(done["exchange_code"], "SH");
        assert_eq!(done["cached"], false);
        assert_eq!(PathBuf::from(done["local_path"].as_str().unwrap()), report_path);

        // one system prompt for the whole thread, then the load result reaches the model
        let requests = provider.requests();
        assert_eq!(requests.len(), 5);
        let last = &requests[4].messages;
        assert_eq!(last.iter().filter(|m| m.role == Role::System).count(), 1);
        let load_result = requests[1].messages.last().unwrap().text().unwrap_or_default();
        assert!(load_result.starts_with("成功加载文件"));
    }

    #[tokio::test]
    async fn test_not_found_reports_scrape_stage() {
        let mut scraper = MockReportScraper::new();
        scraper.expect_scrape().returning(|_| Ok(Vec::new()));
        let mut downloader = MockReportDownloader::new();
        downloader.expect_fetch().never();

        let events = orchestrator(
            Arc::new(MemoryReportCache::new()),
            scraper,
            downloader,
            Arc::new(ScriptedProvider::new([])),
        )
        .run(key(), None)
        .collect()
        .await;

        assert_eq!(tags(&events), vec!["progress/query", "progress/scrape", "error/scrape"]);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_analysis_failure_is_single_error() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("r.txt");
        std::fs::write(&report_path, "营业收入：1").unwrap();

        let cache = Arc::new(MemoryReportCache::new());
        cache
            .insert(CachedReportRecord::new(key(), &x_bank()))
            .await
            .unwrap();
        let mut downloader = MockReportDownloader::new();
        downloader
            .expect_fetch()
            .returning(move |_, _| Ok(report_path.clone()));

        let provider = Arc::new(ScriptedProvider::new([]));
        provider.push_error(LLMError::RateLimitExceeded("slow down".to_string()));

        let events = orchestrator(cache, MockReportScraper::new(), downloader, provider)
            .run(key(), None)
            .collect()
            .await;

        assert_eq!(
            tags(&events),
            vec!["progress/query", "progress/download", "progress/analyze", "error/analyze"]
        );
        assert!(events[3].message.as_deref().unwrap().contains("Rate limit exceeded"));
    }

    struct StalledDownloader;

    #[async_trait]
    impl ReportDownloader for StalledDownloader {
        async fn fetch(&self, _file_url: &str, _name: &str) -> Result<PathBuf> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_in_flight_stage() {
        let cache = Arc::new(MemoryReportCache::new());
        cache
            .insert(CachedReportRecord::new(key(), &x_bank()))
            .await
            .unwrap();

        let mut run = orchestrator(
            cache,
            MockReportScraper::new(),
            StalledDownloader,
            Arc::new(ScriptedProvider::new([])),
        )
        .run(key(), None);

        assert_eq!(run.next().await.unwrap().tag(), "progress/query");
        assert_eq!(run.next().await.unwrap().tag(), "progress/download");

        run.cancel();
        let rest = tokio::time::timeout(std::time::Duration::from_secs(5), run.next())
            .await
            .unwrap();
        assert!(rest.is_none());
    }
}
