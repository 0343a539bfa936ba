//! Report download
//!
//! Downloads reuse a browser session exported to a cookie file, since the
//! exchange CDNs reject bare HTTP clients.

use crate::error::{ReportError, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Downloads a located report to local storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportDownloader: Send + Sync {
    /// Download `file_url` and return the local path it was written to
    async fn fetch(&self, file_url: &str, name: &str) -> Result<PathBuf>;
}

/// Cookie entry as exported by a browser context
#[derive(Debug, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
}

/// Read `[{name, value, ...}]` into a `Cookie` header value
///
/// A missing file yields no cookies.
pub fn load_cookie_header(path: &Path) -> Result<Option<String>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Cookie file not found, downloading without cookies");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let cookies: Vec<StoredCookie> = serde_json::from_str(&raw)
        .map_err(|e| ReportError::Config(format!("invalid cookie file {}: {e}", path.display())))?;
    if cookies.is_empty() {
        return Ok(None);
    }

    Ok(Some(
        cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "),
    ))
}

/// File-system safe stem for a downloaded report
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "report".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Authenticated, rate-limited report downloader
///
/// Files land at `<download_dir>/<sanitised name>.pdf`. Two reports with the
/// same name overwrite each other.
pub struct ReportFetcher {
    client: Client,
    download_dir: PathBuf,
    cookie_file: PathBuf,
    rate_limiter: SharedRateLimiter,
}

impl ReportFetcher {
    pub fn new(
        download_dir: impl Into<PathBuf>,
        cookie_file: impl Into<PathBuf>,
        requests_per_sec: u32,
    ) -> Result<Self> {
        let rate = NonZeroU32::new(requests_per_sec)
            .ok_or_else(|| ReportError::Config("download rate must be greater than 0".to_string()))?;

        Ok(Self {
            client: Client::new(),
            download_dir: download_dir.into(),
            cookie_file: cookie_file.into(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));

        if let Some(cookie) = load_cookie_header(&self.cookie_file)? {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| ReportError::Config(format!("cookie value not sendable: {e}")))?;
            headers.insert(COOKIE, value);
        }
        Ok(headers)
    }

    /// Path a report named `name` is written to
    pub fn target_path(&self, name: &str) -> PathBuf {
        self.download_dir
            .join(format!("{}.pdf", sanitize_file_name(name)))
    }
}

#[async_trait]
impl ReportDownloader for ReportFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, file_url: &str, name: &str) -> Result<PathBuf> {
        let headers = self.headers()?;
        self.rate_limiter.until_ready().await;

        let failure = |status: Option<u16>, reason: String| ReportError::FetchFailure {
            url: file_url.to_string(),
            status,
            reason,
        };

        let response = self
            .client
            .get(file_url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| failure(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("unexpected status").to_string(),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| failure(None, e.to_string()))?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.target_path(name);
        tokio::fs::write(&path, &bytes).await?;

        info!(path = %path.display(), bytes = bytes.len(), "Report downloaded");
        Ok(path)
    }
}
