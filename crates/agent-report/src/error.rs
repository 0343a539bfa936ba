//! Error types for report retrieval and analysis

use crate::key::ExchangeCode;
use agent_runtime::RuntimeError;
use thiserror::Error;

/// Report pipeline errors
#[derive(Debug, Error)]
pub enum ReportError {
    /// The exchange search returned nothing for the key
    #[error("No report found for {0}")]
    NotFound(String),

    /// Exchange code outside SH/SZ/BJ
    #[error("Unsupported exchange: {0}")]
    UnsupportedExchange(String),

    /// Navigation, rendering or timeout failure while scraping
    #[error("Scrape failed on {exchange}: {reason}")]
    ScrapeFailure {
        exchange: ExchangeCode,
        reason: String,
    },

    /// Report download failed
    #[error("Download of {url} failed{}: {reason}", status_suffix(.status))]
    FetchFailure {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// Cache store error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed report key or scrape record
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The reasoning loop failed
    #[error("Analysis failed: {0}")]
    Analysis(#[from] RuntimeError),

    /// The run was cancelled
    #[error("Cancelled")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Result type alias for report operations
pub type Result<T> = std::result::Result<T, ReportError>;

impl From<rusqlite::Error> for ReportError {
    fn from(err: rusqlite::Error) -> Self {
        ReportError::Cache(err.to_string())
    }
}

impl From<agent_llm::LLMError> for ReportError {
    fn from(err: agent_llm::LLMError) -> Self {
        ReportError::Analysis(RuntimeError::Provider(err))
    }
}
