//! Configuration for report retrieval and analysis

use crate::error::{ReportError, Result};
use agent_utils::{env_or, env_parse_or};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the report pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// SQLite file holding located reports
    pub database_path: PathBuf,

    /// Directory downloaded reports are written to
    pub download_dir: PathBuf,

    /// Browser-exported cookie JSON used for downloads
    pub cookie_file: PathBuf,

    /// Chat model name
    pub model: String,

    /// OpenAI-compatible API base URL
    pub api_base: String,

    /// API key for the model provider
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Max tokens per model turn
    pub max_tokens: usize,

    /// Tool rounds allowed per analysis prompt
    pub recursion_limit: usize,

    /// Upper bound for one whole scrape
    pub scrape_timeout: Duration,

    /// Upper bound for each wait inside a scrape
    pub wait_timeout: Duration,

    /// Run the browser without a window
    pub headless: bool,

    /// Download requests allowed per second
    pub download_rate_per_sec: u32,

    /// Progress events buffered before the producer waits
    pub event_buffer: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/reports.db"),
            download_dir: PathBuf::from("pdf"),
            cookie_file: PathBuf::from("cookie.json"),
            model: "deepseek-chat".to_string(),
            api_base: agent_llm::providers::openai::DEFAULT_API_BASE.to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: 4096,
            recursion_limit: 50,
            scrape_timeout: Duration::from_secs(60),
            wait_timeout: Duration::from_secs(10),
            headless: true,
            download_rate_per_sec: 2,
            event_buffer: 32,
        }
    }
}

impl ReportConfig {
    /// Create a new configuration builder
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::default()
    }

    /// Load `.env`, then read `REPORT_*` and `DEEPSEEK_*` variables over the defaults
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let d = Self::default();

        let api_key = std::env::var("DEEPSEEK_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let config = Self {
            database_path: env_or("REPORT_DATABASE_PATH", &d.database_path.to_string_lossy()).into(),
            download_dir: env_or("REPORT_DOWNLOAD_DIR", &d.download_dir.to_string_lossy()).into(),
            cookie_file: env_or("REPORT_COOKIE_FILE", &d.cookie_file.to_string_lossy()).into(),
            model: env_or("DEEPSEEK_MODEL", &d.model),
            api_base: env_or("DEEPSEEK_API_BASE", &d.api_base),
            api_key,
            temperature: env_parse_or("REPORT_TEMPERATURE", d.temperature),
            max_tokens: env_parse_or("REPORT_MAX_TOKENS", d.max_tokens),
            recursion_limit: env_parse_or("REPORT_RECURSION_LIMIT", d.recursion_limit),
            scrape_timeout: Duration::from_secs(env_parse_or(
                "REPORT_SCRAPE_TIMEOUT_SECS",
                d.scrape_timeout.as_secs(),
            )),
            wait_timeout: Duration::from_secs(env_parse_or(
                "REPORT_WAIT_TIMEOUT_SECS",
                d.wait_timeout.as_secs(),
            )),
            headless: env_parse_or("REPORT_HEADLESS", d.headless),
            download_rate_per_sec: env_parse_or("REPORT_DOWNLOAD_RATE", d.download_rate_per_sec),
            event_buffer: env_parse_or("REPORT_EVENT_BUFFER", d.event_buffer),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.recursion_limit == 0 {
            return Err(ReportError::Config(
                "recursion_limit must be greater than 0".to_string(),
            ));
        }

        if self.download_rate_per_sec == 0 {
            return Err(ReportError::Config(
                "download_rate_per_sec must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(ReportError::Config(
                "event_buffer must be greater than 0".to_string(),
            ));
        }

        if self.wait_timeout > self.scrape_timeout {
            return Err(ReportError::Config(
                "wait_timeout cannot exceed scrape_timeout".to_string(),
            ));
        }

        Ok(())
    }

    /// API key, or a configuration error naming the variable to set
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ReportError::Config("DEEPSEEK_API_KEY is not set".to_string()))
    }
}

/// Builder for ReportConfig
#[derive(Debug, Default)]
pub struct ReportConfigBuilder {
    config: Option<ReportConfig>,
}

impl ReportConfigBuilder {
    fn current(&mut self) -> &mut ReportConfig {
        self.config.get_or_insert_with(ReportConfig::default)
    }

    /// Set the SQLite database path
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.current().database_path = path.into();
        self
    }

    /// Set the download directory
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current().download_dir = dir.into();
        self
    }

    /// Set the cookie file
    pub fn cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.current().cookie_file = path.into();
        self
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.current().model = model.into();
        self
    }

    /// Set the API base URL
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.current().api_base = base.into();
        self
    }

    /// Set the API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.current().api_key = Some(key.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.current().temperature = temperature;
        self
    }

    /// Set the tool round ceiling
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.current().recursion_limit = limit;
        self
    }

    /// Set scrape and wait timeouts
    pub fn timeouts(mut self, scrape: Duration, wait: Duration) -> Self {
        let config = self.current();
        config.scrape_timeout = scrape;
        config.wait_timeout = wait;
        self
    }

    /// Show or hide the browser window
    pub fn headless(mut self, headless: bool) -> Self {
        self.current().headless = headless;
        self
    }

    /// Set the download rate limit
    pub fn download_rate_per_sec(mut self, rate: u32) -> Self {
        self.current().download_rate_per_sec = rate;
        self
    }

    /// Set the progress event buffer size
    pub fn event_buffer(mut self, size: usize) -> Self {
        self.current().event_buffer = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ReportConfig> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReportConfig::default();
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.recursion_limit, 50);
        assert_eq!(config.scrape_timeout, Duration::from_secs(60));
        assert_eq!(config.wait_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ReportConfig::builder()
            .download_dir("/tmp/reports")
            .recursion_limit(10)
            .api_key("sk-test")
            .build()
            .unwrap();

        assert_eq!(config.download_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.recursion_limit, 10);
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_validation() {
        assert!(ReportConfig::builder().recursion_limit(0).build().is_err());
        assert!(ReportConfig::builder().event_buffer(0).build().is_err());
        assert!(
            ReportConfig::builder()
                .timeouts(Duration::from_secs(5), Duration::from_secs(10))
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_missing_api_key() {
        let config = ReportConfig::default();
        assert!(matches!(config.require_api_key(), Err(ReportError::Config(_))));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = ReportConfig::builder().api_key("secret").build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
