//! Configuration management utilities

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "report-agent".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load `.env` (if present) and read `APP_NAME` / `APP_ENV`
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();
        Self {
            app_name: env_or("APP_NAME", &defaults.app_name),
            environment: env_or("APP_ENV", &defaults.environment),
        }
    }

    /// Whether this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self.environment.as_str(), "prod" | "production")
    }
}

/// Read an environment variable, falling back to `default` when unset or empty
pub fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

/// Read and parse an environment variable, falling back to `default` when
/// unset or unparseable
pub fn env_parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
