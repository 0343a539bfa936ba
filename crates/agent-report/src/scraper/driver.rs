//! Browser abstraction used by the exchange scrapers
//!
//! The scrapers only need a handful of page operations, so they are written
//! against [`PageSession`] and never see the browser library directly.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Failure inside a browser session
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Result of a page operation
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Rendered text and attributes of one element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementInfo {
    pub text: String,
    pub attributes: HashMap<String, String>,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Launches browser pages
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh page
    async fn open(&self) -> DriverResult<Box<dyn PageSession>>;
}

/// One open browser page
#[async_trait]
pub trait PageSession: Send {
    /// Navigate and wait for the load to finish
    async fn goto(&mut self, url: &str) -> DriverResult<()>;

    /// Wait until at least one element matches `selector`
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// Wait until no visible element matches `selector`
    async fn wait_hidden(&mut self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// Replace the value of the first input matching `selector`
    async fn fill(&mut self, selector: &str, text: &str) -> DriverResult<()>;

    /// Click the first element matching `selector`
    async fn click(&mut self, selector: &str) -> DriverResult<()>;

    /// Every element matching `selector`, in document order
    async fn query_all(&mut self, selector: &str) -> DriverResult<Vec<ElementInfo>>;

    /// Release the page and its browser
    async fn close(&mut self) -> DriverResult<()>;
}
