//! Headless Chromium driver

use super::driver::{BrowserDriver, DriverError, DriverResult, ElementInfo, PageSession};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Launches one Chromium process per page
pub struct ChromiumDriver {
    headless: bool,
}

impl ChromiumDriver {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open(&self) -> DriverResult<Box<dyn PageSession>> {
        let mut builder = BrowserConfig::builder();
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::new)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp)?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp)?;
        debug!(headless = self.headless, "Browser page opened");

        Ok(Box::new(ChromiumPage {
            browser,
            page,
            events,
        }))
    }
}

struct ChromiumPage {
    browser: Browser,
    page: Page,
    events: JoinHandle<()>,
}

fn cdp(err: chromiumoxide::error::CdpError) -> DriverError {
    DriverError::new(err.to_string())
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

impl ChromiumPage {
    async fn poll(&self, expression: &str, timeout: Duration, what: &str) -> DriverResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let done = self
                .page
                .evaluate(expression)
                .await
                .map_err(cdp)?
                .into_value::<bool>()
                .unwrap_or(false);
            if done {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::new(format!(
                    "timed out after {timeout:?} waiting for {what}"
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageSession for ChromiumPage {
    async fn goto(&mut self, url: &str) -> DriverResult<()> {
        self.page.goto(url).await.map_err(cdp)?;
        self.page.wait_for_navigation().await.map_err(cdp)?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> DriverResult<()> {
        let expr = format!("document.querySelector({}) !== null", js_string(selector));
        self.poll(&expr, timeout, selector).await
    }

    async fn wait_hidden(&mut self, selector: &str, timeout: Duration) -> DriverResult<()> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({}); \
             return !el || el.offsetParent === null || getComputedStyle(el).display === 'none'; }})()",
            js_string(selector)
        );
        self.poll(&expr, timeout, selector).await
    }

    async fn fill(&mut self, selector: &str, text: &str) -> DriverResult<()> {
        let clear = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.value = ''; }} return !!el; }})()",
            js_string(selector)
        );
        self.page.evaluate(clear).await.map_err(cdp)?;

        let element = self.page.find_element(selector).await.map_err(cdp)?;
        element.click().await.map_err(cdp)?;
        element.type_str(text).await.map_err(cdp)?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> DriverResult<()> {
        let element = self.page.find_element(selector).await.map_err(cdp)?;
        element.click().await.map_err(cdp)?;
        Ok(())
    }

    async fn query_all(&mut self, selector: &str) -> DriverResult<Vec<ElementInfo>> {
        let elements = self.page.find_elements(selector).await.map_err(cdp)?;
        let mut infos = Vec::with_capacity(elements.len());

        for element in elements {
            let mut info = ElementInfo {
                text: element.inner_text().await.map_err(cdp)?.unwrap_or_default(),
                ..ElementInfo::default()
            };
            for name in ["href", "title"] {
                if let Some(value) = element.attribute(name).await.map_err(cdp)? {
                    info.attributes.insert(name.to_string(), value);
                }
            }
            infos.push(info);
        }
        Ok(infos)
    }

    async fn close(&mut self) -> DriverResult<()> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        let _ = self.browser.wait().await;
        self.events.abort();
        Ok(())
    }
}
