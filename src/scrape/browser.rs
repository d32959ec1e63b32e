//! Headless browser access for the dynamic extractor.
//!
//! [`BrowserEngine`] and [`BrowserPage`] are the seam the extractor talks to;
//! [`ChromeEngine`] is the chromiumoxide-backed implementation used in
//! production. One Chrome process is launched lazily and shared by every
//! call; pages are per call and closed by their owner.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams, UserAgentBrandVersion,
    UserAgentMetadata,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    ResourceType,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{ACCEPT_LANGUAGE_ZH_EN, DESKTOP_USER_AGENT};
use crate::error::ScrapeError;

pub const VIEWPORT_WIDTH: i64 = 1920;
pub const VIEWPORT_HEIGHT: i64 = 1080;

/// Flags for running Chrome inside a container without a GPU.
const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
    "--disable-web-security",
    "--disable-features=IsolateOrigins,site-per-process",
];

/// Resource types that never matter for metadata and are aborted.
pub fn is_blocked_resource(resource_type: &ResourceType) -> bool {
    matches!(
        resource_type,
        ResourceType::Image
            | ResourceType::Media
            | ResourceType::Font
            | ResourceType::Stylesheet
            | ResourceType::Other
    )
}

/// When navigation counts as finished: at most `max_inflight` requests
/// outstanding, continuously, for `idle_time`.
#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub max_inflight: usize,
    pub idle_time: Duration,
}

impl NavigateOptions {
    /// At most two open connections for 500ms.
    pub const NETWORK_IDLE_2: NavigateOptions = NavigateOptions {
        max_inflight: 2,
        idle_time: Duration::from_millis(500),
    };
}

#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a fresh page, already configured with request filtering, the
    /// desktop viewport and the desktop user agent.
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError>;

    /// Close the shared browser process, if one is running.
    async fn shutdown(&self);
}

#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Load `url` and wait until the network is idle per `options`.
    /// Carries no timeout of its own; the caller bounds it.
    async fn navigate(&self, url: &str, options: &NavigateOptions) -> Result<(), ScrapeError>;

    /// Evaluate a JavaScript expression in the page and return its value.
    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError>;

    async fn close(self: Box<Self>) -> Result<(), ScrapeError>;
}

// ============================================================================
// Chrome implementation
// ============================================================================

struct RunningBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

pub struct ChromeEngine {
    executable: Option<PathBuf>,
    running: Mutex<Option<RunningBrowser>>,
}

impl ChromeEngine {
    /// `executable` overrides chromiumoxide's own Chrome discovery.
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            executable,
            running: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<RunningBrowser, ScrapeError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_secs(30))
            .window_size(VIEWPORT_WIDTH as u32, VIEWPORT_HEIGHT as u32)
            .args(LAUNCH_ARGS.iter().copied());

        if let Some(path) = &self.executable {
            tracing::info!(path = %path.display(), "Using configured Chrome executable");
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(ScrapeError::Launch)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(error = %e, "Browser handler error");
                }
            }
            tracing::debug!("Browser handler task completed");
        });

        tracing::info!("Headless browser launched");
        Ok(RunningBrowser { browser, handler })
    }

    async fn open_blank_page(&self) -> Result<Page, ScrapeError> {
        let mut running = self.running.lock().await;
        if running.is_none() {
            *running = Some(self.launch().await?);
        }
        let Some(current) = running.as_ref() else {
            return Err(ScrapeError::Launch("browser unavailable".into()));
        };

        match current.browser.new_page("about:blank").await {
            Ok(page) => Ok(page),
            Err(e) => {
                // A dead browser is relaunched on the next call.
                tracing::warn!(error = %e, "Failed to open page, discarding browser");
                if let Some(dead) = running.take() {
                    dead.handler.abort();
                }
                Err(ScrapeError::Page(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        let page = self.open_blank_page().await?;
        match ChromePage::configure(page.clone()).await {
            Ok(page) => Ok(Box::new(page)),
            Err(e) => {
                if let Err(close_err) = page.close().await {
                    tracing::debug!(error = %close_err, "Failed to close half-configured page");
                }
                Err(e)
            }
        }
    }

    async fn shutdown(&self) {
        let Some(mut running) = self.running.lock().await.take() else {
            return;
        };

        tracing::info!("Shutting down headless browser");
        if let Err(e) = running.browser.close().await {
            tracing::warn!(error = %e, "Failed to close browser cleanly");
        }
        if let Err(e) = running.browser.wait().await {
            tracing::warn!(error = %e, "Failed to wait for browser exit");
        }
        running.handler.abort();
    }
}

pub struct ChromePage {
    page: Page,
    interceptor: JoinHandle<()>,
}

impl ChromePage {
    async fn configure(page: Page) -> Result<Self, ScrapeError> {
        let mut paused = page.event_listener::<EventRequestPaused>().await?;
        let intercept_page = page.clone();
        let interceptor = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let outcome = if is_blocked_resource(&event.resource_type) {
                    intercept_page
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ())
                } else {
                    intercept_page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    tracing::trace!(error = %e, "Failed to resolve intercepted request");
                }
            }
        });

        let page = ChromePage { page, interceptor };
        page.page.execute(fetch::EnableParams::default()).await?;
        page.page.execute(network::EnableParams::default()).await?;
        page.page
            .execute(SetDeviceMetricsOverrideParams::new(
                VIEWPORT_WIDTH,
                VIEWPORT_HEIGHT,
                1.0,
                false,
            ))
            .await?;
        page.page.execute(user_agent_override()?).await?;
        Ok(page)
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        self.interceptor.abort();
    }
}

fn user_agent_override() -> Result<SetUserAgentOverrideParams, ScrapeError> {
    let metadata = UserAgentMetadata::builder()
        .brands(vec![
            UserAgentBrandVersion::new("Not_A Brand", "8"),
            UserAgentBrandVersion::new("Chromium", "120"),
            UserAgentBrandVersion::new("Google Chrome", "120"),
        ])
        .full_version_lists(vec![
            UserAgentBrandVersion::new("Not_A Brand", "8.0.0.0"),
            UserAgentBrandVersion::new("Chromium", "120.0.6099.109"),
            UserAgentBrandVersion::new("Google Chrome", "120.0.6099.109"),
        ])
        .platform("Windows")
        .platform_version("10.0.0")
        .architecture("x86")
        .model("")
        .mobile(false)
        .build()
        .map_err(ScrapeError::Page)?;

    SetUserAgentOverrideParams::builder()
        .user_agent(DESKTOP_USER_AGENT)
        .accept_language(ACCEPT_LANGUAGE_ZH_EN)
        .platform("Win32")
        .user_agent_metadata(metadata)
        .build()
        .map_err(ScrapeError::Page)
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn navigate(&self, url: &str, options: &NavigateOptions) -> Result<(), ScrapeError> {
        // Subscribe before navigating so no request event is missed.
        let mut sent = self.page.event_listener::<EventRequestWillBeSent>().await?;
        let mut finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = self.page.event_listener::<EventLoadingFailed>().await?;

        self.page
            .goto(url)
            .await
            .map_err(|e| ScrapeError::Navigation(e.to_string()))?;

        let mut inflight: HashSet<String> = HashSet::new();
        let mut idle_since = Some(Instant::now());
        loop {
            let deadline = idle_since.map(|since| since + options.idle_time);
            tokio::select! {
                Some(event) = sent.next() => {
                    inflight.insert(event.request_id.inner().clone());
                }
                Some(event) = finished.next() => {
                    inflight.remove(event.request_id.inner());
                }
                Some(event) = failed.next() => {
                    inflight.remove(event.request_id.inner());
                }
                _ = idle_deadline(deadline) => return Ok(()),
            }

            if inflight.len() <= options.max_inflight {
                idle_since.get_or_insert_with(Instant::now);
            } else {
                idle_since = None;
            }
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScrapeError::Evaluation(e.to_string()))?
            .into_value::<Value>()
            .map_err(|e| ScrapeError::Evaluation(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        self.interceptor.abort();
        self.page.clone().close().await?;
        Ok(())
    }
}

async fn idle_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
