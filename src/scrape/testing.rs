//! Test doubles for the scraper seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::browser::{BrowserEngine, BrowserPage, NavigateOptions};
use super::dynamic::EXTRACT_METADATA_SCRIPT;
use super::{DynamicExtractor, StaticExtractor};
use crate::error::ScrapeError;
use crate::models::{Metadata, PartialMetadata};

#[derive(Clone)]
enum Navigation {
    Loads,
    Hangs,
    Fails(String),
}

/// Canned behaviour for every page a [`FakeEngine`] hands out.
#[derive(Clone)]
pub struct PageScript {
    navigation: Navigation,
    ready: bool,
    final_url: String,
}

impl PageScript {
    pub fn ready(final_url: &str) -> Self {
        Self {
            navigation: Navigation::Loads,
            ready: true,
            final_url: final_url.into(),
        }
    }

    pub fn never_ready(final_url: &str) -> Self {
        Self {
            ready: false,
            ..Self::ready(final_url)
        }
    }

    pub fn hanging_navigation() -> Self {
        Self {
            navigation: Navigation::Hangs,
            ..Self::ready("about:blank")
        }
    }

    pub fn failing_navigation(reason: &str) -> Self {
        Self {
            navigation: Navigation::Fails(reason.into()),
            ..Self::ready("about:blank")
        }
    }
}

pub struct FakeEngine {
    script: PageScript,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl FakeEngine {
    pub fn new(script: PageScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            opened: Arc::default(),
            closed: Arc::default(),
        })
    }

    pub fn pages_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            script: self.script.clone(),
            closed: self.closed.clone(),
        }))
    }

    async fn shutdown(&self) {}
}

struct FakePage {
    script: PageScript,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, _url: &str, _options: &NavigateOptions) -> Result<(), ScrapeError> {
        match &self.script.navigation {
            Navigation::Loads => Ok(()),
            Navigation::Hangs => std::future::pending().await,
            Navigation::Fails(reason) => Err(ScrapeError::Navigation(reason.clone())),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError> {
        if script == EXTRACT_METADATA_SCRIPT {
            return Ok(json!({
                "title": "Rendered Title",
                "description": "Rendered description",
                "url": self.script.final_url,
                "favicon": "https://example.com/favicon.ico",
            }));
        }
        Ok(Value::Bool(self.script.ready))
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Static extractor returning a fixed result and counting calls.
#[derive(Default)]
pub struct CountingStatic {
    result: Option<PartialMetadata>,
    calls: AtomicUsize,
}

impl CountingStatic {
    pub fn returning(result: Option<PartialMetadata>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StaticExtractor for CountingStatic {
    async fn fetch_static(&self, _url: &str) -> Option<PartialMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Dynamic extractor that succeeds (or fails) after an optional delay.
pub struct CountingDynamic {
    result: Option<Metadata>,
    delay: Duration,
    calls: AtomicUsize,
}

impl CountingDynamic {
    pub fn succeeding(metadata: Metadata) -> Arc<Self> {
        Arc::new(Self {
            result: Some(metadata),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(metadata: Metadata, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result: Some(metadata),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DynamicExtractor for CountingDynamic {
    async fn fetch_dynamic(&self, _url: &str) -> Result<Metadata, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result
            .clone()
            .ok_or_else(|| ScrapeError::Navigation("net::ERR_CONNECTION_REFUSED".into()))
    }
}
