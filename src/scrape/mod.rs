//! Webpage metadata scraper.
//!
//! [`ScrapeService::get_metadata`] answers from the TTL cache when it can,
//! otherwise tries a cheap static HTML fetch and falls back to rendering the
//! page in a headless browser when the static result has no title. A
//! rendered page with neither a title nor a description is a failure.
//!
//! Concurrent misses for the same URL are not deduplicated: both calls
//! extract and the last cache write wins.

pub mod browser;
pub mod cache;
pub mod dynamic;
pub mod static_html;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::ScrapeError;
use crate::models::{Metadata, PartialMetadata};

pub use browser::{BrowserEngine, BrowserPage, ChromeEngine, NavigateOptions};
pub use cache::{MetadataCache, CACHE_TTL};
pub use dynamic::BrowserDynamicExtractor;
pub use static_html::HttpStaticExtractor;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const ACCEPT_LANGUAGE_ZH_EN: &str = "zh-CN,zh;q=0.9,en;q=0.8";
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Cheap extraction from the raw HTML response. Never fails loudly: any
/// problem is logged and reported as `None`.
#[async_trait]
pub trait StaticExtractor: Send + Sync {
    async fn fetch_static(&self, url: &str) -> Option<PartialMetadata>;
}

/// Expensive extraction from a rendered page.
#[async_trait]
pub trait DynamicExtractor: Send + Sync {
    async fn fetch_dynamic(&self, url: &str) -> Result<Metadata, ScrapeError>;

    /// Release long-lived resources such as a browser process.
    async fn shutdown(&self) {}
}

/// Resolve a favicon `href` the way a browser would from `page`:
/// data URIs and absolute URLs are kept, `//host/...` takes the page scheme,
/// anything else is joined onto the page origin.
pub fn resolve_favicon(href: &str, page: &Url) -> String {
    if href.starts_with("data:") || href.starts_with("http") {
        return href.to_string();
    }
    if href.starts_with("//") {
        return format!("{}:{}", page.scheme(), href);
    }

    let origin = page.origin().ascii_serialization();
    if href.starts_with('/') {
        format!("{origin}{href}")
    } else {
        format!("{origin}/{href}")
    }
}

/// Only absolute http(s) URLs are scraped.
pub fn validate_url(url: &str) -> Result<Url, ScrapeError> {
    let parsed = Url::parse(url).map_err(|_| ScrapeError::InvalidUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(parsed),
        _ => Err(ScrapeError::InvalidUrl(url.to_string())),
    }
}

pub struct ScrapeService {
    cache: MetadataCache,
    static_extractor: Arc<dyn StaticExtractor>,
    dynamic_extractor: Arc<dyn DynamicExtractor>,
}

impl ScrapeService {
    pub fn new(
        cache: MetadataCache,
        static_extractor: Arc<dyn StaticExtractor>,
        dynamic_extractor: Arc<dyn DynamicExtractor>,
    ) -> Self {
        Self {
            cache,
            static_extractor,
            dynamic_extractor,
        }
    }

    /// Production wiring: reqwest for static pages, a lazily launched Chrome
    /// for everything else.
    pub fn with_chrome(chrome_executable: Option<PathBuf>) -> Result<Self, ScrapeError> {
        let static_extractor = HttpStaticExtractor::new()
            .map_err(|e| ScrapeError::Launch(format!("HTTP client: {e}")))?;
        let engine = Arc::new(ChromeEngine::new(chrome_executable));

        Ok(Self::new(
            MetadataCache::new(),
            Arc::new(static_extractor),
            Arc::new(BrowserDynamicExtractor::new(engine)),
        ))
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub async fn get_metadata(&self, url: &str, use_cache: bool) -> Result<Metadata, ScrapeError> {
        validate_url(url)?;

        if use_cache {
            if let Some(cached) = self.cache.get(url) {
                tracing::debug!(url, "Metadata served from cache");
                return Ok(cached);
            }
        }

        if let Some(partial) = self.static_extractor.fetch_static(url).await {
            if partial.has_title() {
                tracing::debug!(url, "Static extraction succeeded");
                let metadata = Metadata::from(partial);
                if use_cache {
                    self.store(url, &metadata);
                }
                return Ok(metadata);
            }
            tracing::info!(url, "Static HTML has no title, rendering in browser");
        }

        let metadata = self
            .dynamic_extractor
            .fetch_dynamic(url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url, "Dynamic extraction failed");
                e.wrap()
            })?;

        if metadata.is_blank() {
            tracing::error!(url, "Rendered page has neither a title nor a description");
            return Err(ScrapeError::NoMetadata.wrap());
        }

        if use_cache {
            self.store(url, &metadata);
        }
        Ok(metadata)
    }

    fn store(&self, url: &str, metadata: &Metadata) {
        self.cache.put(url, metadata.clone());
        let evicted = self.cache.sweep();
        if evicted > 0 {
            tracing::debug!(evicted, "Swept expired metadata cache entries");
        }
    }

    pub async fn shutdown(&self) {
        self.dynamic_extractor.shutdown().await;
    }
}
