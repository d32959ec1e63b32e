use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::browser::{BrowserEngine, BrowserPage, NavigateOptions};
use super::DynamicExtractor;
use crate::error::ScrapeError;
use crate::models::Metadata;

pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(20);
pub const HEAD_TIMEOUT: Duration = Duration::from_secs(5);
pub const READY_STATE_TIMEOUT: Duration = Duration::from_secs(10);
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const TITLE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const HEAD_PRESENT_SCRIPT: &str = "document.querySelector('head') !== null";

pub const READY_STATE_COMPLETE_SCRIPT: &str = "document.readyState === 'complete'";

pub const TITLE_NOT_LOADING_SCRIPT: &str = r#"(() => {
  const title = (document.title || '').toLowerCase();
  const keywords = ['loading', 'please wait', '请稍候', '加载中', 'wait'];
  return !keywords.some((keyword) => title.includes(keyword));
})()"#;

/// Runs in the page. Same title/description priority as the static
/// extractor; favicon href resolved against `window.location`.
///
/// The `favicon` branch is a JS copy of [`super::resolve_favicon`]. Keep the
/// two in step; `chrome_resolves_favicon_forms_like_resolve_favicon` checks
/// them against each other in a real browser.
pub const EXTRACT_METADATA_SCRIPT: &str = r#"(() => {
  const meta = (key) => {
    const el = document.querySelector(`meta[name="${key}"]`)
      || document.querySelector(`meta[property="${key}"]`);
    return (el && el.getAttribute('content')) || '';
  };

  const favicon = () => {
    const link = document.querySelector('link[rel="icon"]')
      || document.querySelector('link[rel="shortcut icon"]')
      || document.querySelector('link[rel="apple-touch-icon"]');
    const href = (link && link.getAttribute('href')) || '/favicon.ico';
    if (href.startsWith('data:') || href.startsWith('http')) return href;
    if (href.startsWith('//')) return `${window.location.protocol}${href}`;
    if (href.startsWith('/')) return `${window.location.origin}${href}`;
    return `${window.location.origin}/${href}`;
  };

  const ogTitle = meta('og:title');
  const ogDescription = meta('og:description');
  const twitterTitle = meta('twitter:title');
  const twitterDescription = meta('twitter:description');

  return {
    title: ogTitle || twitterTitle || document.title || '',
    description: ogDescription || twitterDescription || meta('description'),
    keywords: meta('keywords'),
    url: window.location.href,
    favicon: favicon(),
    ogTitle,
    ogDescription,
    ogImage: meta('og:image'),
    ogType: meta('og:type'),
    ogUrl: meta('og:url'),
    twitterCard: meta('twitter:card'),
    twitterTitle,
    twitterDescription,
    twitterImage: meta('twitter:image'),
    author: meta('author'),
    publisher: meta('publisher'),
    charset: document.characterSet || '',
    language: document.documentElement.lang || '',
    robots: meta('robots'),
  };
})()"#;

/// Outcome of a best-effort wait. Callers log it and move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Renders pages in a headless browser and reads metadata from the live DOM.
pub struct BrowserDynamicExtractor {
    engine: Arc<dyn BrowserEngine>,
}

impl BrowserDynamicExtractor {
    pub fn new(engine: Arc<dyn BrowserEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl DynamicExtractor for BrowserDynamicExtractor {
    async fn fetch_dynamic(&self, url: &str) -> Result<Metadata, ScrapeError> {
        let page = self.engine.new_page().await?;
        let result = render_and_extract(page.as_ref(), url).await;

        if let Err(e) = page.close().await {
            tracing::warn!(error = %e, url, "Failed to close page");
        }
        result
    }

    async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

async fn render_and_extract(page: &dyn BrowserPage, url: &str) -> Result<Metadata, ScrapeError> {
    tokio::time::timeout(
        NAVIGATION_TIMEOUT,
        page.navigate(url, &NavigateOptions::NETWORK_IDLE_2),
    )
    .await
    .map_err(|_| ScrapeError::NavigationTimeout(NAVIGATION_TIMEOUT.as_millis()))??;

    settle(page).await;

    let value = page.evaluate(EXTRACT_METADATA_SCRIPT).await?;
    serde_json::from_value(value).map_err(|e| ScrapeError::Evaluation(e.to_string()))
}

/// Readiness cascade run after navigation. None of these steps can fail the
/// extraction; a timed-out step just means the page is as ready as it gets.
pub async fn settle(page: &dyn BrowserPage) {
    let head = poll_until(page, HEAD_PRESENT_SCRIPT, HEAD_TIMEOUT).await;
    tracing::debug!(outcome = ?head, "Waited for <head>");

    let ready = poll_until(page, READY_STATE_COMPLETE_SCRIPT, READY_STATE_TIMEOUT).await;
    tracing::debug!(outcome = ?ready, "Waited for readyState complete");

    tokio::time::sleep(SETTLE_DELAY).await;

    let title = poll_until(page, TITLE_NOT_LOADING_SCRIPT, TITLE_TIMEOUT).await;
    tracing::debug!(outcome = ?title, "Waited for non-placeholder title");
}

/// Evaluate `predicate` until it returns `true` or `limit` elapses.
/// Evaluation errors count as "not yet".
pub async fn poll_until(page: &dyn BrowserPage, predicate: &str, limit: Duration) -> Readiness {
    let polling = async {
        loop {
            if let Ok(Value::Bool(true)) = page.evaluate(predicate).await {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    match tokio::time::timeout(limit, polling).await {
        Ok(()) => Readiness::Ready,
        Err(_) => Readiness::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::testing::{FakeEngine, PageScript};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn extracts_metadata_from_ready_page() {
        let engine = FakeEngine::new(PageScript::ready("https://example.com/final"));
        let extractor = BrowserDynamicExtractor::new(engine.clone());

        let metadata = extractor.fetch_dynamic("https://example.com").await.unwrap();

        assert_eq!(metadata.title, "Rendered Title");
        assert_eq!(metadata.url, "https://example.com/final");
        assert_eq!(engine.pages_opened(), 1);
        assert_eq!(engine.pages_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_page_only_waits_for_settle_delay() {
        let engine = FakeEngine::new(PageScript::ready("https://example.com"));
        let extractor = BrowserDynamicExtractor::new(engine);

        let started = Instant::now();
        extractor.fetch_dynamic("https://example.com").await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= SETTLE_DELAY);
        assert!(elapsed < SETTLE_DELAY + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_timeouts_are_absorbed() {
        let engine = FakeEngine::new(PageScript::never_ready("https://example.com"));
        let extractor = BrowserDynamicExtractor::new(engine.clone());

        let started = Instant::now();
        let metadata = extractor.fetch_dynamic("https://example.com").await.unwrap();

        assert_eq!(metadata.title, "Rendered Title");
        assert!(started.elapsed() >= HEAD_TIMEOUT + READY_STATE_TIMEOUT + SETTLE_DELAY + TITLE_TIMEOUT);
        assert_eq!(engine.pages_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_timeout_is_fatal_and_page_is_closed() {
        let engine = FakeEngine::new(PageScript::hanging_navigation());
        let extractor = BrowserDynamicExtractor::new(engine.clone());

        let err = extractor.fetch_dynamic("https://slow.example.com").await.unwrap_err();

        assert!(matches!(err, ScrapeError::NavigationTimeout(20_000)), "{err:?}");
        assert_eq!(engine.pages_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_error_is_fatal() {
        let engine = FakeEngine::new(PageScript::failing_navigation("net::ERR_NAME_NOT_RESOLVED"));
        let extractor = BrowserDynamicExtractor::new(engine.clone());

        let err = extractor.fetch_dynamic("https://nowhere.invalid").await.unwrap_err();

        assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
        assert_eq!(engine.pages_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_reports_timeout() {
        let engine = FakeEngine::new(PageScript::never_ready("https://example.com"));
        let page = engine.new_page().await.unwrap();

        let outcome = poll_until(page.as_ref(), HEAD_PRESENT_SCRIPT, Duration::from_secs(1)).await;

        assert_eq!(outcome, Readiness::TimedOut);
    }

    /// Needs a local Chrome or Chromium (`CHROME_EXECUTABLE_PATH` or on PATH).
    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "launches a real browser"]
    async fn chrome_resolves_favicon_forms_like_resolve_favicon() {
        use axum::{extract::Path, response::Html, routing::get, Router};
        use url::Url;

        use crate::scrape::{resolve_favicon, ChromeEngine};

        let app = Router::new().route(
            "/page/:form",
            get(|Path(form): Path<String>| async move {
                let href = match form.as_str() {
                    "protocol-relative" => "//cdn.example.com/icon.png",
                    "root-relative" => "/static/icon.png",
                    "relative" => "img/icon.png",
                    _ => "https://static.example.com/icon.png",
                };
                Html(format!(
                    r#"<html><head><title>{form}</title><link rel="icon" href="{href}"></head><body></body></html>"#
                ))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let executable = std::env::var_os("CHROME_EXECUTABLE_PATH").map(std::path::PathBuf::from);
        let extractor = BrowserDynamicExtractor::new(Arc::new(ChromeEngine::new(executable)));

        let cases = [
            ("protocol-relative", "//cdn.example.com/icon.png"),
            ("root-relative", "/static/icon.png"),
            ("relative", "img/icon.png"),
            ("absolute", "https://static.example.com/icon.png"),
        ];
        for (form, href) in cases {
            let url = format!("{base}/page/{form}");
            let metadata = extractor.fetch_dynamic(&url).await.unwrap();
            let expected = resolve_favicon(href, &Url::parse(&url).unwrap());

            assert_eq!(metadata.title, form);
            assert_eq!(metadata.favicon, expected, "favicon form {form}");
        }
        assert_eq!(
            resolve_favicon("//cdn.example.com/icon.png", &Url::parse(&base).unwrap()),
            "http://cdn.example.com/icon.png"
        );

        extractor.shutdown().await;
    }
}
