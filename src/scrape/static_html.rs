use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client as ReqwestClient;
use scraper::{Html, Selector};
use url::Url;

use super::{resolve_favicon, StaticExtractor, ACCEPT_HTML, ACCEPT_LANGUAGE_ZH_EN, DESKTOP_USER_AGENT};
use crate::models::PartialMetadata;

pub const STATIC_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static HTML_LANG: Lazy<Selector> = Lazy::new(|| Selector::parse("html[lang]").expect("static selector"));
static META_CHARSET: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[charset]").expect("static selector"));
static META_HTTP_EQUIV: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[http-equiv]").expect("static selector"));
static ICON_LINKS: Lazy<[Selector; 3]> = Lazy::new(|| {
    [
        r#"link[rel="icon"]"#,
        r#"link[rel="shortcut icon"]"#,
        r#"link[rel="apple-touch-icon"]"#,
    ]
    .map(|s| Selector::parse(s).expect("static selector"))
});

/// Fetches raw HTML with a plain GET and reads the standard tags from it.
#[derive(Clone)]
pub struct HttpStaticExtractor {
    client: ReqwestClient,
}

impl HttpStaticExtractor {
    pub fn new() -> reqwest::Result<Self> {
        Self::with_timeout(STATIC_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_ZH_EN));

        let client = ReqwestClient::builder()
            .timeout(timeout)
            .user_agent(DESKTOP_USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl StaticExtractor for HttpStaticExtractor {
    async fn fetch_static(&self, url: &str) -> Option<PartialMetadata> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, url, timeout = e.is_timeout(), "Static fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), url, "Static fetch returned non-success status");
            return None;
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(error = %e, url, "Failed to read static response body");
                return None;
            }
        };

        Some(extract_metadata(&html, url))
    }
}

/// Parse the metadata tag set out of `html`.
///
/// `title` prefers `og:title`, then `twitter:title`, then `<title>`;
/// `description` prefers `og:description`, then `twitter:description`, then
/// the plain description tag. The favicon href is resolved against
/// `page_url`. Missing tags stay `None`.
pub fn extract_metadata(html: &str, page_url: &str) -> PartialMetadata {
    let doc = Html::parse_document(html);

    let og_title = meta_content(&doc, "og:title");
    let og_description = meta_content(&doc, "og:description");
    let twitter_title = meta_content(&doc, "twitter:title");
    let twitter_description = meta_content(&doc, "twitter:description");

    let title = og_title
        .clone()
        .or_else(|| twitter_title.clone())
        .or_else(|| title_tag(&doc));
    let description = og_description
        .clone()
        .or_else(|| twitter_description.clone())
        .or_else(|| meta_content(&doc, "description"));

    let favicon = icon_href(&doc).map(|href| match Url::parse(page_url) {
        Ok(base) => resolve_favicon(&href, &base),
        Err(_) => href,
    });

    PartialMetadata {
        title,
        description,
        keywords: meta_content(&doc, "keywords"),
        url: Some(page_url.to_string()),
        favicon,
        og_title,
        og_description,
        og_image: meta_content(&doc, "og:image"),
        og_type: meta_content(&doc, "og:type"),
        og_url: meta_content(&doc, "og:url"),
        twitter_card: meta_content(&doc, "twitter:card"),
        twitter_title,
        twitter_description,
        twitter_image: meta_content(&doc, "twitter:image"),
        author: meta_content(&doc, "author"),
        publisher: meta_content(&doc, "publisher"),
        charset: charset(&doc),
        language: first_attr(&doc, &HTML_LANG, "lang"),
        robots: meta_content(&doc, "robots"),
    }
}

/// `content` of `meta[name=key]`, falling back to `meta[property=key]`.
fn meta_content(doc: &Html, key: &str) -> Option<String> {
    ["name", "property"].iter().find_map(|attr| {
        let selector = Selector::parse(&format!(r#"meta[{attr}="{key}"]"#)).ok()?;
        doc.select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .and_then(non_empty)
    })
}

fn title_tag(doc: &Html) -> Option<String> {
    doc.select(&TITLE)
        .next()
        .and_then(|el| non_empty(&el.text().collect::<String>()))
}

fn icon_href(doc: &Html) -> Option<String> {
    ICON_LINKS
        .iter()
        .find_map(|selector| first_attr(doc, selector, "href"))
}

fn charset(doc: &Html) -> Option<String> {
    first_attr(doc, &META_CHARSET, "charset").or_else(|| {
        let content = doc
            .select(&META_HTTP_EQUIV)
            .filter(|el| {
                el.value()
                    .attr("http-equiv")
                    .is_some_and(|v| v.eq_ignore_ascii_case("content-type"))
            })
            .find_map(|el| el.value().attr("content"))?;
        content
            .split(';')
            .filter_map(|part| part.trim().split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .and_then(|(_, value)| non_empty(value.trim_matches('"')))
    })
}

fn first_attr(doc: &Html, selector: &Selector, attr: &str) -> Option<String> {
    doc.select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .and_then(non_empty)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
