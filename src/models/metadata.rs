use serde::{Deserialize, Serialize};

/// Webpage descriptors returned by `POST /scrape/metadata`.
///
/// Every field is a string; a missing value is `""`, never null. `url` is the
/// post-redirect address when rendered in the browser and the requested
/// address when read from static HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub url: String,
    pub favicon: String,
    pub og_title: String,
    pub og_description: String,
    pub og_image: String,
    pub og_type: String,
    pub og_url: String,
    pub twitter_card: String,
    pub twitter_title: String,
    pub twitter_description: String,
    pub twitter_image: String,
    pub author: String,
    pub publisher: String,
    pub charset: String,
    pub language: String,
    pub robots: String,
}

/// Result of a static extraction. Any field may be missing; turn it into a
/// [`Metadata`] with `Metadata::from`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub url: Option<String>,
    pub favicon: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub og_type: Option<String>,
    pub og_url: Option<String>,
    pub twitter_card: Option<String>,
    pub twitter_title: Option<String>,
    pub twitter_description: Option<String>,
    pub twitter_image: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub charset: Option<String>,
    pub language: Option<String>,
    pub robots: Option<String>,
}

impl Metadata {
    /// Neither a title nor a description survived extraction.
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.description.trim().is_empty()
    }
}

impl PartialMetadata {
    /// Whether the static result is good enough to skip the browser.
    pub fn has_title(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

impl From<PartialMetadata> for Metadata {
    fn from(p: PartialMetadata) -> Self {
        Metadata {
            title: p.title.unwrap_or_default(),
            description: p.description.unwrap_or_default(),
            keywords: p.keywords.unwrap_or_default(),
            url: p.url.unwrap_or_default(),
            favicon: p.favicon.unwrap_or_default(),
            og_title: p.og_title.unwrap_or_default(),
            og_description: p.og_description.unwrap_or_default(),
            og_image: p.og_image.unwrap_or_default(),
            og_type: p.og_type.unwrap_or_default(),
            og_url: p.og_url.unwrap_or_default(),
            twitter_card: p.twitter_card.unwrap_or_default(),
            twitter_title: p.twitter_title.unwrap_or_default(),
            twitter_description: p.twitter_description.unwrap_or_default(),
            twitter_image: p.twitter_image.unwrap_or_default(),
            author: p.author.unwrap_or_default(),
            publisher: p.publisher.unwrap_or_default(),
            charset: p.charset.unwrap_or_default(),
            language: p.language.unwrap_or_default(),
            robots: p.robots.unwrap_or_default(),
        }
    }
}
