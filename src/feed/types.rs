//! Feed and article types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::article_id;

/// Maximum length for an article description.
pub const MAX_DESCRIPTION_LENGTH: usize = 10000;

/// Maximum number of items considered per feed per cycle.
pub const MAX_ITEMS_PER_FEED: usize = 100;

/// Maximum feed size in bytes (5MB).
pub const MAX_FEED_SIZE: u64 = 5 * 1024 * 1024;

/// A followed feed, identified by its normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feed {
    /// Normalized feed URL.
    pub url: String,
}

impl Feed {
    /// Wrap an already-normalized URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// One entry of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Stable identifier (canonical link, or `feed_url:title`).
    pub id: String,
    /// URL of the feed this article came from.
    pub feed_url: String,
    /// Article title.
    pub title: String,
    /// Plain-text description.
    pub description: String,
    /// Link to the original article.
    pub link: Option<String>,
    /// When the article was published, if the feed says.
    pub published_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Create an article; the id is derived from the link and title.
    pub fn new(feed_url: impl Into<String>, link: Option<String>, title: impl Into<String>) -> Self {
        let feed_url = feed_url.into();
        let title = title.into();
        let link = link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        Self {
            id: article_id(&feed_url, link.as_deref(), &title),
            feed_url,
            title,
            description: String::new(),
            link,
            published_at: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the published date.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Text handed to the summarizer: title, blank line, description.
    pub fn summary_input(&self) -> String {
        format!("{}\n\n{}", self.title, self.description)
    }
}
