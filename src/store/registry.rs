//! Ordered registry of followed feeds.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::feed::{normalize_feed_url, Feed};
use crate::{FeedError, Result};

/// Followed feeds in insertion order, unique by normalized URL.
///
/// Persisted as an ordered list of URL strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FeedRegistry {
    feeds: Vec<Feed>,
}

impl FeedRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow a feed.
    ///
    /// # Errors
    ///
    /// - [`FeedError::Validation`] if the URL cannot be normalized
    /// - [`FeedError::DuplicateFeed`] if the normalized URL is already followed
    pub fn add(&mut self, url: &str) -> Result<Feed> {
        let normalized = normalize_feed_url(url)?;
        if self.contains(&normalized) {
            return Err(FeedError::DuplicateFeed(normalized));
        }
        let feed = Feed::new(normalized);
        self.feeds.push(feed.clone());
        Ok(feed)
    }

    /// Stop following a feed. Returns the removed feed, if it was followed.
    pub fn remove(&mut self, url: &str) -> Option<Feed> {
        let key = normalize_feed_url(url).unwrap_or_else(|_| url.to_string());
        let index = self.position(&key)?;
        Some(self.feeds.remove(index))
    }

    /// Snapshot of followed feeds in insertion order.
    pub fn list(&self) -> Vec<Feed> {
        self.feeds.clone()
    }

    /// Registration index of a normalized URL.
    pub fn position(&self, url: &str) -> Option<usize> {
        self.feeds.iter().position(|f| f.url == url)
    }

    /// Check whether a normalized URL is followed.
    pub fn contains(&self, url: &str) -> bool {
        self.position(url).is_some()
    }

    /// Number of followed feeds.
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// Check if no feeds are followed.
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

impl From<Vec<String>> for FeedRegistry {
    /// Rebuild from persisted URLs, skipping invalid entries and duplicates.
    fn from(urls: Vec<String>) -> Self {
        let mut registry = Self::new();
        for url in urls {
            if let Err(e) = registry.add(&url) {
                warn!("Dropping persisted feed {}: {}", url, e);
            }
        }
        registry
    }
}

impl From<FeedRegistry> for Vec<String> {
    fn from(registry: FeedRegistry) -> Self {
        registry.feeds.into_iter().map(|f| f.url).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_list_preserves_order() {
        let mut registry = FeedRegistry::new();
        registry.add("https://b.example.com/feed").unwrap();
        registry.add("a.example.com/rss").unwrap();
        registry.add("https://c.example.com/atom").unwrap();

        let urls: Vec<String> = registry.list().into_iter().map(|f| f.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://b.example.com/feed",
                "https://a.example.com/rss",
                "https://c.example.com/atom",
            ]
        );
        assert_eq!(registry.position("https://a.example.com/rss"), Some(1));
    }

    #[test]
    fn test_add_duplicate_after_normalization() {
        let mut registry = FeedRegistry::new();
        registry.add("https://example.com/feed").unwrap();

        let err = registry.add("EXAMPLE.com/feed/").unwrap_err();
        assert!(matches!(err, FeedError::DuplicateFeed(url) if url == "https://example.com/feed"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_invalid() {
        let mut registry = FeedRegistry::new();
        assert!(matches!(registry.add(""), Err(FeedError::Validation(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut registry = FeedRegistry::new();
        registry.add("https://a.example.com/").unwrap();
        registry.add("https://b.example.com/").unwrap();

        let removed = registry.remove("a.example.com").unwrap();
        assert_eq!(removed.url, "https://a.example.com/");
        assert!(!registry.contains("https://a.example.com/"));
        assert!(registry.remove("https://a.example.com/").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_serde_as_url_list() {
        let mut registry = FeedRegistry::new();
        registry.add("https://a.example.com/feed").unwrap();
        registry.add("https://b.example.com/feed").unwrap();

        let json = serde_json::to_string(&registry).unwrap();
        assert_eq!(
            json,
            r#"["https://a.example.com/feed","https://b.example.com/feed"]"#
        );

        let restored: FeedRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, registry);
    }

    #[test]
    fn test_from_urls_skips_bad_entries() {
        let registry = FeedRegistry::from(vec![
            "https://a.example.com/feed".to_string(),
            "ftp://nope".to_string(),
            "a.example.com/feed/".to_string(),
        ]);
        assert_eq!(registry.len(), 1);
    }
}
