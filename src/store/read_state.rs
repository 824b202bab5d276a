//! Articles the user has dismissed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::feed::Article;

/// Set of dismissed article ids.
///
/// Insert-only. Read state is a display filter and never affects
/// synchronization or the summary cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadStateSet {
    ids: BTreeSet<String>,
}

impl ReadStateSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an article read. Returns `false` if it already was.
    pub fn mark_read(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    /// Check whether an article is read.
    pub fn is_read(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// The unread subsequence of `items`, order preserved.
    pub fn unread_filter(&self, items: &[Article]) -> Vec<Article> {
        items
            .iter()
            .filter(|a| !self.is_read(&a.id))
            .cloned()
            .collect()
    }

    /// Number of read articles.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if nothing has been read.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(n: u32) -> Article {
        Article::new("https://example.com/feed", Some(format!("https://example.com/{n}")), "t")
    }

    #[test]
    fn test_mark_read() {
        let mut read = ReadStateSet::new();
        assert!(!read.is_read("a"));
        assert!(read.mark_read("a"));
        assert!(!read.mark_read("a"));
        assert!(read.is_read("a"));
        assert_eq!(read.len(), 1);
    }

    #[test]
    fn test_unread_filter() {
        let mut read = ReadStateSet::new();
        read.mark_read(article(2).id);

        let items = vec![article(1), article(2), article(3)];
        assert_eq!(read.unread_filter(&items), vec![article(1), article(3)]);
    }

    #[test]
    fn test_serde_as_list() {
        let mut read = ReadStateSet::new();
        read.mark_read("b");
        read.mark_read("a");
        assert_eq!(serde_json::to_string(&read).unwrap(), r#"["a","b"]"#);
    }
}
