//! Known-article ledger: which article ids each feed has already produced.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::feed::Article;

/// Per-feed sets of observed article ids.
///
/// Sets only grow; a feed's set is dropped only when the feed is removed.
/// Persisted as a map from feed URL to a list of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnownArticleLedger {
    seen: BTreeMap<String, BTreeSet<String>>,
}

impl KnownArticleLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `ids` into the feed's seen-set. Returns how many were new.
    ///
    /// Callers record the articles in the summary cache first, so an id is
    /// never seen without also being summarized or retry-eligible.
    pub fn mark_seen<I, S>(&mut self, feed_url: &str, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = self.seen.entry(feed_url.to_string()).or_default();
        let mut added = 0;
        for id in ids {
            if set.insert(id.into()) {
                added += 1;
            }
        }
        added
    }

    /// Articles whose ids the feed has not produced before, in input order.
    pub fn filter_new(&self, feed_url: &str, items: &[Article]) -> Vec<Article> {
        match self.seen.get(feed_url) {
            Some(set) => items
                .iter()
                .filter(|a| !set.contains(&a.id))
                .cloned()
                .collect(),
            None => items.to_vec(),
        }
    }

    /// Check whether the feed has produced `id` before.
    pub fn contains(&self, feed_url: &str, id: &str) -> bool {
        self.seen.get(feed_url).is_some_and(|set| set.contains(id))
    }

    /// The feed's seen-set, if it has one.
    pub fn seen(&self, feed_url: &str) -> Option<&BTreeSet<String>> {
        self.seen.get(feed_url)
    }

    /// Drop everything recorded for a feed. Returns whether it had a set.
    pub fn forget_feed(&mut self, feed_url: &str) -> bool {
        self.seen.remove(feed_url).is_some()
    }

    /// Number of feeds with a seen-set.
    pub fn feed_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "https://example.com/feed";

    fn article(n: u32) -> Article {
        Article::new(FEED, Some(format!("https://example.com/{n}")), format!("T{n}"))
    }

    #[test]
    fn test_filter_new_unknown_feed_returns_all() {
        let ledger = KnownArticleLedger::new();
        let items = vec![article(1), article(2)];
        assert_eq!(ledger.filter_new(FEED, &items), items);
    }

    #[test]
    fn test_filter_new_preserves_order() {
        let mut ledger = KnownArticleLedger::new();
        ledger.mark_seen(FEED, [article(2).id]);

        let items = vec![article(3), article(2), article(1)];
        let fresh = ledger.filter_new(FEED, &items);
        assert_eq!(fresh, vec![article(3), article(1)]);
    }

    #[test]
    fn test_mark_seen_counts_only_new() {
        let mut ledger = KnownArticleLedger::new();
        assert_eq!(ledger.mark_seen(FEED, ["a", "b"]), 2);
        assert_eq!(ledger.mark_seen(FEED, ["b", "c"]), 1);
        assert_eq!(ledger.seen(FEED).unwrap().len(), 3);
    }

    #[test]
    fn test_seen_sets_are_per_feed() {
        let mut ledger = KnownArticleLedger::new();
        ledger.mark_seen(FEED, [article(1).id]);
        assert!(ledger.contains(FEED, &article(1).id));
        assert!(!ledger.contains("https://other.example.com/", &article(1).id));
        assert_eq!(ledger.filter_new("https://other.example.com/", &[article(1)]).len(), 1);
    }

    #[test]
    fn test_id_reported_new_at_most_once() {
        let mut ledger = KnownArticleLedger::new();
        let items = vec![article(1)];
        let mut reported = 0;
        for _ in 0..3 {
            let fresh = ledger.filter_new(FEED, &items);
            reported += fresh.len();
            ledger.mark_seen(FEED, fresh.into_iter().map(|a| a.id));
        }
        assert_eq!(reported, 1);
    }

    #[test]
    fn test_forget_feed_resets() {
        let mut ledger = KnownArticleLedger::new();
        ledger.mark_seen(FEED, [article(1).id]);
        assert!(ledger.forget_feed(FEED));
        assert!(!ledger.forget_feed(FEED));
        assert_eq!(ledger.filter_new(FEED, &[article(1)]).len(), 1);
        assert_eq!(ledger.feed_count(), 0);
    }

    #[test]
    fn test_serde_shape() {
        let mut ledger = KnownArticleLedger::new();
        ledger.mark_seen(FEED, ["b", "a"]);
        let json = serde_json::to_string(&ledger).unwrap();
        assert_eq!(json, r#"{"https://example.com/feed":["a","b"]}"#);
        let restored: KnownArticleLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ledger);
    }
}
