//! Summary cache: the at-most-once-compute guarantee.
//!
//! Every article id moves through `absent → Pending → Ready | Failed`.
//! `Ready` entries are never recomputed. `Failed` entries can be claimed again
//! through [`SummaryCache::reserve_retry`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FeedError, Result};

/// Reason recorded for entries left `Pending` by an interrupted process.
pub const INTERRUPTED_REASON: &str = "interrupted before completion";

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// A summarization is in flight.
    Pending,
    /// Summary is stored and final.
    Ready,
    /// The last attempt failed.
    Failed,
}

impl CacheState {
    /// Get the display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Pending => "pending",
            CacheState::Ready => "ready",
            CacheState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached summary (or its pending/failed marker) for one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Article id.
    pub article_id: String,
    /// Summary text, set once `Ready`.
    pub summary: Option<String>,
    /// Lifecycle state.
    pub state: CacheState,
    /// Cause of the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of summarization attempts started.
    #[serde(default)]
    pub attempts: u32,
    /// Last state change.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    fn pending(article_id: &str) -> Self {
        Self {
            article_id: article_id.to_string(),
            summary: None,
            state: CacheState::Pending,
            error: None,
            attempts: 1,
            updated_at: Utc::now(),
        }
    }

    /// Check if the summary is final.
    pub fn is_ready(&self) -> bool {
        self.state == CacheState::Ready
    }
}

/// Map from article id to cache entry.
///
/// Persisted as a JSON object keyed by article id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SummaryCache {
    entries: HashMap<String, CacheEntry>,
}

impl SummaryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for an article.
    pub fn get(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// Claim an unseen article: `absent → Pending`.
    ///
    /// Returns `true` only for the caller that created the entry. Existing
    /// entries, whatever their state, are left untouched.
    pub fn reserve(&mut self, id: &str) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        self.entries.insert(id.to_string(), CacheEntry::pending(id));
        true
    }

    /// Claim a failed article for another attempt: `Failed → Pending`.
    pub fn reserve_retry(&mut self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.state == CacheState::Failed => {
                entry.state = CacheState::Pending;
                entry.attempts += 1;
                entry.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Store a finished summary: `Pending → Ready`.
    ///
    /// Completing an already `Ready` entry with the same summary is a no-op.
    pub fn complete(&mut self, id: &str, summary: impl Into<String>) -> Result<()> {
        let summary = summary.into();
        let entry = self.entries.get_mut(id).ok_or_else(|| invalid(id, "no entry"))?;

        match entry.state {
            CacheState::Pending => {
                entry.state = CacheState::Ready;
                entry.summary = Some(summary);
                entry.error = None;
                entry.updated_at = Utc::now();
                Ok(())
            }
            CacheState::Ready if entry.summary.as_deref() == Some(summary.as_str()) => Ok(()),
            CacheState::Ready => Err(invalid(id, "entry is ready with a different summary")),
            CacheState::Failed => Err(invalid(id, "entry is failed, not pending")),
        }
    }

    /// Record a failed attempt: `Pending → Failed`.
    pub fn fail(&mut self, id: &str, reason: impl Into<String>) -> Result<()> {
        let entry = self.entries.get_mut(id).ok_or_else(|| invalid(id, "no entry"))?;

        if entry.state != CacheState::Pending {
            return Err(invalid(id, &format!("entry is {}, not pending", entry.state)));
        }
        entry.state = CacheState::Failed;
        entry.error = Some(reason.into());
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// True iff the article has a final summary.
    pub fn is_resolved(&self, id: &str) -> bool {
        self.get(id).is_some_and(CacheEntry::is_ready)
    }

    /// Turn entries left `Pending` by a previous process into `Failed`.
    ///
    /// Called once after loading persisted state. Returns how many changed.
    pub fn recover_interrupted(&mut self) -> usize {
        let mut recovered = 0;
        for entry in self.entries.values_mut() {
            if entry.state == CacheState::Pending {
                entry.state = CacheState::Failed;
                entry.error = Some(INTERRUPTED_REASON.to_string());
                recovered += 1;
            }
        }
        recovered
    }

    /// All entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Number of entries in a given state.
    pub fn count(&self, state: CacheState) -> usize {
        self.entries.values().filter(|e| e.state == state).count()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn invalid(id: &str, reason: &str) -> FeedError {
    FeedError::InvalidTransition {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_only_once() {
        let mut cache = SummaryCache::new();
        assert!(cache.reserve("a"));
        assert!(!cache.reserve("a"));

        let entry = cache.get("a").unwrap();
        assert_eq!(entry.state, CacheState::Pending);
        assert_eq!(entry.attempts, 1);
        assert!(entry.summary.is_none());
    }

    #[test]
    fn test_reserve_does_not_touch_existing() {
        let mut cache = SummaryCache::new();
        cache.reserve("a");
        cache.fail("a", "boom").unwrap();
        assert!(!cache.reserve("a"));
        assert_eq!(cache.get("a").unwrap().state, CacheState::Failed);

        cache.reserve("b");
        cache.complete("b", "sum").unwrap();
        assert!(!cache.reserve("b"));
        assert!(cache.is_resolved("b"));
    }

    #[test]
    fn test_complete_lifecycle() {
        let mut cache = SummaryCache::new();
        cache.reserve("a");
        assert!(!cache.is_resolved("a"));
        cache.complete("a", "summary text").unwrap();

        let entry = cache.get("a").unwrap();
        assert_eq!(entry.state, CacheState::Ready);
        assert_eq!(entry.summary.as_deref(), Some("summary text"));
        assert!(cache.is_resolved("a"));
    }

    #[test]
    fn test_complete_idempotent_same_value() {
        let mut cache = SummaryCache::new();
        cache.reserve("a");
        cache.complete("a", "s").unwrap();
        assert!(cache.complete("a", "s").is_ok());
        assert!(matches!(
            cache.complete("a", "other"),
            Err(FeedError::InvalidTransition { .. })
        ));
        assert_eq!(cache.get("a").unwrap().summary.as_deref(), Some("s"));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut cache = SummaryCache::new();
        assert!(cache.complete("missing", "s").is_err());
        assert!(cache.fail("missing", "r").is_err());

        cache.reserve("a");
        cache.fail("a", "r").unwrap();
        assert!(cache.complete("a", "s").is_err());
        assert!(cache.fail("a", "again").is_err());

        cache.reserve("b");
        cache.complete("b", "s").unwrap();
        assert!(cache.fail("b", "r").is_err());
        assert_eq!(cache.get("b").unwrap().state, CacheState::Ready);
    }

    #[test]
    fn test_fail_then_retry() {
        let mut cache = SummaryCache::new();
        cache.reserve("a");
        cache.fail("a", "HTTP 503").unwrap();

        let entry = cache.get("a").unwrap();
        assert_eq!(entry.state, CacheState::Failed);
        assert_eq!(entry.error.as_deref(), Some("HTTP 503"));
        assert!(!cache.is_resolved("a"));

        assert!(cache.reserve_retry("a"));
        assert!(!cache.reserve_retry("a"));
        assert_eq!(cache.get("a").unwrap().attempts, 2);

        cache.complete("a", "ok").unwrap();
        assert!(cache.get("a").unwrap().error.is_none());
        assert!(!cache.reserve_retry("a"));
    }

    #[test]
    fn test_reserve_retry_absent() {
        let mut cache = SummaryCache::new();
        assert!(!cache.reserve_retry("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_recover_interrupted() {
        let mut cache = SummaryCache::new();
        cache.reserve("pending");
        cache.reserve("ready");
        cache.complete("ready", "s").unwrap();

        assert_eq!(cache.recover_interrupted(), 1);
        let entry = cache.get("pending").unwrap();
        assert_eq!(entry.state, CacheState::Failed);
        assert_eq!(entry.error.as_deref(), Some(INTERRUPTED_REASON));
        assert_eq!(cache.count(CacheState::Ready), 1);
        assert_eq!(cache.count(CacheState::Pending), 0);
    }

    #[test]
    fn test_serde_shape() {
        let mut cache = SummaryCache::new();
        cache.reserve("https://example.com/a");
        cache.complete("https://example.com/a", "short").unwrap();

        let value = serde_json::to_value(&cache).unwrap();
        let entry = &value["https://example.com/a"];
        assert_eq!(entry["state"], "ready");
        assert_eq!(entry["summary"], "short");
        assert!(entry.get("error").is_none());

        let restored: SummaryCache = serde_json::from_value(value).unwrap();
        assert_eq!(restored, cache);
    }

    #[test]
    fn test_deserialize_minimal_entry() {
        let json = r#"{"x":{"article_id":"x","summary":null,"state":"failed"}}"#;
        let cache: SummaryCache = serde_json::from_str(json).unwrap();
        let entry = cache.get("x").unwrap();
        assert_eq!(entry.state, CacheState::Failed);
        assert_eq!(entry.attempts, 0);
    }
}
