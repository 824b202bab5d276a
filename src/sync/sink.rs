//! Where per-article updates go.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::feed::Article;
use crate::store::{CacheEntry, CacheState};

/// Receives an event each time an article's cache entry changes.
///
/// Sinks are fire-and-forget; the engine ignores anything they do.
pub trait ArticleSink: Send + Sync {
    /// Called after `entry` was recorded for `article`.
    fn article_updated(&self, article: &Article, entry: &CacheEntry);
}

/// Logs updates through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ArticleSink for LogSink {
    fn article_updated(&self, article: &Article, entry: &CacheEntry) {
        match entry.state {
            CacheState::Ready => info!(
                article = %article.id,
                feed = %article.feed_url,
                "{}: {}",
                article.title,
                entry.summary.as_deref().unwrap_or_default()
            ),
            CacheState::Failed => warn!(
                article = %article.id,
                attempts = entry.attempts,
                "Summary failed for {}: {}",
                article.title,
                entry.error.as_deref().unwrap_or("unknown error")
            ),
            CacheState::Pending => info!(article = %article.id, "Queued {}", article.title),
        }
    }
}

/// One update, as delivered by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleUpdate {
    /// The article.
    pub article: Article,
    /// Its cache entry after the change.
    pub entry: CacheEntry,
}

/// Forwards updates into an unbounded channel, e.g. for a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ArticleUpdate>,
}

impl ChannelSink {
    /// Create a sink and the receiver end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ArticleUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ArticleSink for ChannelSink {
    fn article_updated(&self, article: &Article, entry: &CacheEntry) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(ArticleUpdate {
            article: article.clone(),
            entry: entry.clone(),
        });
    }
}
