//! feedsum - RSS feed sync and summary cache
//!
//! Follows a set of feeds, detects new articles, and keeps exactly one
//! summary per article: a summary is requested at most once and reused until
//! it fails, in which case it is retried on a later cycle.

pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod rate_limit;
pub mod store;
pub mod summarizer;
pub mod sync;

pub use config::Config;
pub use error::{FeedError, Result};
pub use feed::{
    article_id, normalize_feed_url, Article, Feed, FeedFetcher, FeedParser, FeedRsParser,
    HttpFeedFetcher,
};
pub use rate_limit::{RetryBudget, RetryBudgetConfig, RetryDecision};
pub use store::{
    CacheEntry, CacheState, FeedRegistry, JsonFileStore, KnownArticleLedger, MemoryStore,
    ReadStateSet, StateStore, StoreKey, SummaryCache, SyncState, INTERRUPTED_REASON,
};
pub use summarizer::{HttpSummarizer, SummarizeOptions, Summarizer};
pub use sync::{
    ArticleSink, ArticleUpdate, ChannelSink, Collaborators, LogSink, PollScheduler,
    SchedulerState, SyncEngine, SyncOptions, SyncReport, CANCELLED_REASON,
};
