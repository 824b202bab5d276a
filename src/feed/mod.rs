//! Feed-side collaborators: article identity, fetching and parsing.
//!
//! The sync engine depends only on the [`FeedFetcher`] and [`FeedParser`]
//! traits; [`HttpFeedFetcher`] and [`FeedRsParser`] are the defaults used by
//! the binary.

pub mod fetcher;
pub mod identity;
pub mod parser;
pub mod types;

pub use fetcher::{validate_url, FeedFetcher, HttpFeedFetcher};
pub use identity::{article_id, normalize_feed_url};
pub use parser::{FeedParser, FeedRsParser};
pub use types::{Article, Feed, MAX_DESCRIPTION_LENGTH, MAX_FEED_SIZE, MAX_ITEMS_PER_FEED};
