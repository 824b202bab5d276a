//! Error types for feedsum.

use thiserror::Error;

/// Common error type for feedsum.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Feed download failed (network, non-2xx status, or proxy fallback exhausted).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Feed document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Summarization service returned an error.
    #[error("summarizer error: {0}")]
    Summarizer(String),

    /// An operation did not finish within its time limit.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The feed is already followed.
    #[error("feed already followed: {0}")]
    DuplicateFeed(String),

    /// The feed is not followed.
    #[error("feed not followed: {0}")]
    FeedNotFound(String),

    /// Persisted state could not be decoded.
    ///
    /// Recovered by resetting the affected store; never fatal.
    #[error("storage corruption in {store}: {reason}")]
    StorageCorruption {
        /// Name of the affected store.
        store: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// A summary cache entry was asked to make an illegal state change.
    #[error("invalid cache transition for {id}: {reason}")]
    InvalidTransition {
        /// Article id.
        id: String,
        /// What went wrong.
        reason: String,
    },

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for feedsum operations.
pub type Result<T> = std::result::Result<T, FeedError>;
