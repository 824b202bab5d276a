//! Sliding-window retry budget for failed summaries.
//!
//! A summary that failed is retried on later sync cycles, but no article may
//! be retried more than `max_attempts` times within `window`. This keeps a
//! persistently broken article from hammering the summarization service.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::SyncConfig;

/// Configuration for the retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudgetConfig {
    /// Maximum retries allowed in the time window.
    pub max_attempts: u32,
    /// Time window for counting retries.
    pub window: Duration,
}

impl RetryBudgetConfig {
    /// Create a new budget configuration.
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

impl From<&SyncConfig> for RetryBudgetConfig {
    fn from(config: &SyncConfig) -> Self {
        Self::new(config.max_retries_per_window, config.retry_window())
    }
}

/// Result of a budget check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// The retry may proceed.
    Allowed,
    /// The budget for this article is spent.
    Denied {
        /// Time until the oldest recorded attempt leaves the window.
        retry_after: Duration,
    },
}

/// Attempt timestamps for one article.
#[derive(Debug, Default)]
struct Attempts {
    timestamps: Vec<Instant>,
}

impl Attempts {
    fn prune(&mut self, now: Instant, window: Duration) {
        self.timestamps
            .retain(|&t| now.saturating_duration_since(t) < window);
    }

    fn retry_after(&self, now: Instant, window: Duration) -> Duration {
        self.timestamps
            .iter()
            .min()
            .map(|&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }
}

/// Per-article retry limiter.
///
/// State is in-memory only; a process restart grants every failed article a
/// fresh budget.
///
/// # Example
///
/// ```
/// use feedsum::rate_limit::{RetryBudget, RetryBudgetConfig, RetryDecision};
/// use std::time::Duration;
///
/// let budget = RetryBudget::new(RetryBudgetConfig::new(2, Duration::from_secs(60)));
/// let id = "https://example.com/a";
/// assert_eq!(budget.check_and_record(id), RetryDecision::Allowed);
/// assert_eq!(budget.check_and_record(id), RetryDecision::Allowed);
/// assert!(matches!(budget.check_and_record(id), RetryDecision::Denied { .. }));
/// ```
#[derive(Debug)]
pub struct RetryBudget {
    config: RetryBudgetConfig,
    articles: Mutex<HashMap<String, Attempts>>,
}

impl RetryBudget {
    /// Create a new budget with the given configuration.
    pub fn new(config: RetryBudgetConfig) -> Self {
        Self {
            config,
            articles: Mutex::new(HashMap::new()),
        }
    }

    /// Check the budget and, if allowed, record one retry attempt.
    pub fn check_and_record(&self, article_id: &str) -> RetryDecision {
        let now = Instant::now();
        let mut articles = self.articles.lock().unwrap_or_else(PoisonError::into_inner);
        let attempts = articles.entry(article_id.to_string()).or_default();
        attempts.prune(now, self.config.window);

        if attempts.timestamps.len() >= self.config.max_attempts as usize {
            return RetryDecision::Denied {
                retry_after: attempts.retry_after(now, self.config.window),
            };
        }

        attempts.timestamps.push(now);
        RetryDecision::Allowed
    }

    /// Drop tracking for an article, e.g. once its summary is ready.
    pub fn forget(&self, article_id: &str) {
        let mut articles = self.articles.lock().unwrap_or_else(PoisonError::into_inner);
        articles.remove(article_id);
    }

    /// Remove expired attempts and articles with none left.
    ///
    /// Returns how many articles are still tracked.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut articles = self.articles.lock().unwrap_or_else(PoisonError::into_inner);
        for attempts in articles.values_mut() {
            attempts.prune(now, self.config.window);
        }
        articles.retain(|_, a| !a.timestamps.is_empty());
        articles.len()
    }
}
