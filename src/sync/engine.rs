//! Synchronization engine.
//!
//! One cycle: fetch every followed feed concurrently, find articles that are
//! new or still unsummarized, claim them in the summary cache, mark them seen,
//! then summarize them through a bounded work queue while streaming updates
//! to the sink.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::feed::{normalize_feed_url, Article, Feed, FeedFetcher, FeedParser};
use crate::rate_limit::{RetryBudget, RetryBudgetConfig, RetryDecision};
use crate::store::{persist, CacheEntry, CacheState, StateStore, StoreKey, SyncState};
use crate::summarizer::{SummarizeOptions, Summarizer};
use crate::sync::sink::ArticleSink;
use crate::{FeedError, Result};

/// Reason recorded for claims abandoned by a cancelled cycle.
pub const CANCELLED_REASON: &str = "sync cancelled before completion";

/// External services the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Downloads feed documents.
    pub fetcher: Arc<dyn FeedFetcher>,
    /// Turns documents into articles.
    pub parser: Arc<dyn FeedParser>,
    /// Produces summaries.
    pub summarizer: Arc<dyn Summarizer>,
    /// Receives per-article updates.
    pub sink: Arc<dyn ArticleSink>,
}

/// Tunables for a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Summaries in flight at once. 1 means strictly sequential.
    pub summary_concurrency: usize,
    /// Items considered per feed per cycle.
    pub max_items_per_feed: usize,
    /// Time limit for one summarization call.
    pub summary_timeout: Duration,
    /// Parameters forwarded to the summarizer.
    pub summarize: SummarizeOptions,
    /// Retry limit for failed summaries.
    pub retry_budget: RetryBudgetConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            summary_concurrency: config.sync.summary_concurrency.max(1),
            max_items_per_feed: config.fetch.max_items_per_feed,
            summary_timeout: config.summarizer.timeout(),
            summarize: SummarizeOptions::from(&config.summarizer),
            retry_budget: RetryBudgetConfig::from(&config.sync),
        }
    }
}

impl SyncOptions {
    /// Default options with a different summary concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.summary_concurrency = concurrency.max(1);
        self
    }
}

/// Outcome counters of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Feeds in the registry snapshot.
    pub feeds_polled: usize,
    /// Feeds whose fetch or parse failed.
    pub feeds_failed: usize,
    /// Articles not previously in their feed's ledger.
    pub new_articles: usize,
    /// Articles claimed for summarization.
    pub queued: usize,
    /// Summaries stored.
    pub summarized: usize,
    /// Summarization attempts that failed.
    pub failed: usize,
    /// Failed articles held back by the retry budget.
    pub deferred: usize,
    /// Articles skipped because another cycle is summarizing them.
    pub in_flight: usize,
}

impl SyncReport {
    /// Number of summarizer invocations made by the cycle.
    pub fn summarizer_calls(&self) -> usize {
        self.summarized + self.failed
    }
}

/// An article that may need summarizing, with its ordering keys.
struct Candidate {
    article: Article,
    feed_rank: usize,
    is_new: bool,
}

/// Work decided under the state lock.
#[derive(Default)]
struct Plan {
    claimed: Vec<Article>,
    already_ready: Vec<(Article, CacheEntry)>,
}

/// Claims taken by a cycle that have no recorded outcome yet.
///
/// If the cycle's future is dropped mid-queue, the leftover claims are failed
/// on drop so later cycles retry them instead of seeing them as in flight.
struct ClaimGuard<'a> {
    engine: &'a SyncEngine,
    outstanding: HashSet<String>,
}

impl<'a> ClaimGuard<'a> {
    fn new(engine: &'a SyncEngine, outstanding: HashSet<String>) -> Self {
        Self {
            engine,
            outstanding,
        }
    }

    fn settle(&mut self, id: &str) {
        self.outstanding.remove(id);
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.outstanding.is_empty() {
            return;
        }
        let mut state = self.engine.lock_state();
        for id in &self.outstanding {
            if let Err(e) = state.cache.fail(id, CANCELLED_REASON) {
                debug!("Leaving claim as is: {}", e);
            }
        }
        self.engine.persist(StoreKey::Cache, &state.cache);
        warn!(
            "Sync cancelled with {} summary(ies) outstanding",
            self.outstanding.len()
        );
    }
}

/// Feed synchronization and summary-cache engine.
///
/// The engine is the only writer of its [`SyncState`]. The state sits behind
/// a mutex that is never held across an `.await`, so overlapping cycles
/// (a background tick and a user-triggered sync) race safely: claiming an
/// article in the cache is atomic and exactly one cycle wins it.
pub struct SyncEngine {
    state: Mutex<SyncState>,
    store: Arc<dyn StateStore>,
    collaborators: Collaborators,
    retry_budget: RetryBudget,
    options: SyncOptions,
}

impl SyncEngine {
    /// Create an engine around existing state.
    pub fn new(
        state: SyncState,
        store: Arc<dyn StateStore>,
        collaborators: Collaborators,
        options: SyncOptions,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            store,
            collaborators,
            retry_budget: RetryBudget::new(options.retry_budget),
            options,
        }
    }

    /// Create an engine from persisted state.
    pub fn load(
        store: Arc<dyn StateStore>,
        collaborators: Collaborators,
        options: SyncOptions,
    ) -> Self {
        let state = SyncState::load(store.as_ref());
        Self::new(state, store, collaborators, options)
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write-through save; failures are logged and the in-memory state stays.
    fn persist<T: Serialize>(&self, key: StoreKey, value: &T) {
        if let Err(e) = persist::save(self.store.as_ref(), key, value) {
            error!("Failed to persist {}: {}", key.name(), e);
        }
    }

    /// Follow a feed.
    ///
    /// # Errors
    ///
    /// - [`FeedError::Validation`] for an unusable URL
    /// - [`FeedError::DuplicateFeed`] if already followed
    pub fn add_feed(&self, url: &str) -> Result<Feed> {
        let mut state = self.lock_state();
        let feed = state.registry.add(url)?;
        self.persist(StoreKey::Feeds, &state.registry);
        info!("Following feed {}", feed.url);
        Ok(feed)
    }

    /// Stop following a feed and drop its ledger.
    ///
    /// Cached summaries are kept; articles shared with other feeds, and
    /// re-adding the feed later, reuse them without new summarizer calls.
    pub fn remove_feed(&self, url: &str) -> Result<Feed> {
        let mut state = self.lock_state();
        let feed = state
            .registry
            .remove(url)
            .ok_or_else(|| FeedError::FeedNotFound(url.to_string()))?;
        self.persist(StoreKey::Feeds, &state.registry);
        if state.ledger.forget_feed(&feed.url) {
            self.persist(StoreKey::Ledger, &state.ledger);
        }
        info!("Stopped following feed {}", feed.url);
        Ok(feed)
    }

    /// Followed feeds in registration order.
    pub fn list_feeds(&self) -> Vec<Feed> {
        self.lock_state().registry.list()
    }

    /// Dismiss an article. Returns `false` if it was already read.
    pub fn mark_read(&self, article_id: &str) -> bool {
        let mut state = self.lock_state();
        let inserted = state.read_state.mark_read(article_id);
        if inserted {
            self.persist(StoreKey::ReadState, &state.read_state);
        }
        inserted
    }

    /// Check whether an article was dismissed.
    pub fn is_read(&self, article_id: &str) -> bool {
        self.lock_state().read_state.is_read(article_id)
    }

    /// The articles the user has not dismissed, order preserved.
    pub fn unread_filter(&self, items: &[Article]) -> Vec<Article> {
        self.lock_state().read_state.unread_filter(items)
    }

    /// Current cache entry for an article.
    pub fn cache_entry(&self, article_id: &str) -> Option<CacheEntry> {
        self.lock_state().cache.get(article_id).cloned()
    }

    /// Article ids a feed has produced so far.
    pub fn seen_ids(&self, feed_url: &str) -> BTreeSet<String> {
        let key = normalize_feed_url(feed_url).unwrap_or_else(|_| feed_url.to_string());
        self.lock_state()
            .ledger
            .seen(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> SyncState {
        self.lock_state().clone()
    }

    /// Run one sync cycle.
    ///
    /// Never fails: feed and article problems are logged, counted in the
    /// report and left for the next cycle.
    pub async fn sync(&self) -> SyncReport {
        let feeds = self.list_feeds();
        let mut report = SyncReport {
            feeds_polled: feeds.len(),
            ..SyncReport::default()
        };

        if feeds.is_empty() {
            debug!("No feeds to sync");
            return report;
        }

        info!("Syncing {} feed(s)", feeds.len());

        let fetched = join_all(feeds.iter().map(|feed| self.fetch_articles(feed))).await;
        let mut polled = Vec::with_capacity(feeds.len());
        for (rank, (feed, articles)) in feeds.into_iter().zip(fetched).enumerate() {
            match articles {
                Some(articles) => polled.push((rank, feed, articles)),
                None => report.feeds_failed += 1,
            }
        }

        let plan = self.plan(polled, &mut report);

        for (article, entry) in &plan.already_ready {
            self.collaborators.sink.article_updated(article, entry);
        }

        self.summarize_all(plan.claimed, &mut report).await;

        let tracked = self.retry_budget.cleanup();
        if tracked > 0 {
            debug!("{} failed article(s) within their retry window", tracked);
        }

        info!(
            "Sync finished: {} new, {} summarized, {} failed, {} deferred, {} feed error(s)",
            report.new_articles,
            report.summarized,
            report.failed,
            report.deferred,
            report.feeds_failed
        );
        report
    }

    /// Fetch and parse one feed; `None` if either step failed.
    async fn fetch_articles(&self, feed: &Feed) -> Option<Vec<Article>> {
        let raw = match self.collaborators.fetcher.fetch(&feed.url).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to fetch feed {}: {}", feed.url, e);
                return None;
            }
        };

        match self.collaborators.parser.parse(&feed.url, &raw) {
            Ok(mut articles) => {
                // Newest first so the cap never hides items appended to an
                // oldest-first document; undated items keep document order last
                articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
                articles.truncate(self.options.max_items_per_feed);
                debug!("Feed {} has {} item(s)", feed.url, articles.len());
                Some(articles)
            }
            Err(e) => {
                warn!("Failed to parse feed {}: {}", feed.url, e);
                None
            }
        }
    }

    /// Decide what to summarize, claim it, and update the ledger.
    fn plan(&self, polled: Vec<(usize, Feed, Vec<Article>)>, report: &mut SyncReport) -> Plan {
        let mut state = self.lock_state();
        let mut candidates = Vec::new();
        let mut new_ids_by_feed = Vec::new();

        for (rank, feed, articles) in polled {
            // Removed while its fetch was in flight
            if !state.registry.contains(&feed.url) {
                continue;
            }

            let new_ids: Vec<String> = state
                .ledger
                .filter_new(&feed.url, &articles)
                .into_iter()
                .map(|a| a.id)
                .collect();
            let new_set: HashSet<&str> = new_ids.iter().map(String::as_str).collect();
            report.new_articles += new_set.len();

            for article in articles {
                let is_new = new_set.contains(article.id.as_str());
                if is_new || !state.cache.is_resolved(&article.id) {
                    candidates.push(Candidate {
                        article,
                        feed_rank: rank,
                        is_new,
                    });
                }
            }

            if !new_ids.is_empty() {
                new_ids_by_feed.push((feed.url, new_ids));
            }
        }

        // Newest first, undated last, then registration order, then id
        candidates.sort_by(|a, b| {
            b.article
                .published_at
                .cmp(&a.article.published_at)
                .then(a.feed_rank.cmp(&b.feed_rank))
                .then_with(|| a.article.id.cmp(&b.article.id))
        });

        let mut plan = Plan::default();
        let mut considered = HashSet::new();
        for candidate in candidates {
            if !considered.insert(candidate.article.id.clone()) {
                continue;
            }
            let id = candidate.article.id.as_str();
            match state.cache.get(id).map(|e| e.state) {
                None => {
                    if state.cache.reserve(id) {
                        plan.claimed.push(candidate.article);
                    }
                }
                Some(CacheState::Failed) => match self.retry_budget.check_and_record(id) {
                    RetryDecision::Allowed => {
                        if state.cache.reserve_retry(id) {
                            plan.claimed.push(candidate.article);
                        }
                    }
                    RetryDecision::Denied { retry_after } => {
                        debug!(
                            "Retry budget spent for {}, next attempt in {}s",
                            id,
                            retry_after.as_secs()
                        );
                        report.deferred += 1;
                    }
                },
                Some(CacheState::Pending) => report.in_flight += 1,
                Some(CacheState::Ready) => {
                    if candidate.is_new {
                        if let Some(entry) = state.cache.get(id).cloned() {
                            plan.already_ready.push((candidate.article, entry));
                        }
                    }
                }
            }
        }

        report.queued = plan.claimed.len();
        if !plan.claimed.is_empty() {
            self.persist(StoreKey::Cache, &state.cache);
        }

        // Claims are persisted first, so a seen id is always either
        // summarized or retry-eligible.
        if !new_ids_by_feed.is_empty() {
            for (feed_url, ids) in new_ids_by_feed {
                state.ledger.mark_seen(&feed_url, ids);
            }
            self.persist(StoreKey::Ledger, &state.ledger);
        }

        plan
    }

    /// Summarize claimed articles through the bounded work queue.
    async fn summarize_all(&self, claimed: Vec<Article>, report: &mut SyncReport) {
        if claimed.is_empty() {
            return;
        }
        let mut claims = ClaimGuard::new(self, claimed.iter().map(|a| a.id.clone()).collect());
        debug!(
            "Summarizing {} article(s), concurrency {}",
            claimed.len(),
            self.options.summary_concurrency
        );

        let mut outcomes = stream::iter(claimed)
            .map(|article| async move {
                let outcome = self.summarize_article(&article).await;
                (article, outcome)
            })
            .buffer_unordered(self.options.summary_concurrency.max(1));

        while let Some((article, outcome)) = outcomes.next().await {
            self.record_outcome(&article, outcome, report);
            claims.settle(&article.id);
        }
    }

    async fn summarize_article(&self, article: &Article) -> Result<String> {
        let input = article.summary_input();
        let call = self
            .collaborators
            .summarizer
            .summarize(&input, &self.options.summarize);

        match timeout(self.options.summary_timeout, call).await {
            Ok(Ok(summary)) if summary.trim().is_empty() => {
                Err(FeedError::Summarizer("empty summary".to_string()))
            }
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout(format!(
                "summarizer did not answer within {}s",
                self.options.summary_timeout.as_secs()
            ))),
        }
    }

    /// Store an outcome in the cache and notify the sink.
    fn record_outcome(&self, article: &Article, outcome: Result<String>, report: &mut SyncReport) {
        let entry = {
            let mut state = self.lock_state();
            let recorded = match &outcome {
                Ok(summary) => state.cache.complete(&article.id, summary.as_str()),
                Err(e) => state.cache.fail(&article.id, e.to_string()),
            };
            if let Err(e) = recorded {
                error!("Cache update rejected: {}", e);
            }
            self.persist(StoreKey::Cache, &state.cache);
            state.cache.get(&article.id).cloned()
        };

        match outcome {
            Ok(_) => {
                report.summarized += 1;
                self.retry_budget.forget(&article.id);
                debug!("Summarized {}", article.id);
            }
            Err(e) => {
                report.failed += 1;
                warn!("Failed to summarize {}: {}", article.id, e);
            }
        }

        if let Some(entry) = entry {
            self.collaborators.sink.article_updated(article, &entry);
        }
    }
}
