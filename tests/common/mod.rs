//! Test helpers for sync tests.
//!
//! Provides in-memory fakes for the feed fetcher, summarizer and sink, an RSS
//! document builder, and a `Harness` that wires them to a `SyncEngine`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use feedsum::{
    Article, ArticleSink, ArticleUpdate, CacheEntry, CacheState, Collaborators, FeedError,
    FeedFetcher, FeedRsParser, MemoryStore, Result, SummarizeOptions, Summarizer, SyncEngine,
    SyncOptions,
};

pub const FEED_A: &str = "https://a.example.com/feed";
pub const FEED_B: &str = "https://b.example.com/feed";

/// One `<item>` of a generated RSS document.
#[derive(Debug, Clone)]
pub struct TestItem {
    pub title: String,
    pub link: String,
    pub day: Option<u32>,
}

/// Item `n` of a feed host, published on January `day` 2024.
pub fn post(host: &str, n: u32, day: Option<u32>) -> TestItem {
    TestItem {
        title: format!("{host} post {n}"),
        link: format!("https://{host}/posts/{n}"),
        day,
    }
}

/// Render items as an RSS 2.0 document.
pub fn rss(items: &[TestItem]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Test feed</title><link>https://example.com/</link><description>Test</description>"#,
    );
    for item in items {
        xml.push_str("<item>");
        xml.push_str(&format!("<title>{}</title>", item.title));
        xml.push_str(&format!("<link>{}</link>", item.link));
        xml.push_str(&format!("<description>About {}</description>", item.title));
        if let Some(day) = item.day {
            let date = Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap();
            xml.push_str(&format!("<pubDate>{}</pubDate>", date.to_rfc2822()));
        }
        xml.push_str("</item>");
    }
    xml.push_str("</channel></rss>");
    xml
}

/// Serves canned documents per URL.
#[derive(Default)]
pub struct FakeFetcher {
    docs: Mutex<HashMap<String, std::result::Result<String, String>>>,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, items: &[TestItem]) {
        self.serve_raw(url, rss(items));
    }

    pub fn serve_raw(&self, url: &str, body: impl Into<String>) {
        self.docs.lock().unwrap().insert(url.to_string(), Ok(body.into()));
    }

    pub fn fail(&self, url: &str, reason: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(reason.to_string()));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.docs.lock().unwrap().get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(reason)) => Err(FeedError::Fetch(reason.clone())),
            None => Err(FeedError::Fetch(format!("HTTP 404 for {url}"))),
        }
    }
}

/// Summarizer that answers "Summary of <title>" and records every call.
#[derive(Default)]
pub struct FakeSummarizer {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSummarizer {
    /// Fail every call for the article with this title.
    pub fn fail_on(&self, title: &str) {
        self.failing.lock().unwrap().insert(title.to_string());
    }

    pub fn recover(&self, title: &str) {
        self.failing.lock().unwrap().remove(title);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, title: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| *t == title).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, text: &str, _options: &SummarizeOptions) -> Result<String> {
        let title = text.lines().next().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(title.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&title) {
            return Err(FeedError::Summarizer("model unavailable".to_string()));
        }
        Ok(format!("Summary of {title}"))
    }
}

/// Keeps every update it receives.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<ArticleUpdate>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<ArticleUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn states_for(&self, title: &str) -> Vec<CacheState> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.article.title == title)
            .map(|u| u.entry.state)
            .collect()
    }
}

impl ArticleSink for RecordingSink {
    fn article_updated(&self, article: &Article, entry: &CacheEntry) {
        self.updates.lock().unwrap().push(ArticleUpdate {
            article: article.clone(),
            entry: entry.clone(),
        });
    }
}

/// An engine over a `MemoryStore` with fake collaborators.
pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub summarizer: Arc<FakeSummarizer>,
    pub sink: Arc<RecordingSink>,
    pub options: SyncOptions,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(SyncOptions::default())
    }

    pub fn with_options(options: SyncOptions) -> Self {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(FakeFetcher::default());
        let summarizer = Arc::new(FakeSummarizer::default());
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(SyncEngine::load(
            store.clone(),
            Collaborators {
                fetcher: fetcher.clone(),
                parser: Arc::new(FeedRsParser::new()),
                summarizer: summarizer.clone(),
                sink: sink.clone(),
            },
            options.clone(),
        ));
        Self {
            engine,
            store,
            fetcher,
            summarizer,
            sink,
            options,
        }
    }

    /// A fresh engine loaded from the same store, as after a restart.
    pub fn restart(&self) -> Arc<SyncEngine> {
        Arc::new(SyncEngine::load(
            self.store.clone(),
            Collaborators {
                fetcher: self.fetcher.clone(),
                parser: Arc::new(FeedRsParser::new()),
                summarizer: self.summarizer.clone(),
                sink: self.sink.clone(),
            },
            self.options.clone(),
        ))
    }

    /// Id of an item as the engine sees it.
    pub fn id_of(item: &TestItem) -> String {
        item.link.clone()
    }
}

/// Options with a short retry window, for retry-budget tests.
pub fn options_with_budget(max_attempts: u32, window: Duration) -> SyncOptions {
    let mut options = SyncOptions::default();
    options.retry_budget = feedsum::RetryBudgetConfig::new(max_attempts, window);
    options
}
