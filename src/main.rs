//! `feedsum` command-line entry point.
//!
//! Every command loads the whole state directory, works on it, and writes it
//! back. Only one process may use a data directory at a time: a second
//! process would turn the first one's pending summaries into failures on load
//! and its writes would overwrite the other's. Stop `feedsum run` before
//! using the other commands on the same directory.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use feedsum::{
    CacheState, Collaborators, Config, FeedError, FeedRsParser, HttpFeedFetcher, HttpSummarizer,
    JsonFileStore, LogSink, PollScheduler, Result, SummarizeOptions, Summarizer, SyncEngine,
    SyncOptions,
};

/// Command-line arguments for feedsum
#[derive(Parser, Debug)]
#[command(name = "feedsum")]
#[command(about = "Follow RSS feeds and keep one summary per article")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml", env = "FEEDSUM_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a feed
    Add { url: String },
    /// Stop following a feed
    Remove { url: String },
    /// List followed feeds
    List,
    /// Run one sync cycle
    Sync,
    /// Mark an article as read
    Read { article_id: String },
    /// Show summaries of unread articles
    Unread,
    /// Sync periodically until Ctrl-C; owns the data directory while running
    Run,
}

impl Command {
    fn needs_summarizer(&self) -> bool {
        matches!(self, Command::Sync | Command::Run)
    }
}

/// Stand-in for commands that never summarize.
struct NoSummarizer;

#[async_trait]
impl Summarizer for NoSummarizer {
    async fn summarize(&self, _text: &str, _options: &SummarizeOptions) -> Result<String> {
        Err(FeedError::Config("no summarizer configured".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match Config::load_with_env(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.config.display());
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = feedsum::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        feedsum::logging::init_console_only(&config.logging.level);
    }
    config.validate()?;

    let engine = Arc::new(build_engine(&config, args.command.needs_summarizer())?);

    match args.command {
        Command::Add { url } => {
            let feed = engine.add_feed(&url)?;
            println!("Following {}", feed.url);
        }
        Command::Remove { url } => {
            let feed = engine.remove_feed(&url)?;
            println!("Removed {}", feed.url);
        }
        Command::List => {
            for feed in engine.list_feeds() {
                println!("{}", feed.url);
            }
        }
        Command::Sync => {
            let report = engine.sync().await;
            println!(
                "{} feed(s), {} failed; {} new article(s); {} summarized, {} failed, {} deferred",
                report.feeds_polled,
                report.feeds_failed,
                report.new_articles,
                report.summarized,
                report.failed,
                report.deferred
            );
        }
        Command::Read { article_id } => {
            if !engine.mark_read(&article_id) {
                println!("Already read: {article_id}");
            }
        }
        Command::Unread => {
            let state = engine.snapshot();
            let mut entries: Vec<_> = state
                .cache
                .iter()
                .filter(|e| e.state == CacheState::Ready && !state.read_state.is_read(&e.article_id))
                .collect();
            entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            for entry in entries {
                println!("{}", entry.article_id);
                println!("  {}", entry.summary.as_deref().unwrap_or_default());
            }
        }
        Command::Run => run_scheduler(engine, &config).await,
    }

    Ok(())
}

fn build_engine(config: &Config, needs_summarizer: bool) -> Result<SyncEngine> {
    let summarizer: Arc<dyn Summarizer> = if needs_summarizer {
        Arc::new(HttpSummarizer::new(&config.summarizer)?)
    } else {
        Arc::new(NoSummarizer)
    };

    let collaborators = Collaborators {
        fetcher: Arc::new(HttpFeedFetcher::new(&config.fetch)?),
        parser: Arc::new(FeedRsParser::from_config(&config.fetch)),
        summarizer,
        sink: Arc::new(LogSink),
    };

    let store = Arc::new(JsonFileStore::open(&config.storage.data_dir)?);
    Ok(SyncEngine::load(store, collaborators, SyncOptions::from(config)))
}

async fn run_scheduler(engine: Arc<SyncEngine>, config: &Config) {
    let scheduler = Arc::new(PollScheduler::new(engine, config.sync.poll_interval()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => info!("Failed to listen for Ctrl+C ({}), shutting down", e),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = task.await {
        eprintln!("Scheduler task failed: {e}");
    }
    info!(
        "Completed {} sync cycle(s), skipped {}",
        scheduler.completed_cycles(),
        scheduler.skipped_cycles()
    );
}
