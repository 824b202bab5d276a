//! Local state owned by the sync engine.
//!
//! Four independent stores plus the port they are persisted through:
//!
//! - [`FeedRegistry`]: followed feeds
//! - [`KnownArticleLedger`]: article ids already observed per feed
//! - [`SummaryCache`]: summaries and their pending/failed markers
//! - [`ReadStateSet`]: articles the user dismissed

pub mod cache;
pub mod ledger;
pub mod persist;
pub mod read_state;
pub mod registry;

pub use cache::{CacheEntry, CacheState, SummaryCache, INTERRUPTED_REASON};
pub use ledger::KnownArticleLedger;
pub use persist::{JsonFileStore, MemoryStore, StateStore, StoreKey};
pub use read_state::ReadStateSet;
pub use registry::FeedRegistry;

use tracing::{info, warn};

/// The engine's context object: all four stores together.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    /// Followed feeds.
    pub registry: FeedRegistry,
    /// Known-article ledger.
    pub ledger: KnownArticleLedger,
    /// Summary cache.
    pub cache: SummaryCache,
    /// Read-state set.
    pub read_state: ReadStateSet,
}

impl SyncState {
    /// Create empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every store from `store`.
    ///
    /// Missing or corrupt stores start empty. Entries left `Pending` by a
    /// previous process become `Failed` so the next cycle retries them.
    pub fn load(store: &dyn StateStore) -> Self {
        let mut state = Self {
            registry: persist::load_or_default(store, StoreKey::Feeds),
            ledger: persist::load_or_default(store, StoreKey::Ledger),
            cache: persist::load_or_default(store, StoreKey::Cache),
            read_state: persist::load_or_default(store, StoreKey::ReadState),
        };

        let recovered = state.cache.recover_interrupted();
        if recovered > 0 {
            warn!("Recovered {} interrupted summaries as failed", recovered);
            if let Err(e) = persist::save(store, StoreKey::Cache, &state.cache) {
                warn!("Failed to persist recovered summaries: {}", e);
            }
        }

        info!(
            "Loaded state: {} feed(s), {} cached summaries, {} read article(s)",
            state.registry.len(),
            state.cache.len(),
            state.read_state.len()
        );
        state
    }

    /// Save every store to `store`.
    pub fn save_all(&self, store: &dyn StateStore) -> crate::Result<()> {
        persist::save(store, StoreKey::Feeds, &self.registry)?;
        persist::save(store, StoreKey::Ledger, &self.ledger)?;
        persist::save(store, StoreKey::Cache, &self.cache)?;
        persist::save(store, StoreKey::ReadState, &self.read_state)?;
        Ok(())
    }
}
