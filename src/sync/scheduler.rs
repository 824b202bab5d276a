//! Background poll scheduler.
//!
//! Runs a sync cycle at a fixed interval. A tick that arrives while the
//! previous cycle is still running is skipped rather than queued, and manual
//! triggers follow the same rule.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::sync::engine::{SyncEngine, SyncReport};

/// Whether a cycle is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A sync cycle is running.
    Running,
}

/// Clears the running flag when a cycle ends, even by panic.
struct RunningGuard<'a>(&'a watch::Sender<bool>);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a watch::Sender<bool>) -> Option<Self> {
        let acquired = flag.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        acquired.then(|| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// Periodic driver for a [`SyncEngine`].
pub struct PollScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    running: watch::Sender<bool>,
    completed: AtomicU64,
    skipped: AtomicU64,
}

impl PollScheduler {
    /// Create a scheduler that syncs every `interval`.
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            engine,
            interval,
            running,
            completed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        if *self.running.borrow() {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Cycles run to completion.
    pub fn completed_cycles(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Ticks and triggers dropped because a cycle was already running.
    pub fn skipped_cycles(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Run one cycle now.
    ///
    /// Returns `None` without doing anything if a cycle is already running.
    pub async fn trigger(&self) -> Option<SyncReport> {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Sync already running, skipping");
            return None;
        };

        let report = self.engine.sync().await;
        self.completed.fetch_add(1, Ordering::Relaxed);
        Some(report)
    }

    /// Wait until no cycle is running, whoever started it.
    pub async fn wait_idle(&self) {
        let mut running = self.running.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = running.wait_for(|busy| !*busy).await;
    }

    /// Run the scheduler loop until `shutdown` turns `true` or its sender is
    /// dropped.
    ///
    /// The first cycle starts immediately. On shutdown the loop stops ticking
    /// and waits for the cycle in progress to finish, including one started
    /// through [`PollScheduler::trigger`].
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Poll scheduler started (interval: {} seconds)",
            self.interval.as_secs()
        );

        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if self.state() == SchedulerState::Running {
                        self.skipped.fetch_add(1, Ordering::Relaxed);
                        debug!("Previous sync still running, skipping tick");
                        continue;
                    }
                    let scheduler = Arc::clone(&self);
                    in_flight = Some(tokio::spawn(async move {
                        scheduler.trigger().await;
                    }));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.state() == SchedulerState::Running {
            info!("Waiting for the running sync to finish");
        }
        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                error!("Sync task ended abnormally: {}", e);
            }
        }
        self.wait_idle().await;
        info!("Poll scheduler stopped");
    }
}
