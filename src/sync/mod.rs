//! Sync cycle orchestration.

pub mod engine;
pub mod scheduler;
pub mod sink;

pub use engine::{Collaborators, SyncEngine, SyncOptions, SyncReport, CANCELLED_REASON};
pub use scheduler::{PollScheduler, SchedulerState};
pub use sink::{ArticleSink, ArticleUpdate, ChannelSink, LogSink};
