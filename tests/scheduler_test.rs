//! Poll scheduler tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use common::{post, Harness, FEED_A};
use feedsum::{PollScheduler, SchedulerState};

#[tokio::test]
async fn test_trigger_runs_one_cycle() {
    let h = Harness::new();
    h.engine.add_feed(FEED_A).unwrap();
    h.fetcher.serve(FEED_A, &[post("a.example.com", 1, None)]);
    let scheduler = PollScheduler::new(h.engine.clone(), Duration::from_secs(300));

    let report = scheduler.trigger().await.unwrap();

    assert_eq!(report.summarized, 1);
    assert_eq!(scheduler.completed_cycles(), 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_trigger_while_running_is_skipped() {
    let h = Harness::new();
    h.summarizer.set_delay(Duration::from_millis(100));
    h.engine.add_feed(FEED_A).unwrap();
    h.fetcher.serve(FEED_A, &[post("a.example.com", 1, None)]);
    let scheduler = Arc::new(PollScheduler::new(h.engine.clone(), Duration::from_secs(300)));

    let background = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.trigger().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert!(scheduler.trigger().await.is_none());
    assert_eq!(scheduler.skipped_cycles(), 1);

    let report = background.await.unwrap().unwrap();
    assert_eq!(report.summarized, 1);
    assert_eq!(h.summarizer.total_calls(), 1);
}

#[tokio::test]
async fn test_run_skips_overlapping_ticks_and_stops_on_shutdown() {
    let h = Harness::new();
    h.summarizer.set_delay(Duration::from_millis(120));
    h.engine.add_feed(FEED_A).unwrap();
    h.fetcher.serve(FEED_A, &[post("a.example.com", 1, None)]);
    let scheduler = Arc::new(PollScheduler::new(h.engine.clone(), Duration::from_millis(30)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    task.await.unwrap();

    // The first cycle was still summarizing when later ticks fired
    assert!(scheduler.skipped_cycles() >= 1);
    assert!(scheduler.completed_cycles() >= 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(h.summarizer.total_calls(), 1);
    assert!(h
        .engine
        .cache_entry("https://a.example.com/posts/1")
        .unwrap()
        .is_ready());
}

#[tokio::test]
async fn test_shutdown_waits_for_manual_trigger() {
    let h = Harness::new();
    h.summarizer.set_delay(Duration::from_millis(150));
    h.engine.add_feed(FEED_A).unwrap();
    h.fetcher.serve(FEED_A, &[post("a.example.com", 1, None)]);
    let scheduler = Arc::new(PollScheduler::new(h.engine.clone(), Duration::from_secs(300)));

    let manual = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.trigger().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown_tx.send(true).unwrap();
    task.await.unwrap();

    // The loop's own tick was skipped; the manual cycle finished before run returned
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(scheduler.skipped_cycles(), 1);
    assert!(h
        .engine
        .cache_entry("https://a.example.com/posts/1")
        .unwrap()
        .is_ready());
    assert!(manual.await.unwrap().is_some());
}
