use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::ScheduleConfig;
use crate::test_utils::FakeEngine;
use crate::RetentionQueue;
use crate::ScheduleRunner;
use crate::ScheduleSupervisor;

fn schedule(name: &str, dataset: &str, keep: usize) -> ScheduleConfig {
    ScheduleConfig {
        name: name.to_string(),
        dataset: dataset.to_string(),
        label: None,
        every_secs: 3600,
        keep,
        recursive: true,
        enabled: true,
    }
}

#[test]
fn test_snapshot_name_is_prefix_plus_timestamp() {
    let runner = ScheduleRunner::new(
        schedule("hourly", "tank/a", 3),
        Arc::new(FakeEngine::new()),
        RetentionQueue::new(4).0,
    );

    let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
    assert_eq!(runner.snapshot_name(at), "auto-hourly-2025-03-14-092653");
}

#[tokio::test]
async fn test_fire_creates_snapshot_and_prunes_oldest_beyond_keep() {
    let engine = Arc::new(FakeEngine::new().with_dataset(
        "tank/a",
        &[
            "auto-hourly-old1",
            "auto-hourly-old2",
            "auto-hourly-old3",
            "manual-important",
        ],
    ));
    let (queue, mut rx) = RetentionQueue::new(16);
    let runner = ScheduleRunner::new(schedule("hourly", "tank/a", 2), engine.clone(), queue.clone());

    runner.fire().await.unwrap();

    let created = engine.created();
    assert_eq!(created.len(), 1);
    assert!(created[0].1.starts_with("auto-hourly-"));

    // 4 owned snapshots after the firing, keep 2: the two oldest go,
    // oldest first. The manual snapshot is never considered.
    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.snapshot, "auto-hourly-old1");
    assert_eq!(second.snapshot, "auto-hourly-old2");
    assert_eq!(queue.len(), 2);
}

#[tokio::test]
async fn test_fire_enqueues_nothing_while_history_is_underfull() {
    let engine = Arc::new(FakeEngine::new().with_dataset("tank/a", &["auto-daily-1"]));
    let (queue, mut rx) = RetentionQueue::new(16);
    let runner = ScheduleRunner::new(schedule("daily", "tank/a", 5), engine.clone(), queue);

    runner.fire().await.unwrap();

    assert_eq!(engine.created().len(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_fire_skips_pruning_when_create_fails() {
    let engine = Arc::new(FakeEngine::new().with_dataset(
        "tank/a",
        &["auto-hourly-old1", "auto-hourly-old2", "auto-hourly-old3"],
    ));
    engine.fail_creates(true);
    let (queue, mut rx) = RetentionQueue::new(16);
    let runner = ScheduleRunner::new(schedule("hourly", "tank/a", 1), engine.clone(), queue);

    let result = runner.fire().await;

    assert!(result.is_err());
    assert!(rx.try_recv().is_err());
    assert_eq!(engine.snapshot_names("tank/a").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_runner_fires_on_cadence_until_cancelled() {
    let engine = Arc::new(FakeEngine::new().with_dataset("tank/a", &[]));
    let (queue, _rx) = RetentionQueue::new(64);
    let mut config = schedule("hourly", "tank/a", 100);
    config.every_secs = 1;
    let runner = ScheduleRunner::new(config, engine.clone(), queue);

    let token = CancellationToken::new();
    let handle = tokio::spawn(runner.run(token.clone()));

    tokio::time::sleep(Duration::from_secs(5)).await;
    token.cancel();
    handle.await.unwrap();

    // First firing lands one interval in; five virtual seconds give at
    // least four firings. Virtual firings share a wall-clock second and
    // collide on the snapshot name, so count attempts, not successes.
    assert!(engine.create_calls().len() >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_cancels_one_schedule_without_touching_others() {
    let engine = Arc::new(
        FakeEngine::new()
            .with_dataset("tank/a", &[])
            .with_dataset("tank/b", &[]),
    );
    let (queue, _rx) = RetentionQueue::new(64);

    let mut first = schedule("first", "tank/a", 100);
    first.every_secs = 1;
    let mut second = schedule("second", "tank/b", 100);
    second.every_secs = 1;

    let supervisor = ScheduleSupervisor::start(&[first, second], engine.clone(), queue);
    assert_eq!(supervisor.running(), 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(supervisor.cancel("first"));
    assert!(!supervisor.cancel("no-such-schedule"));

    let frozen = count_for(&engine, "tank/a");
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(count_for(&engine, "tank/a"), frozen);
    assert!(count_for(&engine, "tank/b") > frozen);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_supervisor_skips_disabled_schedules() {
    let engine = Arc::new(FakeEngine::new().with_dataset("tank/a", &[]));
    let (queue, _rx) = RetentionQueue::new(16);

    let enabled = schedule("on", "tank/a", 3);
    let mut disabled = schedule("off", "tank/a", 3);
    disabled.enabled = false;

    let supervisor = ScheduleSupervisor::start(&[enabled, disabled], engine, queue);
    assert_eq!(supervisor.running(), 1);

    supervisor.shutdown().await;
}

fn count_for(engine: &FakeEngine, dataset: &str) -> usize {
    engine
        .create_calls()
        .iter()
        .filter(|(d, _)| d == dataset)
        .count()
}
