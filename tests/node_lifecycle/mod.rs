use snap_engine::NetworkConfig;
use snap_engine::ReplicationClient;
use snap_engine::ScheduleConfig;

use crate::commons;

/// # Case: a freshly started node answers negotiation RPCs over the wire
/// and stops listening after the shutdown signal
#[tokio::test]
async fn test_node_start_serve_stop() {
    commons::enable_logger();

    let engine = commons::ScriptedEngine::new();
    engine.seed("tank/data", &["auto-hourly-2026-01-01-000000", "manual-x"]);

    let test_node = commons::start_node(commons::test_settings(21041), engine.clone()).await;
    let addr = test_node.addr_string();
    assert!(test_node.node.server_is_ready());

    let client = ReplicationClient::connect(&addr, &NetworkConfig::default())
        .await
        .expect("client connect");
    let listed = client
        .list_snapshots("tank/data")
        .await
        .expect("list snapshots");
    assert_eq!(listed, vec!["auto-hourly-2026-01-01-000000", "manual-x"]);

    test_node.shutdown().await;
    commons::wait_for_listener_gone(&addr).await;
}

/// # Case: an enabled schedule keeps creating managed snapshots while
/// retention removes the stale ones, and manual snapshots survive
#[tokio::test]
async fn test_schedule_fires_and_prunes() {
    commons::enable_logger();

    let engine = commons::ScriptedEngine::new();
    engine.seed(
        "tank/projects",
        &[
            "auto-nightly-2026-01-01-000000",
            "auto-nightly-2026-01-02-000000",
            "manual-keep",
        ],
    );

    let mut settings = commons::test_settings(21042);
    settings.retention.drain_delay_ms = 50;
    settings.schedules = vec![ScheduleConfig {
        name: "nightly".to_string(),
        dataset: "tank/projects".to_string(),
        label: None,
        every_secs: 1,
        keep: 1,
        recursive: false,
        enabled: true,
    }];

    let test_node = commons::start_node(settings, engine.clone()).await;

    commons::wait_until("stale managed snapshots pruned", || {
        let names = engine.snapshot_names("tank/projects");
        let seeded_gone = !names
            .iter()
            .any(|n| n.contains("2026-01-01-000000") || n.contains("2026-01-02-000000"));
        let fresh_exists = names.iter().any(|n| n.starts_with("auto-nightly-"));
        seeded_gone && fresh_exists
    })
    .await;

    let names = engine.snapshot_names("tank/projects");
    assert!(names.contains(&"manual-keep".to_string()));

    test_node.shutdown().await;
}
