use snap_engine::EngineError;
use snap_engine::Error;
use snap_engine::NetworkConfig;
use snap_engine::PushOutcome;
use snap_engine::PushReplicator;
use snap_engine::ReplicationClient;
use snap_engine::ReplicationConfig;
use snap_engine::SystemError;
use snap_engine::TransferMode;

use crate::commons;

/// # Case: a fresh destination takes one full stream, the next push rides
/// the newest shared anchor, and a caught-up destination is left alone
#[tokio::test]
async fn test_push_full_then_incremental_then_noop() {
    commons::enable_logger();

    let local = commons::ScriptedEngine::new();
    local.seed("tank/data", &["s1", "s2"]);
    let remote = commons::ScriptedEngine::new();
    remote.seed("backup/data", &[]);

    let dest = commons::start_node(commons::test_settings(21051), remote.clone()).await;
    let client = ReplicationClient::connect(&dest.addr_string(), &NetworkConfig::default())
        .await
        .expect("client connect");
    let replicator = PushReplicator::new(client, local.clone(), ReplicationConfig::default());

    // Empty destination: full stream of the youngest local snapshot
    let outcome = replicator
        .push("tank/data", "backup/data")
        .await
        .expect("full push");
    let report = match outcome {
        PushOutcome::Transferred(report) => report,
        other => panic!("expected a transfer, got {other:?}"),
    };
    assert_eq!(report.target, "s2");
    assert_eq!(report.mode, TransferMode::Full);
    assert_eq!(report.bytes_sent, "full tank/data @s2".len() as u64);

    // The receive landed s2; a newer local snapshot rides that anchor
    remote.seed("backup/data", &["s2"]);
    local.seed("tank/data", &["s1", "s2", "s3"]);

    let outcome = replicator
        .push("tank/data", "backup/data")
        .await
        .expect("incremental push");
    let report = match outcome {
        PushOutcome::Transferred(report) => report,
        other => panic!("expected a transfer, got {other:?}"),
    };
    assert_eq!(report.target, "s3");
    assert_eq!(report.mode, TransferMode::Incremental);
    assert_eq!(report.bytes_sent, "incremental tank/data s2..s3".len() as u64);

    // Destination caught up: nothing travels
    remote.seed("backup/data", &["s2", "s3"]);
    let outcome = replicator
        .push("tank/data", "backup/data")
        .await
        .expect("noop push");
    assert!(matches!(outcome, PushOutcome::UpToDate));

    dest.shutdown().await;
}

/// # Case: pushing a source dataset the engine does not know fails with
/// the engine's not-found error before any stream starts
#[tokio::test]
async fn test_push_unknown_source_dataset() {
    commons::enable_logger();

    let local = commons::ScriptedEngine::new();
    let remote = commons::ScriptedEngine::new();
    remote.seed("backup/data", &[]);

    let dest = commons::start_node(commons::test_settings(21052), remote.clone()).await;
    let client = ReplicationClient::connect(&dest.addr_string(), &NetworkConfig::default())
        .await
        .expect("client connect");
    let replicator = PushReplicator::new(client, local.clone(), ReplicationConfig::default());

    let err = replicator
        .push("tank/missing", "backup/data")
        .await
        .expect_err("push must fail");
    match err {
        Error::System(SystemError::Engine(EngineError::DatasetNotFound(dataset))) => {
            assert_eq!(dataset, "tank/missing");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    dest.shutdown().await;
}
