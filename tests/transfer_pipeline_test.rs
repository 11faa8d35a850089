
use std::time::Duration;

use snap_engine::Error;
use snap_engine::ReplicationConfig;
use snap_engine::ReplicationError;
use snap_engine::TransferError;
use snap_engine::TransferPipeline;
use tokio::process::Command;

use commons::enable_logger;
use commons::ScriptedEngine;

fn sh(script: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(script);
    cmd
}

fn pipeline(config: ReplicationConfig) -> TransferPipeline {
    TransferPipeline::new(ScriptedEngine::new(), config)
}

/// # Case: a bulk payload crosses the pump intact
#[tokio::test]
async fn test_pipeline_copies_bulk_payload() {
    enable_logger();

    let report = pipeline(ReplicationConfig::default())
        .run(sh("head -c 65536 /dev/zero"), sh("cat >/dev/null"))
        .await
        .expect("transfer should succeed");

    assert_eq!(report.bytes_copied, 65536);
}

/// # Case: a failing sender surfaces its exit code and stderr tail
#[tokio::test]
async fn test_pipeline_reports_sender_diagnostics() {
    enable_logger();

    let err = pipeline(ReplicationConfig::default())
        .run(
            sh("printf data; echo 'cannot open dataset' >&2; exit 3"),
            sh("cat >/dev/null"),
        )
        .await
        .expect_err("transfer must fail");

    match err {
        Error::Replication(ReplicationError::Transfer(TransferError::ToolExit {
            send_status,
            receive_status,
            diagnostics,
        })) => {
            assert_eq!(send_status, Some(3));
            assert_eq!(receive_status, Some(0));
            assert!(diagnostics
                .iter()
                .any(|line| line.contains("cannot open dataset")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// # Case: a stalled sender is killed once the transfer deadline passes
#[tokio::test]
async fn test_pipeline_deadline_kills_stalled_sender() {
    enable_logger();
    let config = ReplicationConfig {
        transfer_deadline_secs: Some(1),
        ..ReplicationConfig::default()
    };

    let started = std::time::Instant::now();
    let err = pipeline(config)
        .run(sh("printf x; exec sleep 30"), sh("cat >/dev/null"))
        .await
        .expect_err("deadline must fire");

    // Teardown must not wait out the producer's sleep
    assert!(started.elapsed() < Duration::from_secs(10));
    match err {
        Error::Replication(ReplicationError::Transfer(TransferError::DeadlineExceeded {
            deadline,
            ..
        })) => {
            assert_eq!(deadline, Duration::from_secs(1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
