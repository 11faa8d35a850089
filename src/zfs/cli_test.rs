use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::process::Output;

use super::cli::*;
use crate::DatasetEngine;
use crate::EngineConfig;
use crate::EngineError;
use crate::SnapshotEntry;
use crate::ZfsCli;

fn output(code: i32, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

fn command_strings(cmd: &tokio::process::Command) -> (String, Vec<String>) {
    let std_cmd = cmd.as_std();
    let program = std_cmd.get_program().to_string_lossy().into_owned();
    let args = std_cmd
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    (program, args)
}

#[test]
fn parse_listing_extracts_names_and_indices() {
    let stdout = "tank/projects@auto-daily-2026-01-01-000000\t100\n\
                  tank/projects@auto-daily-2026-01-02-000000\t250\n";

    let entries = parse_snapshot_listing("tank/projects", stdout).unwrap();

    assert_eq!(
        entries,
        vec![
            SnapshotEntry {
                name: "auto-daily-2026-01-01-000000".into(),
                created_index: 100,
            },
            SnapshotEntry {
                name: "auto-daily-2026-01-02-000000".into(),
                created_index: 250,
            },
        ]
    );
}

#[test]
fn parse_listing_skips_child_dataset_rows() {
    let stdout = "tank/projects@keep\t10\n\
                  tank/projects/sub@keep\t11\n\
                  tank/projects@also-keep\t12\n";

    let entries = parse_snapshot_listing("tank/projects", stdout).unwrap();

    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["keep", "also-keep"]);
}

#[test]
fn parse_listing_ignores_blank_lines() {
    let stdout = "\n\ntank/projects@only\t42\n\n";

    let entries = parse_snapshot_listing("tank/projects", stdout).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].created_index, 42);
}

#[test]
fn parse_listing_rejects_rows_without_tab() {
    let stdout = "tank/projects@broken 42\n";

    let result = parse_snapshot_listing("tank/projects", stdout);

    assert!(matches!(result, Err(EngineError::UnexpectedOutput(_))));
}

#[test]
fn parse_listing_rejects_unparsable_index() {
    let stdout = "tank/projects@broken\tnot-a-number\n";

    let result = parse_snapshot_listing("tank/projects", stdout);

    assert!(matches!(result, Err(EngineError::UnexpectedOutput(_))));
}

#[test]
fn missing_dataset_stderr_is_recognized() {
    let out = output(1, "cannot open 'tank/gone': dataset does not exist\n");

    assert!(stderr_reports_missing(&out));
}

#[test]
fn missing_snapshot_stderr_is_recognized() {
    let out = output(
        1,
        "could not find any snapshots to destroy; check snapshot names.\n",
    );

    assert!(stderr_reports_missing(&out));
}

#[test]
fn real_failures_are_not_mistaken_for_missing() {
    let out = output(1, "cannot destroy snapshot: dataset is busy\n");

    assert!(!stderr_reports_missing(&out));
}

#[test]
fn command_failure_maps_missing_dataset() {
    let out = output(1, "cannot open 'tank/gone': dataset does not exist\n");

    let err = command_failure("list", "tank/gone", &out);

    assert!(matches!(err, EngineError::DatasetNotFound(d) if d == "tank/gone"));
}

#[test]
fn command_failure_keeps_status_and_stderr() {
    let out = output(2, "cannot destroy snapshot: dataset is busy\n");

    let err = command_failure("destroy", "tank/projects", &out);

    match err {
        EngineError::CommandFailed {
            verb,
            status,
            stderr,
        } => {
            assert_eq!(verb, "destroy");
            assert_eq!(status, Some(2));
            assert!(stderr.contains("dataset is busy"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn send_command_builds_full_stream_without_anchor() {
    let cli = ZfsCli::new(EngineConfig::default());

    let cmd = cli.send_command("tank/projects".into(), "auto-daily-x".into(), None);

    let (program, args) = command_strings(&cmd);
    assert_eq!(program, "/sbin/zfs");
    assert_eq!(args, vec!["send", "-pPv", "tank/projects@auto-daily-x"]);
}

#[test]
fn send_command_builds_incremental_stream_with_anchor() {
    let cli = ZfsCli::new(EngineConfig::default());

    let cmd = cli.send_command(
        "tank/projects".into(),
        "auto-daily-new".into(),
        Some("auto-daily-old".into()),
    );

    let (_, args) = command_strings(&cmd);
    assert_eq!(
        args,
        vec![
            "send",
            "-pPv",
            "-i",
            "@auto-daily-old",
            "tank/projects@auto-daily-new",
        ]
    );
}

#[test]
fn receive_command_forces_unmounted_import() {
    let cli = ZfsCli::new(EngineConfig::default());

    let cmd = cli.receive_command("backup/projects".into());

    let (_, args) = command_strings(&cmd);
    assert_eq!(args, vec!["receive", "-vFu", "backup/projects"]);
}
