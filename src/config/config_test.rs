use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_snap_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("SNAP__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = Settings::default();

    assert_eq!(config.node.listen_address.port(), 4242);
    assert!(config.node.enable_rpc);
    assert_eq!(config.engine.zfs_path, std::path::PathBuf::from("/sbin/zfs"));
    assert_eq!(config.replication.chunk_size, 4096);
    assert_eq!(config.retention.drain_delay_ms, 1000);
    assert_eq!(config.retention.retry.max_retries, 3);
    assert!(!config.tls.enable_tls);
    assert!(config.schedules.is_empty());
}

#[test]
#[serial]
fn load_should_merge_environment_overrides() {
    cleanup_all_snap_env_vars();
    with_vars(
        vec![("SNAP__REPLICATION__CHUNK_SIZE", Some("65536"))],
        || {
            let config = Settings::load(None).unwrap();

            assert_eq!(config.replication.chunk_size, 65536);
        },
    );
}

#[test]
#[serial]
fn load_should_merge_file_settings() {
    cleanup_all_snap_env_vars();
    // Create temporary directory and configuration file
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    // Dynamically generate TOML configuration content
    std::fs::write(
        &config_path,
        r#"
        [node]
        node_name = "replica-a"

        [replication]
        chunk_size = 131072
        transfer_deadline_secs = 900

        [[schedules]]
        name = "hourly"
        dataset = "tank/projects"
        every_secs = 3600
        keep = 24
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let config = Settings::load(config_path.to_str()).unwrap();

        assert_eq!(config.node.node_name, "replica-a");
        assert_eq!(config.replication.chunk_size, 131072);
        assert_eq!(
            config.replication.transfer_deadline(),
            Some(std::time::Duration::from_secs(900))
        );
        assert_eq!(config.schedules.len(), 1);
        assert_eq!(config.schedules[0].name, "hourly");
        assert_eq!(config.schedules[0].keep, 24);
        // Unset fields fall back to serde defaults
        assert!(config.schedules[0].recursive);
        assert!(config.schedules[0].enabled);
    });
}

#[test]
fn validate_should_reject_duplicate_schedule_names() {
    let mut config = Settings::default();
    let schedule = ScheduleConfig {
        name: "daily".into(),
        dataset: "tank/projects".into(),
        label: None,
        every_secs: 86400,
        keep: 7,
        recursive: true,
        enabled: true,
    };
    config.schedules.push(schedule.clone());
    config.schedules.push(schedule);

    assert!(config.validate().is_err());
}

#[test]
fn validate_should_reject_zero_chunk_size() {
    let mut config = Settings::default();
    config.replication.chunk_size = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validate_should_reject_zero_retention_capacity() {
    let mut config = Settings::default();
    config.retention.queue_capacity = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validate_should_reject_mtls_without_tls() {
    let mut config = Settings::default();
    config.tls.enable_mtls = true;

    assert!(config.validate().is_err());
}

#[test]
fn validate_should_accept_default_config() {
    let config = Settings::default();

    assert!(config.validate().is_ok());
}

#[test]
fn schedule_prefixes_should_cover_every_schedule() {
    let mut config = Settings::default();
    config.schedules.push(ScheduleConfig {
        name: "hourly".into(),
        dataset: "tank/projects".into(),
        label: None,
        every_secs: 3600,
        keep: 24,
        recursive: true,
        enabled: true,
    });
    config.schedules.push(ScheduleConfig {
        name: "weekly".into(),
        dataset: "tank/projects".into(),
        label: Some("week".into()),
        every_secs: 604800,
        keep: 4,
        recursive: true,
        enabled: false,
    });

    assert_eq!(
        config.schedule_prefixes(),
        vec!["auto-hourly-".to_string(), "auto-week-".to_string()]
    );
}

#[test]
fn network_validate_should_reject_inverted_keepalive() {
    let mut config = NetworkConfig::default();
    config.http2_keep_alive_interval_in_secs = 10;
    config.http2_keep_alive_timeout_in_secs = 30;

    assert!(config.validate().is_err());
}

#[test]
fn network_validate_should_reject_small_stream_window() {
    let mut config = NetworkConfig::default();
    config.adaptive_window = false;
    config.stream_window_size = 1024;

    assert!(config.validate().is_err());
}
