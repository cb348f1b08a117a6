//! Tests for tracing setup
//!
//! The global subscriber can be installed once per process, so only one test
//! here installs it.

use dqp_common::config::LoggingConfig;
use dqp_common::logging::init_tracing;
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn test_invalid_level_is_rejected() {
    std::env::remove_var("RUST_LOG");

    let config = LoggingConfig {
        level: "dqp_tracker=loudest".to_string(),
        file: None,
    };

    assert!(init_tracing(&config).is_err());
}

#[test]
#[serial]
fn test_file_logging_writes_events() {
    std::env::remove_var("RUST_LOG");
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs").join("dqp.log");

    let config = LoggingConfig {
        level: "info".to_string(),
        file: Some(log_path.clone()),
    };
    init_tracing(&config).unwrap();

    tracing::info!(entity_id = "patient-1", "Progress committed");
    tracing::debug!("below configured level");

    let content = std::fs::read_to_string(&log_path).unwrap();
    assert!(content.contains("Progress committed"));
    assert!(content.contains("patient-1"));
    assert!(!content.contains("below configured level"));
}
