#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Config file loading from explicit paths.

use std::time::Duration;

use dash_core::config::load_config;
use dash_core::CoreError;

#[test]
fn explicit_file_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "server:\n  url: https://console.example.org\n  request_timeout_ms: 1500\ntail:\n  base_interval_ms: 500\n  max_buffered_events: 300\n",
    )
    .unwrap();

    let (cfg, used) = load_config(Some(&path)).unwrap();
    assert_eq!(used.as_deref(), Some(path.as_path()));
    assert_eq!(cfg.server.request_timeout, Duration::from_millis(1500));
    assert_eq!(cfg.tail.base_interval, Duration::from_millis(500));
    assert_eq!(cfg.tail.max_buffered_events, 300);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(Some(&dir.path().join("absent.yaml"))).unwrap_err();
    assert!(matches!(err, CoreError::Io { action: "read", .. }));
}

#[test]
fn invalid_values_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "server:\n  url: localhost:3000\n").unwrap();

    let err = load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}
