use std::fs;
use std::path::PathBuf;

use rpihw::{HwConfig, HwError};

#[test]
fn partial_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rpihw.json");
    fs::write(
        &path,
        r#"
        {
            "gpio": { "watch_poll_timeout_ms": 100 },
            "i2c": { "adapter": 0 }
        }
        "#,
    )
    .unwrap();

    let config = HwConfig::load_from_file(&path).unwrap();

    assert_eq!(config.gpio.watch_poll_timeout_ms, 100);
    assert_eq!(config.gpio.sysfs_root, PathBuf::from("/sys/class/gpio"));
    assert_eq!((config.gpio.min_line, config.gpio.max_line), (2, 28));
    assert_eq!(config.gpio.export_settle_ms, 50);
    assert_eq!(config.i2c.device_path(), PathBuf::from("/dev/i2c-0"));
    assert_eq!((config.i2c.sda_line, config.i2c.scl_line), (2, 3));
}

#[test]
fn device_override_wins_over_adapter_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rpihw.json");
    fs::write(&path, r#"{ "i2c": { "device": "/dev/i2c-fake" } }"#).unwrap();

    let config = HwConfig::load_from_file(&path).unwrap();

    assert_eq!(config.i2c.device_path(), PathBuf::from("/dev/i2c-fake"));
}

#[test]
fn inverted_line_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rpihw.json");
    fs::write(&path, r#"{ "gpio": { "min_line": 30, "max_line": 2 } }"#).unwrap();

    assert!(matches!(
        HwConfig::load_from_file(&path),
        Err(HwError::Config(_))
    ));
}

#[test]
fn unreadable_or_malformed_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        HwConfig::load_from_file(dir.path().join("missing.json")),
        Err(HwError::Config(_))
    ));

    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        HwConfig::load_from_file(&path),
        Err(HwError::Config(_))
    ));
}
