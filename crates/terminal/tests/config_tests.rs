//! Integration tests for configuration loading
//!
//! Tests terminal configuration parsing, including:
//! - Full and minimal files
//! - Save/load through the filesystem
//! - Invalid configuration handling
//!
//! Run with: `cargo test -p terminal --test config_tests`

use protocol::SendEncoding;
use std::fs;
use tempfile::tempdir;
use terminal::TerminalConfig;
use terminal::controller::ControllerOptions;

const FULL_CONFIG: &str = r#"
[terminal]
log_level = "debug"
default_encoding = "numeric_tokens"
auto_attach = false

[usb]
filters = ["0x04d8:*", "0x16c0:0x05df"]
detach_kernel_driver = false
skip_root_hubs = false
"#;

#[test]
fn test_load_full_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("terminal.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = TerminalConfig::load(Some(path)).unwrap();

    assert_eq!(config.terminal.log_level, "debug");
    assert_eq!(config.terminal.default_encoding, SendEncoding::NumericTokens);
    assert!(!config.terminal.auto_attach);
    assert_eq!(config.usb.filters.len(), 2);
    assert!(!config.usb.detach_kernel_driver);
    assert!(!config.usb.skip_root_hubs);

    let options = ControllerOptions::from(&config);
    assert_eq!(options.encoding, SendEncoding::NumericTokens);
    assert!(!options.auto_attach);
    assert!(!options.detach_kernel_driver);
}

#[test]
fn test_load_empty_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("terminal.toml");
    fs::write(&path, "").unwrap();

    let config = TerminalConfig::load(Some(path)).unwrap();
    assert_eq!(config, TerminalConfig::default());
}

#[test]
fn test_save_then_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("terminal.toml");

    let mut config = TerminalConfig::default();
    config.usb.filters.push("0x04d8:0x003f".to_string());
    config.terminal.default_encoding = SendEncoding::NumericTokens;
    config.save(&path).unwrap();

    let loaded = TerminalConfig::load(Some(path)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_filter_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("terminal.toml");
    fs::write(
        &path,
        r#"
[usb]
filters = ["04d8:003f"]
"#,
    )
    .unwrap();

    let err = TerminalConfig::load(Some(path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid VID"));
}

#[test]
fn test_invalid_log_level_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("terminal.toml");
    fs::write(&path, "[terminal]\nlog_level = \"loud\"\n").unwrap();

    assert!(TerminalConfig::load(Some(path)).is_err());
}

#[test]
fn test_unknown_encoding_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("terminal.toml");
    fs::write(&path, "[terminal]\ndefault_encoding = \"base64\"\n").unwrap();

    assert!(TerminalConfig::load(Some(path)).is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(TerminalConfig::load(Some(dir.path().join("absent.toml"))).is_err());
}
