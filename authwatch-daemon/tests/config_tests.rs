//! Configuration loading and CLI override tests.

use std::io::Write;

use authwatch_core::config::AuthWatchConfig;
use authwatch_daemon::cli::DaemonCli;
use clap::Parser;
use serial_test::serial;

#[tokio::test]
async fn test_example_config_parses() {
    let content = include_str!("../../authwatch.toml.example");
    let config = AuthWatchConfig::parse(content).expect("example config should parse");
    config.validate().expect("example config should be valid");
    assert_eq!(config.watcher.watch_path, "/var/log/auth.log");
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
[general]
log_level = "debug"
log_format = "pretty"

[watcher]
watch_path = "/var/log/secure"
history_len = 100
"#
    )
    .expect("write config");

    let config = AuthWatchConfig::from_file(file.path())
        .await
        .expect("config should load");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.watcher.watch_path, "/var/log/secure");
    assert_eq!(config.watcher.history_len, 100);
    assert_eq!(config.rpc.port, 7080);
}

#[tokio::test]
async fn test_missing_file_is_error() {
    let result = AuthWatchConfig::from_file("/nonexistent/authwatch.toml").await;
    assert!(result.is_err());
}

#[test]
fn test_cli_override_is_revalidated() {
    let cli = DaemonCli::parse_from(["authwatch-daemon", "--log-format", "xml"]);
    let mut config = AuthWatchConfig::default();
    cli.apply_overrides(&mut config);
    assert!(config.validate().is_err(), "invalid CLI log format must fail validation");
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    // SAFETY: serialized with other env-mutating tests
    unsafe { std::env::set_var("AUTHWATCH_GENERAL_LOG_LEVEL", "warn") };

    let mut config = AuthWatchConfig::default();
    config.apply_env_overrides();
    assert_eq!(config.general.log_level, "warn");

    let cli = DaemonCli::parse_from(["authwatch-daemon", "--log-level", "trace"]);
    cli.apply_overrides(&mut config);
    assert_eq!(config.general.log_level, "trace");

    unsafe { std::env::remove_var("AUTHWATCH_GENERAL_LOG_LEVEL") };
}
