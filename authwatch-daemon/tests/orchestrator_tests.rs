//! Orchestrator integration tests.
//!
//! Tests the full flow: config -> module init -> start -> health -> shutdown.

use std::path::Path;
use std::time::Duration;

use authwatch_core::config::AuthWatchConfig;
use authwatch_daemon::orchestrator::Orchestrator;
use authwatch_rpc::RpcClient;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Config watching `auth.log` inside `dir`, with the RPC server on `port`.
fn test_config(dir: &Path, port: u16) -> AuthWatchConfig {
    let toml_str = format!(
        r#"
[general]
log_level = "debug"

[watcher]
watch_path = "{watch}"
cache_path = "{cache}"
history_len = 10
lookup_url = "http://127.0.0.1:1"
lookup_timeout_secs = 1

[rpc]
listen_addr = "127.0.0.1"
port = {port}
"#,
        watch = dir.join("auth.log").display(),
        cache = dir.join("cache").join("host_info.json").display(),
    );
    AuthWatchConfig::parse(&toml_str).expect("failed to parse test config")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_registers_modules_without_starting() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = Orchestrator::build_from_config(test_config(dir.path(), free_port()))
        .await
        .expect("orchestrator should build");

    let health = orchestrator.health().await;
    assert_eq!(health.modules.len(), 2);
    assert_eq!(health.modules[0].name, "auth-watcher");
    assert_eq!(health.modules[1].name, "rpc-server");
    assert!(
        health.status.is_unhealthy(),
        "modules are not started yet: {:?}",
        health.status
    );
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let mut config = AuthWatchConfig::default();
    config.watcher.watch_path = "relative/auth.log".to_string();

    let result = Orchestrator::build_from_config(config).await;
    assert!(result.is_err(), "relative watch path must be rejected");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_until_serves_rpc_and_flushes_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("auth.log"), "").expect("create log");
    let port = free_port();
    let cache_path = dir.path().join("cache").join("host_info.json");

    let mut orchestrator = Orchestrator::build_from_config(test_config(dir.path(), port))
        .await
        .expect("orchestrator should build");

    let shutdown = async move {
        let client = RpcClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2))
            .expect("client");
        let mut pong = None;
        for _ in 0..50 {
            if let Ok(reply) = client.ping().await {
                pong = Some(reply);
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(pong.as_deref(), Some("pong"));
        assert_eq!(client.event_count().await.expect("event count"), 0);
        "test"
    };

    tokio::time::timeout(Duration::from_secs(20), orchestrator.run_until(shutdown))
        .await
        .expect("run_until should finish")
        .expect("clean shutdown should succeed");

    assert!(cache_path.exists(), "cache should be flushed on shutdown");
    let health = orchestrator.health().await;
    assert!(health.status.is_unhealthy(), "modules should be stopped");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fatal_token_triggers_shutdown_with_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("auth.log"), "").expect("create log");
    let cache_path = dir.path().join("cache").join("host_info.json");

    let mut orchestrator = Orchestrator::build_from_config(test_config(dir.path(), free_port()))
        .await
        .expect("orchestrator should build");

    let fatal = orchestrator.fatal_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        fatal.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(20),
        orchestrator.run_until(std::future::pending()),
    )
    .await
    .expect("run_until should finish");

    assert!(result.is_err(), "fatal shutdown must be reported as an error");
    assert!(cache_path.exists(), "cache should still be flushed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_startup_failure_rolls_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("auth.log"), "").expect("create log");

    // Occupy the RPC port so the second module fails to start.
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").expect("bind blocker");
    let port = blocker.local_addr().expect("local addr").port();

    let mut orchestrator = Orchestrator::build_from_config(test_config(dir.path(), port))
        .await
        .expect("orchestrator should build");

    let result = tokio::time::timeout(
        Duration::from_secs(20),
        orchestrator.run_until(std::future::pending()),
    )
    .await
    .expect("run_until should finish");

    let err = result.expect_err("port conflict must fail startup");
    assert!(err.to_string().contains("rpc-server"), "unexpected error: {err}");

    let health = orchestrator.health().await;
    assert!(
        health.modules[0].status.is_unhealthy(),
        "watcher should be rolled back"
    );
    assert!(!orchestrator.fatal_token().is_cancelled());
    drop(blocker);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_watch_directory_fails_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing");

    let mut orchestrator = Orchestrator::build_from_config(test_config(&missing, free_port()))
        .await
        .expect("orchestrator should build");

    let result = orchestrator.run_until(std::future::pending()).await;
    let err = result.expect_err("missing watch directory must fail startup");
    assert!(err.to_string().contains("auth-watcher"), "unexpected error: {err}");
}
