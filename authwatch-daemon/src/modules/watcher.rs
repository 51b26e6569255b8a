//! Auth watcher module initialization.
//!
//! Converts `AuthWatchConfig.watcher` into `WatcherSettings`, builds the
//! [`AuthWatcher`](authwatch_watcher::AuthWatcher) and wraps it in a
//! `ModuleHandle`. The returned [`WatcherHandle`] is shared with the RPC
//! server so both see the same pipeline state and subscriber registry.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use authwatch_core::config::AuthWatchConfig;
use authwatch_watcher::{AuthWatcherBuilder, WatcherHandle, WatcherSettings};

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = authwatch_core::event::MODULE_WATCHER;

/// Initialize the auth watcher module.
///
/// The host info cache is loaded here, before any module starts.
/// `fatal` is cancelled if a background task of the watcher fails.
pub async fn init(
    config: &AuthWatchConfig,
    fatal: CancellationToken,
) -> Result<(ModuleHandle, WatcherHandle)> {
    tracing::info!(
        watch_path = %config.watcher.watch_path,
        cache_path = %config.watcher.cache_path,
        "initializing auth watcher"
    );

    let settings = WatcherSettings::from_core(&config.watcher)
        .map_err(|e| anyhow::anyhow!("invalid watcher settings: {}", e))?;

    let watcher = AuthWatcherBuilder::new()
        .settings(settings)
        .fatal_token(fatal)
        .build()
        .await
        .map_err(|e| anyhow::anyhow!("failed to build auth watcher: {}", e))?;

    let handle = watcher.handle();
    Ok((ModuleHandle::new(MODULE_NAME, Box::new(watcher)), handle))
}
