//! RPC server module initialization.
//!
//! ```text
//! RpcServer --queries--> WatcherHandle --> EventPipeline state
//! RpcServer --subscribe--> SubscriberRegistry (fan-out from the watcher)
//! ```

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use authwatch_core::config::AuthWatchConfig;
use authwatch_rpc::{RpcServer, RpcSettings};
use authwatch_watcher::WatcherHandle;

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = authwatch_core::event::MODULE_RPC;

/// Initialize the RPC server module around the watcher's query handle.
pub fn init(
    config: &AuthWatchConfig,
    handle: WatcherHandle,
    fatal: CancellationToken,
) -> Result<ModuleHandle> {
    tracing::info!(
        listen_addr = %config.rpc.listen_addr,
        port = config.rpc.port,
        "initializing rpc server"
    );

    let settings = RpcSettings::from_core(&config.rpc)
        .map_err(|e| anyhow::anyhow!("invalid rpc settings: {}", e))?;

    let server = RpcServer::new(settings, handle)
        .map_err(|e| anyhow::anyhow!("failed to build rpc server: {}", e))?
        .with_fatal_token(fatal);

    Ok(ModuleHandle::new(MODULE_NAME, Box::new(server)))
}
