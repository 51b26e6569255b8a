//! Command handlers -- one module per subcommand

pub mod country;
pub mod ping;
pub mod subscribe;
pub mod summary;

use std::path::Path;

use authwatch_core::config::AuthWatchConfig;
use authwatch_rpc::{MultiplexerSettings, RpcClient};
use tracing::debug;

use crate::cli::{Cli, Commands, DEFAULT_CONFIG_PATH};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Load the effective configuration (file + env overrides + CLI flags).
///
/// A missing file at the default path falls back to built-in defaults so the
/// CLI works without any configuration on the server host.
pub async fn load_config(cli: &Cli) -> Result<AuthWatchConfig, CliError> {
    let mut config = if cli.config.exists() {
        AuthWatchConfig::from_file(&cli.config)
            .await
            .map_err(|e| CliError::Config(e.to_string()))?
    } else if cli.config == Path::new(DEFAULT_CONFIG_PATH) {
        debug!(path = %cli.config.display(), "config file not found, using defaults");
        AuthWatchConfig::default()
    } else {
        return Err(CliError::Config(format!(
            "config file not found: {}",
            cli.config.display()
        )));
    };

    config.apply_env_overrides();
    if let Some(server) = &cli.server {
        config.client.server_url = server.clone();
    }
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(config)
}

/// Create an RPC client for the configured server.
pub fn connect(config: &AuthWatchConfig) -> Result<RpcClient, CliError> {
    let settings = MultiplexerSettings::from_core(&config.client)?;
    Ok(RpcClient::new(&settings.server_url, settings.request_timeout)?)
}

/// Dispatch the parsed command line.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli).await?;
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Some(Commands::Ping) => ping::execute(&connect(&config)?, &writer).await,
        None | Some(Commands::Summary) => summary::execute(&connect(&config)?, &writer).await,
        Some(Commands::Country) => country::execute(&connect(&config)?, &writer).await,
        Some(Commands::Subscribe(args)) => subscribe::run(args, &config).await,
    }
}
