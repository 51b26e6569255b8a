//! CLI argument definitions for authwatch-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// authwatch server daemon.
///
/// Tails the authentication log, enriches remote hosts with geolocation,
/// and serves queries and event subscriptions over RPC.
#[derive(Parser, Debug)]
#[command(name = "authwatch-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to authwatch.toml configuration file.
    #[arg(short, long, default_value = "/etc/authwatch/authwatch.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the watched log path.
    #[arg(long)]
    pub watch_path: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides to a loaded configuration.
    pub fn apply_overrides(&self, config: &mut authwatch_core::config::AuthWatchConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(path) = &self.watch_path {
            config.watcher.watch_path = path.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authwatch_core::config::AuthWatchConfig;

    #[test]
    fn defaults_to_system_config_path() {
        let cli = DaemonCli::parse_from(["authwatch-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/authwatch/authwatch.toml"));
        assert!(!cli.validate);
    }

    #[test]
    fn overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "authwatch-daemon",
            "--log-level",
            "debug",
            "--watch-path",
            "/var/log/secure",
        ]);
        let mut config = AuthWatchConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.watcher.watch_path, "/var/log/secure");
    }
}
