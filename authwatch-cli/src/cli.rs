//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default configuration file path. A missing file at this path falls back to defaults.
pub const DEFAULT_CONFIG_PATH: &str = "authwatch.toml";

/// authwatch -- query the auth.log watcher daemon.
///
/// Runs `summary` when no command is given.
#[derive(Parser, Debug)]
#[command(name = "authwatch", version, about, long_about = None)]
pub struct Cli {
    /// Path to the authwatch.toml configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the server URL (e.g. http://localhost:7080).
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the server is alive.
    Ping,

    /// Show a summary of hosts and their message counts.
    Summary,

    /// Show hosts grouped by country, region, city and organisation.
    Country,

    /// Print events as JSON lines as they occur, until Ctrl-C.
    Subscribe(SubscribeArgs),
}

/// Follow live events.
#[derive(Args, Debug, Default)]
pub struct SubscribeArgs {
    /// Exit after printing this many events (history replay included).
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Host the server pushes events to (overrides client.callback_host).
    #[arg(long)]
    pub callback_host: Option<String>,

    /// Number of past events to replay first (overrides client.history_len).
    #[arg(long)]
    pub history_len: Option<usize>,
}
