//! authwatch CLI library.
//!
//! Exposes argument parsing, command handlers and output rendering so they
//! can be exercised by integration tests. The `authwatch` binary is main.rs.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
