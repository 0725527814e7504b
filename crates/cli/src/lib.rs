//! Command-line front end for relay outbox planning.
//!
//! Provides commands for:
//! - Building the write index and outbox relay list from relay-list dumps
//! - Fusing monitor reports into a liveness report
//! - Generating a router config for a follow list

pub mod commands;
pub mod config;
pub mod files;

pub use commands::{analyze, gen_router, CommandResult};
pub use config::{CliConfig, Command};
