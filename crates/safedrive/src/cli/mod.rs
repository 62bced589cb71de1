//! Command-line interface for safedrive.
//!
//! This module provides the CLI structure for the `safedrive` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AccidentsCommand, ConfigCommand, DbCommand, ExportCommand, HealthCommand, HistoryCommand,
    LatestCommand, OutputFormat, StatsCommand, WatchCommand,
};

/// safedrive - Vehicle safety telemetry from the command line
///
/// Reads live sensor data and accident events from the telemetry API,
/// keeps a local history, flags dangerous readings, and exports evidence
/// packages. Falls back to demo data when the API is unreachable.
#[derive(Debug, Parser)]
#[command(name = "safedrive")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check whether the API is reachable
    Health(HealthCommand),

    /// Fetch and assess the latest sensor reading
    Latest(LatestCommand),

    /// Poll live readings until interrupted
    Watch(WatchCommand),

    /// List accident events
    Accidents(AccidentsCommand),

    /// Show recorded readings
    History(HistoryCommand),

    /// Show API statistics
    Stats(StatsCommand),

    /// Write an evidence package
    Export(ExportCommand),

    /// Manage the local database
    #[command(subcommand)]
    Db(DbCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}
