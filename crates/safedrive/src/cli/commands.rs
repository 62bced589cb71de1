//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Health command arguments.
#[derive(Debug, Args)]
pub struct HealthCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Latest-reading command arguments.
#[derive(Debug, Args)]
pub struct LatestCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Don't record the reading in the local history
    #[arg(long)]
    pub no_store: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Also poll the accident list
    #[arg(short, long)]
    pub accidents: bool,

    /// Stop after this many sensor readings
    #[arg(short = 'n', long, value_name = "N")]
    pub count: Option<usize>,

    /// Don't record readings and accidents in the local history
    #[arg(long)]
    pub no_store: bool,

    /// Override the sensor poll interval, in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: Option<u64>,
}

/// Accidents command arguments.
#[derive(Debug, Args)]
pub struct AccidentsCommand {
    /// Maximum number of events to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// List events from the local history instead of the API
    #[arg(long)]
    pub local: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Maximum number of readings
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Show the GPS track instead of the readings
    #[arg(short, long)]
    pub track: bool,

    /// Show aggregates instead of the readings
    #[arg(short, long, conflicts_with = "track")]
    pub summary: bool,

    /// Fetch recent readings from the API instead of the local history
    #[arg(long)]
    pub remote: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Directory to write the evidence package to
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Fail instead of exporting demo data when the API is down
    #[arg(long)]
    pub no_demo: bool,
}

/// Local database commands.
#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Show database statistics
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Apply retention limits
    Prune {
        /// Keep at most this many readings, 0 for unlimited (defaults to storage.max_readings)
        #[arg(long, value_name = "N")]
        keep: Option<usize>,

        /// Delete readings older than this many days, 0 for unlimited (defaults to storage.max_age_days)
        #[arg(long, value_name = "DAYS")]
        max_age_days: Option<u32>,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Plain,
    /// Formatted table
    #[default]
    Table,
    /// JSON output
    Json,
}
