//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Relay - broadcast dispatch and scheduling engine
#[derive(Parser, Debug)]
#[command(
    name = "relay",
    author,
    version,
    about = "Feed relay dispatch and scheduling engine",
    long_about = "Relays content from source feeds to destination chats through a rotating\n\
                  pool of sender identities, honoring per-identity rate limits and\n\
                  per-destination send intervals."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "RELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "RELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one scheduling mode
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "relay.toml", env = "RELAY_CONFIG")]
    pub config: PathBuf,

    /// Scheduling mode
    #[arg(short, long, value_enum, default_value = "batch", env = "RELAY_MODE")]
    pub mode: RunMode,

    /// Post link for `refresh` and `once` (https://t.me/<channel>/<id>)
    #[arg(long, env = "RELAY_POST")]
    pub post: Option<String>,

    /// Override batch tick period in seconds
    #[arg(long, env = "RELAY_TICK_SECS")]
    pub tick_secs: Option<u64>,

    /// Override the delay after each successful send, in milliseconds
    #[arg(long, env = "RELAY_PACING_MS")]
    pub pacing_ms: Option<u64>,

    /// Seed for batch content sampling
    #[arg(long, env = "RELAY_SEED")]
    pub seed: Option<u64>,

    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "RELAY_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Event channel size for relay mode
    #[arg(long, default_value = "100", env = "RELAY_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "RELAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List identity handles
    #[arg(long)]
    pub identities: bool,

    /// List every destination with its cadence
    #[arg(long)]
    pub destinations: bool,
}

/// Scheduling mode for `run`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Relay every new source post to every destination
    Relay,
    /// Periodic random sample per due destination
    #[default]
    Batch,
    /// Retract and re-send a fixed post every interval
    Refresh,
    /// Send one post to every destination and exit
    Once,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relay => "relay",
            Self::Batch => "batch",
            Self::Refresh => "refresh",
            Self::Once => "once",
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
