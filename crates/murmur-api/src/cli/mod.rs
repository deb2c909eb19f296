//! CLI command definitions for the `murmur` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod history;
pub mod status;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Real-time chat relay server.
#[derive(Parser)]
#[command(name = "murmur", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay (WebSocket + REST) server.
    Serve {
        /// Port to listen on (overrides config.toml and PORT).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config.toml).
        #[arg(long)]
        host: Option<String>,

        /// Keep messages in memory only; nothing is written to disk.
        #[arg(long)]
        ephemeral: bool,

        /// Export tracing spans through OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },

    /// Print stored chat messages, oldest first.
    History {
        /// Only the most recent N messages.
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },

    /// Show storage and configuration status.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
