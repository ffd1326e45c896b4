//! Command-line interface for the chaos engine.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// chaosengine - run self-healing chaos experiments against your platforms.
#[derive(Parser)]
#[command(name = "chaosengine")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, env = "CHAOS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CHAOS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Bind address of the admin API
    #[arg(long, env = "CHAOS_ADMIN_ADDR")]
    pub admin_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduling loop and the admin API
    Run {
        /// Use the built-in development configuration when no file is given
        #[arg(long)]
        dev: bool,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
