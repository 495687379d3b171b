//! CLI argument definitions using clap
//!
//! Commands:
//! - shardgate recover --config <path> [--expect-data]
//! - shardgate translog dump --path <file>
//! - shardgate translog stats --path <file>

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// shardgate - shard local recovery and translog tooling
#[derive(Parser, Debug)]
#[command(name = "shardgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Log filter directive, overrides SHARDGATE_LOG
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recover a shard from its local store and translog
    Recover {
        /// Path to shard configuration file
        #[arg(long, default_value = "./shard.json")]
        config: PathBuf,

        /// The shard is expected to hold data from a previous run
        #[arg(long)]
        expect_data: bool,
    },

    /// Inspect translog files
    Translog {
        #[command(subcommand)]
        action: TranslogAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum TranslogAction {
    /// Print every operation as one JSON line
    Dump {
        /// Translog file (active or .recovering)
        #[arg(long)]
        path: PathBuf,
    },

    /// Print operation counts, seq_no range and tail state
    Stats {
        /// Translog file (active or .recovering)
        #[arg(long)]
        path: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
