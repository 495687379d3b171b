//! `shardgate` command line
//!
//! - recover: run local recovery for a configured shard
//! - translog dump: print the operations of a translog file
//! - translog stats: summarise a translog file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, LogFormat, TranslogAction};
pub use commands::{dump, recover, run, run_command, stats, TranslogStats};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_json_line, write_response};
