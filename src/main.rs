//! shardgate CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`; errors go to stderr
//! and the process exits non-zero.

use shardgate::cli;

fn main() {
    if let Err(e) = cli::run() {
        let _ = cli::write_error(e.code(), &e.to_string());
        eprintln!("{}: {}", e.code(), e);
        std::process::exit(1);
    }
}
