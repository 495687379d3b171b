//! CLI error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::recovery::RecoveryError;
use crate::store::StoreError;
use crate::translog::TranslogError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Translog(#[from] TranslogError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(e) => e.code(),
            CliError::Store(e) => e.code(),
            CliError::Translog(e) => e.code(),
            CliError::Recovery(e) => e.code(),
            CliError::Io(_) => "SHARD_CLI_IO_ERROR",
            CliError::Json(_) => "SHARD_CLI_JSON_ERROR",
            CliError::Logging(_) => "SHARD_CLI_LOGGING_ERROR",
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
