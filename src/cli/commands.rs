//! CLI command implementations

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::ShardConfig;
use crate::observability::{init_logging, LoggingOptions};
use crate::recovery::{InMemoryEngine, RecoveryCoordinator, RecoveryOptions};
use crate::seqno::{SeqNo, NO_OPS_PERFORMED};
use crate::shard::{IndexShardState, ShardLifecycle};
use crate::store::FsSegmentStore;
use crate::translog::{OpType, Translog, TranslogReader, TranslogSyncScheduler};

use super::args::{Cli, Command, LogFormat, TranslogAction};
use super::errors::{CliError, CliResult};
use super::io::{write_json_line, write_response};

/// Parse arguments, set up logging and run the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(&LoggingOptions {
        filter: cli.log_filter.clone(),
        json: cli.log_format == LogFormat::Json,
    })
    .map_err(CliError::Logging)?;
    run_command(cli.command)
}

pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Recover {
            config,
            expect_data,
        } => {
            let config = ShardConfig::load(&config)?;
            let summary = recover(&config, expect_data)?;
            write_response(summary)
        }
        Command::Translog { action } => match action {
            TranslogAction::Dump { path } => {
                let mut stdout = io::stdout().lock();
                dump(&path, &mut stdout)?;
                stdout.flush()?;
                Ok(())
            }
            TranslogAction::Stats { path } => {
                let stats = stats(&path)?;
                write_response(serde_json::to_value(stats)?)
            }
        },
    }
}

/// Recover the configured shard into an in-memory engine.
///
/// With a non-zero sync interval the translog is fsynced by a background
/// task for the duration of the recovery. Returns the recovery state plus
/// the number of live documents.
pub fn recover(config: &ShardConfig, expect_data: bool) -> CliResult<serde_json::Value> {
    let shard_id = config.shard_id();
    let lifecycle = Arc::new(ShardLifecycle::new(shard_id.clone()));
    let store = Arc::new(FsSegmentStore::open(config.store_path())?);
    let translog = Arc::new(Translog::open(
        config.translog_paths(),
        config.translog_sync_interval().is_none(),
    )?);

    let coordinator = RecoveryCoordinator::new(
        Arc::clone(&lifecycle),
        store.clone(),
        Arc::clone(&translog),
    )
    .with_options(RecoveryOptions::from(config));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let scheduler = config.translog_sync_interval().map(|interval| {
        let _guard = runtime.enter();
        TranslogSyncScheduler::start(Arc::clone(&translog), Arc::clone(&lifecycle), interval)
    });

    let mut engine = InMemoryEngine::new();
    let result = coordinator.recover(&mut engine, expect_data);
    if let Some(scheduler) = scheduler {
        let syncs = runtime.block_on(scheduler.cancel());
        debug!(shard = %shard_id, syncs, "stopped translog sync");
    }
    let state = match result {
        Ok(state) => state,
        Err(e) => {
            lifecycle.close();
            return Err(e.into());
        }
    };
    lifecycle.transition(IndexShardState::Started);
    info!(shard = %shard_id, documents = engine.document_count(), "shard started");

    translog.close()?;
    lifecycle.close();
    store.close();

    Ok(serde_json::json!({
        "recovery": state.to_json(),
        "documents": engine.document_count(),
    }))
}

/// Write every operation of a translog file as one JSON line
pub fn dump<W: Write>(path: &Path, out: &mut W) -> CliResult<u64> {
    let mut reader = TranslogReader::open(path)?;
    let mut count = 0;
    while let Some(op) = reader.next_operation()? {
        write_json_line(out, &op)?;
        count += 1;
    }
    Ok(count)
}

/// Summary of one translog file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslogStats {
    pub path: String,
    pub format_version: Option<u32>,
    pub translog_uuid: Option<String>,
    pub operations: u64,
    pub index_operations: u64,
    pub delete_operations: u64,
    pub min_seq_no: SeqNo,
    pub max_seq_no: SeqNo,
    pub valid_bytes: u64,
    /// Offset of a partially written tail record
    pub truncated_at: Option<u64>,
}

pub fn stats(path: &Path) -> CliResult<TranslogStats> {
    let mut reader = TranslogReader::open(path)?;
    let mut stats = TranslogStats {
        path: path.display().to_string(),
        format_version: reader.header().map(|h| h.format_version),
        translog_uuid: reader.header().map(|h| h.translog_uuid.to_string()),
        operations: 0,
        index_operations: 0,
        delete_operations: 0,
        min_seq_no: NO_OPS_PERFORMED,
        max_seq_no: NO_OPS_PERFORMED,
        valid_bytes: 0,
        truncated_at: None,
    };

    while let Some(op) = reader.next_operation()? {
        if stats.operations == 0 {
            stats.min_seq_no = op.seq_no();
        }
        stats.operations += 1;
        stats.max_seq_no = op.seq_no();
        match op.op_type() {
            OpType::Index => stats.index_operations += 1,
            OpType::Delete => stats.delete_operations += 1,
        }
    }
    stats.valid_bytes = reader.offset();
    stats.truncated_at = reader.truncated_at();
    Ok(stats)
}
