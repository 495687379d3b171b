//! Claiming a translog generation for replay
//!
//! Before replay, the active file `translog-<g>` is renamed to
//! `translog-<g>.recovering`. The rename is guarded by an advisory lock file
//! (`translog-<g>.recovering.lock`, hard-linked into place so that creation
//! fails if it exists), so at most one recovery holds a generation at a time
//! even on filesystems where rename atomicity is weaker than POSIX promises.
//!
//! Outcomes:
//! - replay succeeded: `complete()` deletes the `.recovering` file
//! - replay failed: `retain()` keeps it for diagnosis; the next attempt
//!   resumes from it
//!
//! The lock file is removed when the handle is dropped.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{TranslogError, TranslogResult};
use super::format::{claim_lock_file_name, recovering_file_name, translog_file_name};
use super::reader::TranslogReader;
use super::writer::{fsync_dir, Translog};

/// Scoped claim on one translog generation.
#[derive(Debug)]
pub struct RecoveringHandle {
    generation: u64,
    path: PathBuf,
    lock_path: PathBuf,
    resumed: bool,
}

impl RecoveringHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Path of the `.recovering` file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if this claim picked up a file retained by an earlier failed replay
    pub fn was_resumed(&self) -> bool {
        self.resumed
    }

    pub fn open_reader(&self) -> TranslogResult<TranslogReader> {
        TranslogReader::open(&self.path)
    }

    /// Replay succeeded: delete the `.recovering` file and release the claim.
    pub fn complete(self) -> TranslogResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(TranslogError::io(
                    &self.path,
                    "failed to delete recovering translog",
                    e,
                ))
            }
        }
        if let Some(dir) = self.path.parent() {
            fsync_dir(dir)?;
        }
        debug!(path = %self.path.display(), "deleted recovering translog");
        Ok(())
    }

    /// Replay failed: keep the `.recovering` file and release the claim.
    pub fn retain(self) {
        warn!(
            path = %self.path.display(),
            generation = self.generation,
            "retaining recovering translog after failed replay"
        );
    }
}

impl Drop for RecoveringHandle {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(lock = %self.lock_path.display(), error = %e, "failed to release translog claim lock");
            }
        }
    }
}

/// Exclusive creation of the lock file; fails if another claimant holds it.
///
/// The lock is written in full to a private temp file and then hard-linked
/// to its final name, so a lock is never visible half written. It records
/// the owning process id. A lock whose owner no longer exists, or that names
/// no owner at all, is broken once and the claim retried.
fn acquire_claim_lock(lock_path: &Path, generation: u64) -> TranslogResult<()> {
    let claim = Uuid::new_v4();
    let temp_path = lock_path.with_file_name(format!(
        "{}.{}.tmp",
        lock_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        claim.simple()
    ));
    write_lock_contents(&temp_path, claim)?;

    let result = publish_claim_lock(&temp_path, lock_path, generation);
    if let Err(e) = fs::remove_file(&temp_path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %temp_path.display(), error = %e, "failed to remove claim lock temp file");
        }
    }
    result
}

fn write_lock_contents(temp_path: &Path, claim: Uuid) -> TranslogResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .map_err(|e| TranslogError::io(temp_path, "failed to create claim lock temp file", e))?;
    writeln!(file, "pid {}", std::process::id())
        .and_then(|_| writeln!(file, "claim {}", claim))
        .and_then(|_| file.sync_all())
        .map_err(|e| TranslogError::io(temp_path, "failed to write claim lock", e))
}

fn publish_claim_lock(temp_path: &Path, lock_path: &Path, generation: u64) -> TranslogResult<()> {
    let mut broke_stale = false;
    loop {
        match fs::hard_link(temp_path, lock_path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !broke_stale && lock_owner_is_gone(lock_path) {
                    warn!(lock = %lock_path.display(), "breaking stale claim lock");
                    release_claim_lock(lock_path);
                    broke_stale = true;
                    continue;
                }
                return Err(TranslogError::AlreadyClaimed {
                    generation,
                    path: lock_path.to_path_buf(),
                });
            }
            Err(e) => return Err(TranslogError::io(lock_path, "failed to create claim lock", e)),
        }
    }
}

/// A lock naming no parsable owner is stale: complete locks always carry
/// one. Liveness of a named owner is only checked where `/proc` exists.
fn lock_owner_is_gone(lock_path: &Path) -> bool {
    let contents = match fs::read_to_string(lock_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
        Err(e) => {
            debug!(lock = %lock_path.display(), error = %e, "unreadable claim lock");
            return false;
        }
    };
    let Some(pid) = contents
        .lines()
        .find_map(|line| line.strip_prefix("pid "))
        .and_then(|pid| pid.trim().parse::<u32>().ok())
    else {
        return true;
    };
    if pid == std::process::id() || !Path::new("/proc/self").exists() {
        return false;
    }
    !Path::new("/proc").join(pid.to_string()).exists()
}

fn release_claim_lock(lock_path: &Path) {
    if let Err(e) = fs::remove_file(lock_path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(lock = %lock_path.display(), error = %e, "failed to remove claim lock");
        }
    }
}

impl Translog {
    /// Claim `generation` for replay.
    ///
    /// Locations are searched in order. In each, a retained `.recovering`
    /// file is resumed; otherwise the active file is renamed with up to
    /// `rename_retries` attempts.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(handle))` when a file was claimed
    /// - `Ok(None)` when no location holds the generation
    ///
    /// # Errors
    ///
    /// - `AlreadyClaimed` if another recovery holds the claim, or the active
    ///   file vanished while renaming
    /// - `Io` if every rename attempt failed
    pub fn mark_recovering(
        &self,
        generation: u64,
        rename_retries: u32,
    ) -> TranslogResult<Option<RecoveringHandle>> {
        for location in self.locations() {
            let recovering = location.join(recovering_file_name(generation));
            let active = location.join(translog_file_name(generation));
            if !recovering.exists() && !active.exists() {
                continue;
            }

            let lock_path = location.join(claim_lock_file_name(generation));
            acquire_claim_lock(&lock_path, generation)?;

            if recovering.exists() {
                if active.exists() {
                    // copy re-appended by the failed attempt, superseded by the recovering file
                    debug!(path = %active.display(), "removing stale active translog before resume");
                    if let Err(e) = fs::remove_file(&active) {
                        release_claim_lock(&lock_path);
                        return Err(TranslogError::io(&active, "failed to remove stale translog", e));
                    }
                }
                debug!(path = %recovering.display(), "resuming retained recovering translog");
                return Ok(Some(RecoveringHandle {
                    generation,
                    path: recovering,
                    lock_path,
                    resumed: true,
                }));
            }

            let mut last_error = None;
            for attempt in 1..=rename_retries.max(1) {
                match fs::rename(&active, &recovering) {
                    Ok(()) => {
                        if let Err(e) = fsync_dir(location) {
                            release_claim_lock(&lock_path);
                            return Err(e);
                        }
                        debug!(
                            from = %active.display(),
                            to = %recovering.display(),
                            attempt,
                            "claimed translog for replay"
                        );
                        return Ok(Some(RecoveringHandle {
                            generation,
                            path: recovering,
                            lock_path,
                            resumed: false,
                        }));
                    }
                    Err(e) => {
                        debug!(path = %active.display(), attempt, error = %e, "failed to rename translog for recovery");
                        if !active.exists() {
                            release_claim_lock(&lock_path);
                            return Err(TranslogError::AlreadyClaimed {
                                generation,
                                path: recovering,
                            });
                        }
                        last_error = Some(e);
                    }
                }
            }

            release_claim_lock(&lock_path);
            let source = last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "rename not attempted"));
            return Err(TranslogError::io(
                &active,
                format!("failed to rename translog after {} attempts", rename_retries),
                source,
            ));
        }
        Ok(None)
    }
}
