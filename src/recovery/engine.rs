//! Engine collaborator
//!
//! The engine applies replayed operations to the live index. Recovery only
//! needs three things from it: apply one operation, learn whether that
//! changed a dynamic mapping, and finalize once replay is over.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::translog::Operation;

/// Coarse classification of an apply failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStatus {
    /// The operation itself is unusable; replay skips it
    BadRequest,
    /// The engine failed; replay aborts
    Internal,
}

/// Failure to apply one operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The document source could not be parsed
    #[error("failed to parse document [{id}]: {reason}")]
    BadDocument { id: String, reason: String },

    /// The document conflicts with the existing mapping
    #[error("mapping conflict for document [{id}]: {reason}")]
    MappingConflict { id: String, reason: String },

    #[error("engine failure: {0}")]
    Engine(String),
}

impl ApplyError {
    pub fn status(&self) -> FailureStatus {
        match self {
            ApplyError::BadDocument { .. } | ApplyError::MappingConflict { .. } => {
                FailureStatus::BadRequest
            }
            ApplyError::Engine(_) => FailureStatus::Internal,
        }
    }

    /// Document-level failures are logged and skipped during replay
    pub fn is_skippable(&self) -> bool {
        self.status() == FailureStatus::BadRequest
    }
}

/// Side effects of applying one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Document type whose dynamic mapping changed
    pub mapping_update: Option<String>,
}

impl ApplyOutcome {
    pub fn mapping_changed(doc_type: impl Into<String>) -> Self {
        Self {
            mapping_update: Some(doc_type.into()),
        }
    }
}

/// Applies operations to the live index
pub trait Engine: Send {
    fn apply_operation(&mut self, op: &Operation) -> Result<ApplyOutcome, ApplyError>;

    /// Called once after the last replayed operation
    fn finalize_recovery(&mut self) -> Result<(), ApplyError> {
        Ok(())
    }
}

/// Document type reported for dynamic mapping changes
pub const DEFAULT_DOC_TYPE: &str = "_doc";

/// In-memory engine holding the latest source per document id.
///
/// Sources must be JSON objects. The first time a top-level field name is
/// seen, the operation reports a mapping update for `_doc`.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    documents: BTreeMap<String, String>,
    fields: BTreeSet<String>,
    applied: u64,
    finalized: bool,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, id: &str) -> Option<&str> {
        self.documents.get(id).map(String::as_str)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Operations applied successfully, deletes included
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Top-level field names seen so far
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

impl Engine for InMemoryEngine {
    fn apply_operation(&mut self, op: &Operation) -> Result<ApplyOutcome, ApplyError> {
        let outcome = match op {
            Operation::Index { id, source, .. } => {
                let parsed: serde_json::Value =
                    serde_json::from_str(source).map_err(|e| ApplyError::BadDocument {
                        id: id.clone(),
                        reason: e.to_string(),
                    })?;
                let object = parsed.as_object().ok_or_else(|| ApplyError::BadDocument {
                    id: id.clone(),
                    reason: "document source must be a JSON object".to_string(),
                })?;

                let mut changed = false;
                for field in object.keys() {
                    changed |= self.fields.insert(field.clone());
                }
                self.documents.insert(id.clone(), source.clone());
                if changed {
                    ApplyOutcome::mapping_changed(DEFAULT_DOC_TYPE)
                } else {
                    ApplyOutcome::default()
                }
            }
            Operation::Delete { id, .. } => {
                self.documents.remove(id);
                ApplyOutcome::default()
            }
        };
        self.applied += 1;
        Ok(outcome)
    }

    fn finalize_recovery(&mut self) -> Result<(), ApplyError> {
        self.finalized = true;
        Ok(())
    }
}
