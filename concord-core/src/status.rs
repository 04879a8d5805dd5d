//! Control-surface status records published on the RSync object.
//!
//! Each record carries a `last_update` timestamp that is bookkeeping, not
//! value: the `same_as` equivalence used for write suppression ignores it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Errors;
use crate::types::Commit;

/// Outcome of the rendering phase for a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderingOutcome {
    InProgress,
    Succeeded,
    Failed,
    Skipped,
}

impl RenderingOutcome {
    /// User-facing message recorded on the RSync rendering status.
    pub fn message(self) -> &'static str {
        match self {
            RenderingOutcome::InProgress => "Rendering is still in progress",
            RenderingOutcome::Succeeded => "Rendering succeeded",
            RenderingOutcome::Failed => "Rendering failed",
            RenderingOutcome::Skipped => "Rendering skipped",
        }
    }
}

/// `.status.rendering`: whether hydrated output is available for a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingStatus {
    pub commit: Option<Commit>,
    pub outcome: Option<RenderingOutcome>,
    pub errs: Errors,
    pub last_update: Option<DateTime<Utc>>,
}

impl RenderingStatus {
    pub fn same_as(&self, other: &Self) -> bool {
        self.commit == other.commit && self.outcome == other.outcome && self.errs == other.errs
    }
}

/// `.status.source`: the commit most recently read and parsed, with the
/// errors that reading or parsing it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub commit: Option<Commit>,
    pub errs: Errors,
    pub last_update: Option<DateTime<Utc>>,
}

impl SourceStatus {
    pub fn same_as(&self, other: &Self) -> bool {
        self.commit == other.commit && self.errs == other.errs
    }
}

/// `.status.sync`: the commit most recently applied, with the in-flight flag
/// backing the `Syncing` condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub commit: Option<Commit>,
    pub syncing: bool,
    pub errs: Errors,
    pub last_update: Option<DateTime<Utc>>,
}

impl SyncStatus {
    pub fn same_as(&self, other: &Self) -> bool {
        self.commit == other.commit && self.syncing == other.syncing && self.errs == other.errs
    }
}
