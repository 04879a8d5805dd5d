//! Classified reconciliation errors.
//!
//! This is a classification, not a type hierarchy: every error the driver
//! handles falls into one of the variants below, and the class decides where
//! the error is published (rendering, source, or sync status) and whether it
//! stops the rest of a pass. Nothing above the driver observes these errors;
//! they surface only on the RSync status and in logs.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Manager;

/// A sync error reporting that another manager claims the same live object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictError {
    pub manager: Manager,
    pub message: String,
}

impl ConflictError {
    pub fn new(manager: Manager, message: impl Into<String>) -> Self {
        Self {
            manager,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "management conflict with {}: {}",
            self.manager, self.message
        )
    }
}

/// One classified reconciliation error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ReconcileError {
    /// Retryable without user action; never published to the RSync status.
    #[error("transient: {0}")]
    Transient(String),

    /// Rendering failed or the hydrated output is unreadable.
    #[error("rendering: {0}")]
    Hydration(String),

    /// Source fetch or file enumeration problem.
    #[error("source: {0}")]
    Source(String),

    /// Parse problem; `blocking` decides whether apply may still proceed on
    /// the best-effort subset.
    #[error("parse: {message}")]
    Parse { message: String, blocking: bool },

    /// Returned by the applier.
    #[error("sync: {0}")]
    Sync(String),

    /// A sync error that additionally routes to the conflicting manager's
    /// RootSync.
    #[error("{0}")]
    ManagementConflict(ConflictError),

    /// Failure to write a status sub-resource.
    #[error("status publish: {0}")]
    StatusPublish(String),
}

impl ReconcileError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcileError::Transient(_))
    }

    /// Whether this error must stop a pass before apply runs.
    pub fn is_blocking(&self) -> bool {
        match self {
            ReconcileError::Transient(_)
            | ReconcileError::Hydration(_)
            | ReconcileError::Source(_)
            | ReconcileError::StatusPublish(_) => true,
            ReconcileError::Parse { blocking, .. } => *blocking,
            ReconcileError::Sync(_) | ReconcileError::ManagementConflict(_) => false,
        }
    }
}

/// Ordered collection of classified errors accumulated across the stages of
/// a pass. Status suppression compares collections by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Errors(Vec<ReconcileError>);

impl Errors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, err: ReconcileError) {
        self.0.push(err);
    }

    pub fn merge(&mut self, other: Errors) {
        self.0.extend(other.0);
    }

    /// Append-and-return composition for the places a pass folds stage
    /// errors together.
    pub fn join(mut self, other: Errors) -> Errors {
        self.merge(other);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReconcileError> {
        self.0.iter()
    }

    pub fn has_transient(&self) -> bool {
        self.0.iter().any(ReconcileError::is_transient)
    }

    pub fn has_blocking(&self) -> bool {
        self.0.iter().any(ReconcileError::is_blocking)
    }

    /// Extract the management conflicts for routing to other RootSyncs.
    pub fn conflicts(&self) -> Vec<ConflictError> {
        self.0
            .iter()
            .filter_map(|err| match err {
                ReconcileError::ManagementConflict(conflict) => Some(conflict.clone()),
                _ => None,
            })
            .collect()
    }
}

impl From<ReconcileError> for Errors {
    fn from(err: ReconcileError) -> Self {
        Self(vec![err])
    }
}

impl FromIterator<ReconcileError> for Errors {
    fn from_iter<I: IntoIterator<Item = ReconcileError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no errors");
        }
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            err.fmt(f)?;
        }
        Ok(())
    }
}
