//! Error types for concord-source.

use std::path::PathBuf;

use thiserror::Error;

use concord_core::error::ReconcileError;

/// All errors that can arise while resolving and reading the shared source
/// filesystem.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The sidecar has not finished materializing this path yet.
    #[error("source not ready at {path}")]
    NotReady { path: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured sync directory does not exist in the checkout.
    #[error("sync directory {path} missing from source")]
    MissingSyncDir { path: PathBuf },

    /// Hydrated output or the done-marker exists but cannot be used.
    #[error("hydrated output unusable at {path}: {message}")]
    Hydration { path: PathBuf, message: String },
}

impl SourceError {
    /// Transient errors self-heal on a later tick and are never published.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::NotReady { .. })
    }

    /// Fold into the driver's error classification.
    pub fn into_reconcile_error(self) -> ReconcileError {
        let message = self.to_string();
        match self {
            SourceError::NotReady { .. } => ReconcileError::Transient(message),
            SourceError::Hydration { .. } => ReconcileError::Hydration(message),
            SourceError::Io { .. } | SourceError::MissingSyncDir { .. } => {
                ReconcileError::Source(message)
            }
        }
    }
}

/// Convenience constructor for [`SourceError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}
