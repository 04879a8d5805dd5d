//! Concord core library — domain types, status records, classified errors.
//!
//! Public API surface:
//! - [`types`] — commits, manager identity, snapshots, declared objects
//! - [`status`] — the three RSync status sub-resources
//! - [`error`] — [`ReconcileError`] classification and the [`Errors`] multi-error

pub mod error;
pub mod status;
pub mod types;

pub use error::{ConflictError, Errors, ReconcileError};
pub use status::{RenderingOutcome, RenderingStatus, SourceStatus, SyncStatus};
pub use types::{
    Commit, DeclaredObject, Manager, ManagerScope, ParserResult, SourceSnapshot, SourceType,
};
