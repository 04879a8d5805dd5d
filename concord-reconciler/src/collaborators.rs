//! Capability seams between the driver and its external collaborators.
//!
//! The driver never talks to the API server, parses configuration formats,
//! or performs hydration itself; it orchestrates implementations of these
//! traits. Injecting in-memory fakes here is the basis of the test suite.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use thiserror::Error;

use concord_core::error::{ConflictError, Errors};
use concord_core::status::{RenderingStatus, SourceStatus, SyncStatus};
use concord_core::types::{DeclaredObject, SourceSnapshot};

use crate::state::SourceCache;

/// Transport failure while writing to a control object.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PublishError(pub String);

/// Converts the declared files of a snapshot into declared objects.
#[async_trait]
pub trait SourceParser: Send + Sync {
    async fn parse_source(&self, source: &SourceSnapshot) -> (Vec<DeclaredObject>, Errors);
}

/// Pushes declared objects to the cluster.
///
/// `syncing` and `sync_errors` must be safe to call while `apply` is in
/// flight: the periodic status publisher reads them concurrently to report
/// progress.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, cache: &SourceCache) -> Errors;
    fn syncing(&self) -> bool;
    fn sync_errors(&self) -> Errors;
}

/// Signals from the remediator and its watches, polled on the retry timer.
pub trait SyncSignals: Send + Sync {
    fn need_to_update_watch(&self) -> bool;
    fn management_conflict(&self) -> bool;
}

/// Writes the three status sub-resources on the RSync control object.
///
/// Implementations are expected to be idempotent; the driver already
/// suppresses writes whose value matches the last successfully published
/// one.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn set_rendering_status(
        &self,
        prev: &RenderingStatus,
        new: &RenderingStatus,
    ) -> Result<(), PublishError>;

    async fn set_source_status(&self, new: &SourceStatus) -> Result<(), PublishError>;

    async fn set_sync_status(&self, new: &SyncStatus) -> Result<(), PublishError>;
}

/// Write path to another RootSync's remediator-errors status field.
#[async_trait]
pub trait RootSyncClient: Send + Sync {
    async fn prepend_remediator_errors(
        &self,
        root_sync: &str,
        errs: &[ConflictError],
        denominator: NonZeroUsize,
    ) -> Result<(), PublishError>;
}
