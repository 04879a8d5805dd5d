//! # concord-reconciler
//!
//! The parse–apply–watch reconciliation driver. A single driver task
//! repeatedly resolves the current source commit, gates on hydration,
//! reads and parses declared files, hands them to the applier, and
//! publishes rendering/source/sync status back to the RSync control object,
//! with scoped caching, capped-backoff retries, and conflict routing.
//!
//! Source fetching, hydration, parsing, and applying are external
//! collaborators behind the traits in [`collaborators`].

pub mod collaborators;
pub mod conflict;
pub mod options;
mod run;
pub mod state;
mod status;

pub use collaborators::{
    Applier, PublishError, RootSyncClient, SourceParser, StatusPublisher, SyncSignals,
};
pub use conflict::{prepend_conflict_errors, REMEDIATOR_ERROR_LIMIT};
pub use options::{Options, RetryBackoff};
pub use run::{Reconciler, Trigger};
pub use state::{ReconcilerState, SourceCache};
pub use status::{PublishedStatuses, StatusPoster};
