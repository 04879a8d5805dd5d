//! Reconciler configuration: identity, source layout, and cadence.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use concord_core::types::{ManagerScope, SourceType};
use concord_source::layout;

pub const DEFAULT_POLLING_PERIOD: Duration = Duration::from_secs(15);
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(1);
pub const DEFAULT_STATUS_UPDATE_PERIOD: Duration = Duration::from_secs(5);

/// Name of the sidecar-maintained symlink under `source/` and `hydrated/`.
pub const DEFAULT_LINK: &str = "rev";

/// Capped exponential backoff for error-driven retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub base: Duration,
    pub cap: Duration,
}

impl RetryBackoff {
    /// Delay before the next retry after `attempt` consecutive failures:
    /// `min(base * 2^(attempt - 1), cap)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exp).min(self.cap)
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(60),
        }
    }
}

/// Everything a reconciler needs to know about itself, its source, and its
/// cadence. Construct with [`Options::new`] and override fields as needed.
#[derive(Debug, Clone)]
pub struct Options {
    /// Name of this reconciler, used in logs and conflict identity.
    pub reconciler_name: String,
    /// Scope of this reconciler's RSync object.
    pub scope: ManagerScope,
    pub source_type: SourceType,
    pub repo_root: PathBuf,
    /// Symlink maintained by the sync sidecar (`<repo_root>/source/rev`).
    pub source_dir: PathBuf,
    pub hydrated_root: PathBuf,
    pub hydrated_link: String,
    /// Sync directory relative to the checkout root.
    pub sync_dir: PathBuf,
    /// Cadence of the re-import trigger.
    pub polling_period: Duration,
    /// Cadence of the forced full pass.
    pub resync_period: Duration,
    /// Cadence at which retry conditions are polled.
    pub retry_period: Duration,
    /// Cadence of periodic sync-status refreshes.
    pub status_update_period: Duration,
    pub retry_backoff: RetryBackoff,
    /// Divides the remediator-error capacity when reporting conflicts to
    /// another RootSync.
    pub conflict_error_denominator: NonZeroUsize,
}

impl Options {
    pub fn new(reconciler_name: impl Into<String>, repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        Self {
            reconciler_name: reconciler_name.into(),
            scope: ManagerScope::Root,
            source_type: SourceType::Git,
            source_dir: layout::source_link(&repo_root, DEFAULT_LINK),
            hydrated_root: layout::hydrated_root(&repo_root),
            hydrated_link: DEFAULT_LINK.to_string(),
            sync_dir: PathBuf::from("."),
            polling_period: DEFAULT_POLLING_PERIOD,
            resync_period: DEFAULT_RESYNC_PERIOD,
            retry_period: DEFAULT_RETRY_PERIOD,
            status_update_period: DEFAULT_STATUS_UPDATE_PERIOD,
            retry_backoff: RetryBackoff::default(),
            conflict_error_denominator: NonZeroUsize::MIN,
            repo_root,
        }
    }

    pub fn done_file(&self) -> PathBuf {
        layout::done_file(&self.repo_root)
    }
}
