//! Status posting with value-equality suppression, and the periodic
//! sync-status publisher that runs for the duration of an apply.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, Mutex};
use tokio::time::{self, Duration, Instant};

use concord_core::error::ReconcileError;
use concord_core::status::{RenderingStatus, SourceStatus, SyncStatus};
use concord_core::types::Commit;

use crate::collaborators::{Applier, StatusPublisher};

/// The last successfully published value of each status sub-resource.
///
/// A sub-status is rewritten when its value changed, or when its
/// `last_update` has fallen behind a sibling written later in the same pass;
/// the `Syncing` condition is derived from all three, so none of them may go
/// stale relative to the others.
#[derive(Debug, Clone, Default)]
pub struct PublishedStatuses {
    pub rendering: RenderingStatus,
    pub source: SourceStatus,
    pub sync: SyncStatus,
    /// When the most recently written sub-status went out.
    pub syncing_condition_last_update: Option<DateTime<Utc>>,
}

impl PublishedStatuses {
    fn needs_rendering(&self, new: &RenderingStatus) -> bool {
        self.rendering.last_update.is_none() || !new.same_as(&self.rendering)
    }

    fn needs_source(&self, new: &SourceStatus) -> bool {
        self.source.last_update.is_none()
            || self.source.last_update < self.rendering.last_update
            || !new.same_as(&self.source)
    }

    fn needs_sync(&self, new: &SyncStatus) -> bool {
        self.sync.last_update.is_none()
            || self.sync.last_update < self.rendering.last_update
            || self.sync.last_update < self.source.last_update
            || !new.same_as(&self.sync)
    }

    /// The periodic status trigger only fires when all three sub-statuses
    /// describe the same commit; a `Syncing` condition from an older commit
    /// must never overwrite a newer one.
    pub fn commits_aligned(&self) -> bool {
        self.sync.commit == self.source.commit && self.sync.commit == self.rendering.commit
    }
}

/// Serializes status writes and tracks the last published values.
///
/// Shared by the driver and the periodic publisher. The mutex gives
/// at-most-one in-flight write per sub-status and makes the bookkeeping
/// update atomic with the write that produced it: on transport failure the
/// published value is not advanced, so the next pass retries with current
/// values.
pub struct StatusPoster {
    publisher: Arc<dyn StatusPublisher>,
    published: Mutex<PublishedStatuses>,
}

impl StatusPoster {
    pub fn new(publisher: Arc<dyn StatusPublisher>) -> Self {
        Self {
            publisher,
            published: Mutex::new(PublishedStatuses::default()),
        }
    }

    pub async fn snapshot(&self) -> PublishedStatuses {
        self.published.lock().await.clone()
    }

    pub async fn commits_aligned(&self) -> bool {
        self.published.lock().await.commits_aligned()
    }

    /// Publish a rendering status unless it matches the last published
    /// value. Returns whether a write happened.
    pub async fn set_rendering(&self, mut new: RenderingStatus) -> Result<bool, ReconcileError> {
        let mut published = self.published.lock().await;
        if !published.needs_rendering(&new) {
            return Ok(false);
        }
        new.last_update = Some(Utc::now());
        tracing::debug!(
            commit = new.commit.as_ref().map(|c| c.0.as_str()).unwrap_or(""),
            outcome = ?new.outcome,
            "updating rendering status",
        );
        self.publisher
            .set_rendering_status(&published.rendering, &new)
            .await
            .map_err(|err| ReconcileError::StatusPublish(err.to_string()))?;
        published.syncing_condition_last_update = new.last_update;
        published.rendering = new;
        Ok(true)
    }

    pub async fn set_source(&self, mut new: SourceStatus) -> Result<bool, ReconcileError> {
        let mut published = self.published.lock().await;
        if !published.needs_source(&new) {
            return Ok(false);
        }
        new.last_update = Some(Utc::now());
        tracing::debug!(
            commit = new.commit.as_ref().map(|c| c.0.as_str()).unwrap_or(""),
            error = %new.errs,
            "updating source status",
        );
        self.publisher
            .set_source_status(&new)
            .await
            .map_err(|err| ReconcileError::StatusPublish(err.to_string()))?;
        published.syncing_condition_last_update = new.last_update;
        published.source = new;
        Ok(true)
    }

    pub async fn set_sync(&self, mut new: SyncStatus) -> Result<bool, ReconcileError> {
        let mut published = self.published.lock().await;
        if !published.needs_sync(&new) {
            return Ok(false);
        }
        new.last_update = Some(Utc::now());
        tracing::debug!(
            commit = new.commit.as_ref().map(|c| c.0.as_str()).unwrap_or(""),
            syncing = new.syncing,
            "updating sync status",
        );
        self.publisher
            .set_sync_status(&new)
            .await
            .map_err(|err| ReconcileError::StatusPublish(err.to_string()))?;
        published.syncing_condition_last_update = new.last_update;
        published.sync = new;
        Ok(true)
    }
}

/// Publish `syncing=true` refreshes at `period` until cancelled, so users
/// stay informed while a long apply runs.
///
/// Runs joined with the apply future on the driver task; the driver signals
/// `cancelled` when apply finishes and only writes its final status after
/// this future has returned.
pub(crate) async fn publish_sync_status_periodically(
    poster: &StatusPoster,
    applier: &dyn Applier,
    commit: Option<Commit>,
    period: Duration,
    mut cancelled: oneshot::Receiver<()>,
) {
    tracing::debug!("periodic sync status updates starting");
    let mut timer = Box::pin(time::sleep(period));
    loop {
        tokio::select! {
            _ = &mut cancelled => {
                tracing::debug!("periodic sync status updates stopped");
                return;
            }
            _ = timer.as_mut() => {
                let status = SyncStatus {
                    commit: commit.clone(),
                    syncing: true,
                    errs: applier.sync_errors(),
                    last_update: None,
                };
                if let Err(err) = poster.set_sync(status).await {
                    tracing::warn!(error = %err, "failed to update sync status");
                }
                timer.as_mut().reset(Instant::now() + period);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use concord_core::error::Errors;

    use crate::collaborators::PublishError;
    use crate::state::SourceCache;

    #[derive(Default)]
    struct CountingPublisher {
        rendering: AtomicUsize,
        source: AtomicUsize,
        sync: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl StatusPublisher for CountingPublisher {
        async fn set_rendering_status(
            &self,
            _prev: &RenderingStatus,
            _new: &RenderingStatus,
        ) -> Result<(), PublishError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PublishError("unavailable".into()));
            }
            self.rendering.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_source_status(&self, _new: &SourceStatus) -> Result<(), PublishError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PublishError("unavailable".into()));
            }
            self.source.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_sync_status(&self, _new: &SyncStatus) -> Result<(), PublishError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PublishError("unavailable".into()));
            }
            self.sync.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct IdleApplier;

    #[async_trait]
    impl Applier for IdleApplier {
        async fn apply(&self, _cache: &SourceCache) -> Errors {
            Errors::default()
        }

        fn syncing(&self) -> bool {
            false
        }

        fn sync_errors(&self) -> Errors {
            Errors::default()
        }
    }

    fn sync_status(commit: &str, syncing: bool) -> SyncStatus {
        SyncStatus {
            commit: Some(Commit::from(commit)),
            syncing,
            errs: Errors::default(),
            last_update: None,
        }
    }

    #[tokio::test]
    async fn equal_value_is_suppressed() {
        let publisher = Arc::new(CountingPublisher::default());
        let poster = StatusPoster::new(publisher.clone());

        assert!(poster.set_sync(sync_status("c1", false)).await.expect("set"));
        assert!(!poster.set_sync(sync_status("c1", false)).await.expect("set"));
        assert_eq!(publisher.sync.load(Ordering::SeqCst), 1);

        // The syncing flag is part of the value.
        assert!(poster.set_sync(sync_status("c1", true)).await.expect("set"));
        assert_eq!(publisher.sync.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_write_does_not_advance_bookkeeping() {
        let publisher = Arc::new(CountingPublisher::default());
        let poster = StatusPoster::new(publisher.clone());

        publisher.fail.store(true, Ordering::SeqCst);
        let err = poster
            .set_sync(sync_status("c1", false))
            .await
            .expect_err("write should fail");
        assert!(matches!(err, ReconcileError::StatusPublish(_)));
        assert!(poster.snapshot().await.sync.last_update.is_none());

        // The next attempt with the same value goes through.
        publisher.fail.store(false, Ordering::SeqCst);
        assert!(poster.set_sync(sync_status("c1", false)).await.expect("set"));
        assert_eq!(publisher.sync.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_sync_status_is_rewritten_after_sibling_updates() {
        let publisher = Arc::new(CountingPublisher::default());
        let poster = StatusPoster::new(publisher.clone());

        poster.set_sync(sync_status("c1", false)).await.expect("sync");
        poster
            .set_source(SourceStatus {
                commit: Some(Commit::from("c1")),
                errs: Errors::default(),
                last_update: None,
            })
            .await
            .expect("source");

        // Value unchanged, but the sync status is now older than the source
        // status, so the Syncing condition needs a refresh.
        assert!(poster.set_sync(sync_status("c1", false)).await.expect("set"));
        assert_eq!(publisher.sync.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn commits_aligned_requires_all_three() {
        let poster = StatusPoster::new(Arc::new(CountingPublisher::default()));
        poster
            .set_rendering(RenderingStatus {
                commit: Some(Commit::from("c1")),
                outcome: None,
                errs: Errors::default(),
                last_update: None,
            })
            .await
            .expect("rendering");
        poster
            .set_source(SourceStatus {
                commit: Some(Commit::from("c1")),
                errs: Errors::default(),
                last_update: None,
            })
            .await
            .expect("source");
        poster.set_sync(sync_status("c2", false)).await.expect("sync");
        assert!(!poster.commits_aligned().await);

        poster.set_sync(sync_status("c1", false)).await.expect("sync");
        assert!(poster.commits_aligned().await);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_publisher_ticks_then_stops_on_cancel() {
        let publisher = Arc::new(CountingPublisher::default());
        let poster = StatusPoster::new(publisher.clone());
        let applier = IdleApplier;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let period = Duration::from_secs(5);
        let task = publish_sync_status_periodically(
            &poster,
            &applier,
            Some(Commit::from("c1")),
            period,
            cancel_rx,
        );

        let driver = async {
            // Two ticks' worth of virtual time, then cancel.
            time::sleep(Duration::from_secs(11)).await;
            let _ = cancel_tx.send(());
        };
        tokio::join!(task, driver);

        // First tick writes syncing=true; the second is value-equal and
        // suppressed.
        assert_eq!(publisher.sync.load(Ordering::SeqCst), 1);
        assert!(poster.snapshot().await.sync.syncing);
    }
}
