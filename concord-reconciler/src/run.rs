//! The parse–apply–watch driver: trigger selection and the phase pipeline.
//!
//! One driver task owns the reconciler state and executes at most one pass
//! at a time. Four one-shot timers and the shutdown channel feed a biased
//! `select!`; timers are re-armed explicitly after each firing so that a
//! pass outliving its period never queues stale firings.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::time::{self, Instant};

use concord_core::error::{Errors, ReconcileError};
use concord_core::status::{RenderingOutcome, RenderingStatus, SourceStatus, SyncStatus};
use concord_core::types::{Commit, SourceSnapshot};
use concord_source::error::SourceError;
use concord_source::render::RenderDecision;
use concord_source::{files, reader, render};

use crate::collaborators::{Applier, RootSyncClient, SourceParser, StatusPublisher, SyncSignals};
use crate::conflict;
use crate::options::Options;
use crate::state::ReconcilerState;
use crate::status::{publish_sync_status_periodically, PublishedStatuses, StatusPoster};

/// Why a reconciliation pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Forced full pass on the resync timer.
    Resync,
    /// Re-import of declared resources on the poll timer.
    Reimport,
    /// Re-attempt after a failed pass.
    Retry,
    /// The remediator detected a fight over a managed object.
    ManagementConflict,
    /// Watches need to cover a changed set of resource types.
    WatchUpdate,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Resync => "resync",
            Trigger::Reimport => "reimport",
            Trigger::Retry => "retry",
            Trigger::ManagementConflict => "management-conflict",
            Trigger::WatchUpdate => "watch-update",
        }
    }
}

/// Park a fired one-shot timer without re-arming it; the next pass from
/// another trigger resets it to a real deadline.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
}

/// The reconciliation driver: wires the source plumbing to the collaborator
/// seams and runs the trigger loop.
pub struct Reconciler {
    opts: Options,
    parser: Arc<dyn SourceParser>,
    applier: Arc<dyn Applier>,
    signals: Arc<dyn SyncSignals>,
    root_syncs: Arc<dyn RootSyncClient>,
    poster: StatusPoster,
    state: ReconcilerState,
}

impl Reconciler {
    pub fn new(
        opts: Options,
        parser: Arc<dyn SourceParser>,
        applier: Arc<dyn Applier>,
        signals: Arc<dyn SyncSignals>,
        publisher: Arc<dyn StatusPublisher>,
        root_syncs: Arc<dyn RootSyncClient>,
    ) -> Self {
        Self {
            opts,
            parser,
            applier,
            signals,
            root_syncs,
            poster: StatusPoster::new(publisher),
            state: ReconcilerState::default(),
        }
    }

    /// Driver state inspection for embedding processes and tests.
    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    /// The last statuses the driver successfully published.
    pub async fn published(&self) -> PublishedStatuses {
        self.poster.snapshot().await
    }

    /// Run the reconciliation loop until `shutdown` fires (or its sender is
    /// dropped). Cancellation interrupts timer waits and drops an in-flight
    /// pass, which cancels the apply and the periodic publisher with it.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            reconciler = %self.opts.reconciler_name,
            source_type = %self.opts.source_type,
            "reconciliation driver starting",
        );

        let mut poll = Box::pin(time::sleep(self.opts.polling_period));
        let mut resync = Box::pin(time::sleep(self.opts.resync_period));
        let mut retry = Box::pin(time::sleep(self.opts.retry_period));
        let mut status_update = Box::pin(time::sleep(self.opts.status_update_period));

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!(reconciler = %self.opts.reconciler_name, "reconciliation driver stopping");
                    return;
                }

                // Checked before the poll timer: the resync resets the cache
                // so every stage of the pass runs, while the cached source
                // survives to avoid re-reading unchanged files.
                _ = resync.as_mut() => {
                    tracing::info!("it is time for a force-resync");
                    self.state.reset_all_but_source_state();
                    if self.pass_or_shutdown(Trigger::Resync, &mut shutdown).await {
                        return;
                    }
                    resync.as_mut().reset(Instant::now() + self.opts.resync_period);
                    retry.as_mut().reset(Instant::now() + self.opts.retry_period);
                    status_update.as_mut().reset(Instant::now() + self.opts.status_update_period);
                }

                _ = poll.as_mut() => {
                    if self.pass_or_shutdown(Trigger::Reimport, &mut shutdown).await {
                        return;
                    }
                    poll.as_mut().reset(Instant::now() + self.opts.polling_period);
                    retry.as_mut().reset(Instant::now() + self.opts.retry_period);
                    status_update.as_mut().reset(Instant::now() + self.opts.status_update_period);
                }

                _ = retry.as_mut() => {
                    let trigger = if self.signals.management_conflict() {
                        self.state.reset_all_but_source_state();
                        // Wait a full polling period before fighting over
                        // the object again.
                        time::sleep(self.opts.polling_period).await;
                        Some(Trigger::ManagementConflict)
                    } else if self.state.ready_to_retry(Instant::now()) {
                        tracing::info!("the last reconciliation failed");
                        Some(Trigger::Retry)
                    } else if self.signals.need_to_update_watch() {
                        tracing::info!("some watches need to be updated");
                        Some(Trigger::WatchUpdate)
                    } else {
                        None
                    };
                    match trigger {
                        Some(trigger) => {
                            if self.pass_or_shutdown(trigger, &mut shutdown).await {
                                return;
                            }
                            retry.as_mut().reset(Instant::now() + self.opts.retry_period);
                            status_update.as_mut().reset(Instant::now() + self.opts.status_update_period);
                        }
                        // Nothing to do: park the timer instead of spinning;
                        // the next pass re-arms it.
                        None => retry.as_mut().reset(far_future()),
                    }
                }

                _ = status_update.as_mut() => {
                    // Skip the periodic refresh while the published sync
                    // commit lags the others; a Syncing condition from an
                    // older commit must not overwrite a newer one.
                    if self.poster.commits_aligned().await {
                        tracing::debug!("updating sync status (periodic while not syncing)");
                        let result = self
                            .set_sync_status(self.applier.syncing(), self.applier.sync_errors())
                            .await;
                        if let Err(errs) = result {
                            tracing::warn!(error = %errs, "failed to update sync status");
                        }
                    }
                    status_update.as_mut().reset(Instant::now() + self.opts.status_update_period);
                }
            }
        }
    }

    /// Run one pass, racing it against shutdown. Returns true when the
    /// driver should exit.
    async fn pass_or_shutdown(
        &mut self,
        trigger: Trigger,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.recv() => true,
            _ = self.reconcile_once(trigger) => false,
        }
    }

    /// Execute one ordered reconciliation pass.
    pub async fn reconcile_once(&mut self, trigger: Trigger) {
        let started = Instant::now();
        tracing::debug!(trigger = trigger.as_str(), "reconciliation pass starting");

        let (commit, sync_dir) = match reader::source_commit_and_dir(
            self.opts.source_type,
            &self.opts.source_dir,
            &self.opts.sync_dir,
            &self.opts.reconciler_name,
        ) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.fail_resolve(err).await;
                return;
            }
        };

        // Check the done-marker before reading anything: parsing must not
        // start until hydration for this commit has finished.
        match render::done_commit(&self.opts.done_file()) {
            Ok(Some(done)) if done == commit => {}
            Ok(_) => {
                self.rendering_in_progress(commit).await;
                return;
            }
            Err(err) => {
                self.rendering_failed(commit, err).await;
                return;
            }
        }

        let old_sync_dir = self.state.cache.sync_dir().map(Path::to_path_buf);
        let snapshot = SourceSnapshot {
            commit,
            sync_dir,
            files: None,
        };
        let read_errs = self.read(trigger, snapshot).await;
        if !read_errs.is_empty() {
            self.state.invalidate(read_errs, &self.opts.retry_backoff);
            return;
        }

        // A plain re-import with no source change has nothing new to do: a
        // succeeded earlier pass needs no repeat, and a failed one is
        // re-attempted by the retry trigger on its own schedule. Running the
        // sequence here would make that schedule meaningless.
        let new_sync_dir = self.state.cache.sync_dir().map(Path::to_path_buf);
        if trigger == Trigger::Reimport && old_sync_dir == new_sync_dir {
            tracing::debug!(
                trigger = trigger.as_str(),
                duration_ms = started.elapsed().as_millis() as u64,
                "no source changes, skipping parse and apply",
            );
            return;
        }

        let errs = self.parse_and_apply(trigger).await;
        if !errs.is_empty() {
            self.state.invalidate(errs, &self.opts.retry_backoff);
            return;
        }

        // Checkpoint only after everything succeeded, status writes
        // included.
        self.state.checkpoint();
        tracing::debug!(
            trigger = trigger.as_str(),
            duration_ms = started.elapsed().as_millis() as u64,
            "reconciliation pass complete",
        );
    }

    /// The source commit could not be resolved; fail the pass early.
    async fn fail_resolve(&mut self, err: SourceError) {
        let err = err.into_reconcile_error();
        // A not-ready link is expected while the sidecar is still
        // materializing the checkout; observe it without publishing.
        if err.is_transient() {
            tracing::debug!(error = %err, "source not ready");
            self.state
                .invalidate(Errors::from(err), &self.opts.retry_backoff);
            return;
        }

        let mut errs = Errors::from(err);
        let status = SourceStatus {
            commit: None,
            errs: errs.clone(),
            last_update: None,
        };
        if let Err(publish_err) = self.poster.set_source(status).await {
            errs.push(publish_err);
        }
        self.state.invalidate(errs, &self.opts.retry_backoff);
    }

    /// Hydration has not finished for this commit; report and wait.
    async fn rendering_in_progress(&mut self, commit: Commit) {
        let status = RenderingStatus {
            commit: Some(commit.clone()),
            outcome: Some(RenderingOutcome::InProgress),
            errs: Errors::default(),
            last_update: None,
        };
        match self.poster.set_rendering(status).await {
            Ok(_) => {
                tracing::debug!(commit = %commit, "hydration in progress");
                // Nothing read for this commit is usable yet; the next poll
                // tick re-evaluates the marker from scratch.
                self.state.reset();
            }
            Err(err) => {
                self.state
                    .invalidate(Errors::from(err), &self.opts.retry_backoff);
            }
        }
    }

    /// The done-marker itself could not be read.
    async fn rendering_failed(&mut self, commit: Commit, err: SourceError) {
        let errs = Errors::from(err.into_reconcile_error());
        let status = RenderingStatus {
            commit: Some(commit),
            outcome: Some(RenderingOutcome::Failed),
            errs: errs.clone(),
            last_update: None,
        };
        let mut all = errs;
        if let Err(publish_err) = self.poster.set_rendering(status).await {
            all.push(publish_err);
        }
        self.state.invalidate(all, &self.opts.retry_backoff);
    }

    /// Read declared files from hydrated output when rendering is done, or
    /// from the raw source when rendering was skipped, and update the
    /// rendering and source statuses.
    async fn read(&mut self, trigger: Trigger, snapshot: SourceSnapshot) -> Errors {
        let started = Instant::now();
        let (rendering, source_status) = self.read_from_source(snapshot);
        tracing::debug!(
            trigger = trigger.as_str(),
            phase = "read",
            duration_ms = started.elapsed().as_millis() as u64,
            "source read finished",
        );

        // Transient errors self-heal on a later tick; retry without
        // surfacing them on the RSync status.
        if rendering.errs.has_transient() {
            return rendering.errs;
        }
        if source_status.errs.has_transient() {
            return source_status.errs;
        }

        // Rendering status goes out before source status for the same
        // commit: the parser only reads configs once rendering is settled.
        let mut rendering_errs = rendering.errs.clone();
        if let Err(err) = self.poster.set_rendering(rendering).await {
            rendering_errs.push(err);
        }
        if !rendering_errs.is_empty() {
            return rendering_errs;
        }

        if source_status.errs.is_empty() {
            return Errors::default();
        }

        // Source status is only written here when the read itself failed;
        // after a successful read, parse publishes it with the parse errors.
        let mut source_errs = source_status.errs.clone();
        if let Err(err) = self.poster.set_source(source_status).await {
            source_errs.push(err);
        }
        source_errs
    }

    /// Decide the authoritative sync directory (hydrated vs raw) and re-read
    /// the declared files when it changed.
    fn read_from_source(&mut self, mut snapshot: SourceSnapshot) -> (RenderingStatus, SourceStatus) {
        let mut rendering = RenderingStatus {
            commit: Some(snapshot.commit.clone()),
            outcome: None,
            errs: Errors::default(),
            last_update: None,
        };
        let mut source_status = SourceStatus {
            commit: Some(snapshot.commit.clone()),
            errs: Errors::default(),
            last_update: None,
        };

        match render::hydrated_sync_dir(
            &self.opts.hydrated_root,
            &self.opts.hydrated_link,
            &self.opts.sync_dir,
        ) {
            RenderDecision::Rendered { sync_dir } => {
                rendering.outcome = Some(RenderingOutcome::Succeeded);
                snapshot.sync_dir = sync_dir;
            }
            RenderDecision::SkippedRaw => {
                rendering.outcome = Some(RenderingOutcome::Skipped);
            }
            RenderDecision::Failed { message } => {
                rendering.outcome = Some(RenderingOutcome::Failed);
                rendering.errs.push(ReconcileError::Hydration(message));
                return (rendering, source_status);
            }
        }

        if self.state.cache.sync_dir() == Some(snapshot.sync_dir.as_path()) {
            return (rendering, source_status);
        }

        tracing::info!(
            sync_dir = %snapshot.sync_dir.display(),
            "new source changes detected, resetting the cache",
        );
        // Every stage of the pass must run against the new directory.
        self.state.reset_cache();

        match files::list_source_files(&snapshot.sync_dir) {
            Ok(list) => {
                snapshot.files = Some(list);
                self.state.cache.set_source(snapshot);
            }
            Err(err) => source_status.errs.push(err.into_reconcile_error()),
        }
        (rendering, source_status)
    }

    /// Parse the cached snapshot unless the cached result is current.
    async fn parse(&mut self, trigger: Trigger) -> Errors {
        if self.state.cache.parser_result_up_to_date() {
            return self
                .state
                .cache
                .parser_result()
                .map(|result| result.errs.clone())
                .unwrap_or_default();
        }

        let source = match self.state.cache.source() {
            Some(source) => source,
            None => return Errors::from(ReconcileError::Source("no cached source to parse".into())),
        };

        let started = Instant::now();
        let (objects, errs) = self.parser.parse_source(source).await;
        tracing::debug!(
            trigger = trigger.as_str(),
            phase = "parse",
            duration_ms = started.elapsed().as_millis() as u64,
            object_count = objects.len(),
            "parse finished",
        );
        self.state.cache.set_parser_result(objects, errs.clone());
        errs
    }

    /// Parse, publish the source status, then apply with the periodic
    /// sync-status publisher running alongside.
    async fn parse_and_apply(&mut self, trigger: Trigger) -> Errors {
        tracing::debug!("parser starting");
        let parse_errs = self.parse(trigger).await;
        tracing::debug!("parser stopped");

        let source_status = SourceStatus {
            commit: self.state.cache.commit().cloned(),
            errs: parse_errs.clone(),
            last_update: None,
        };
        if let Err(err) = self.poster.set_source(source_status).await {
            // Applying now could leave the published sync commit newer than
            // the published source commit; terminate the pass instead.
            return parse_errs.join(Errors::from(err));
        }

        if parse_errs.has_blocking() {
            return parse_errs;
        }

        let commit = self.state.cache.commit().cloned();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let applier = Arc::clone(&self.applier);
        let cache = &self.state.cache;
        let apply = async move {
            tracing::debug!("applier starting");
            let started = Instant::now();
            let errs = applier.apply(cache).await;
            tracing::debug!(
                phase = "apply",
                duration_ms = started.elapsed().as_millis() as u64,
                "applier stopped",
            );
            let _ = cancel_tx.send(());
            errs
        };
        let periodic = publish_sync_status_periodically(
            &self.poster,
            self.applier.as_ref(),
            commit,
            self.opts.status_update_period,
            cancel_rx,
        );
        // The periodic task observes cancellation before the join resolves,
        // so the final write below always happens after its last one.
        let (sync_errs, ()) = tokio::join!(apply, periodic);

        let mut sync_errs = sync_errs;
        tracing::debug!("updating sync status (after sync)");
        if let Err(errs) = self.set_sync_status(false, sync_errs.clone()).await {
            sync_errs.merge(errs);
        }
        parse_errs.join(sync_errs)
    }

    /// Publish `.status.sync` and route management conflicts to the RootSync
    /// managing the conflicting objects.
    async fn set_sync_status(&self, syncing: bool, sync_errs: Errors) -> Result<(), Errors> {
        let status = SyncStatus {
            commit: self.state.cache.commit().cloned(),
            syncing,
            errs: sync_errs.clone(),
            last_update: None,
        };
        if let Err(err) = self.poster.set_sync(status).await {
            return Err(Errors::from(err));
        }

        let conflicts = sync_errs.conflicts();
        conflict::report_root_conflicts(
            self.root_syncs.as_ref(),
            &conflicts,
            self.opts.conflict_error_denominator,
        )
        .await
    }
}
