//! Shared fixtures: a repo root shaped the way the sync sidecar and the
//! hydration controller leave it, plus in-memory collaborator fakes.

#![allow(dead_code)]

use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use concord_core::error::{ConflictError, Errors};
use concord_core::status::{RenderingStatus, SourceStatus, SyncStatus};
use concord_core::types::{DeclaredObject, SourceSnapshot};
use concord_reconciler::{
    Applier, Options, PublishError, Reconciler, RootSyncClient, SourceCache, SourceParser,
    StatusPublisher, SyncSignals,
};

/// A repo-root directory with `source/`, `hydrated/`, and the done-marker.
pub struct TestRepo {
    root: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("repo root"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Materialize a checkout for `commit` with declared files and point
    /// `source/rev` at it, the way the sync sidecar does.
    pub fn set_commit(&self, commit: &str, files: &[(&str, &str)]) {
        let checkout = self.path().join("source").join(commit);
        write_files(&checkout, files);
        relink(&checkout, &self.path().join("source").join("rev"));
    }

    /// Materialize hydrated output for `commit` and point `hydrated/rev` at
    /// it.
    pub fn hydrate(&self, commit: &str, files: &[(&str, &str)]) {
        let output = self.path().join("hydrated").join(commit);
        write_files(&output, files);
        relink(&output, &self.path().join("hydrated").join("rev"));
    }

    /// Record hydration completion for `commit` in the done-marker.
    pub fn mark_done(&self, commit: &str) {
        fs::write(self.path().join("done"), commit).expect("done marker");
    }
}

fn write_files(dir: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(dir).expect("create dir");
    for (name, contents) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        fs::write(path, contents).expect("write file");
    }
}

fn relink(target: &Path, link: &Path) {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).expect("link parent");
    }
    match fs::remove_file(link) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => panic!("remove old link: {err}"),
    }
    std::os::unix::fs::symlink(target, link).expect("symlink");
}

// ---------------------------------------------------------------------------
// Collaborator fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeParser {
    errs: Mutex<Errors>,
    calls: AtomicUsize,
}

impl FakeParser {
    pub fn set_errs(&self, errs: Errors) {
        *self.errs.lock().expect("lock") = errs;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceParser for FakeParser {
    async fn parse_source(&self, source: &SourceSnapshot) -> (Vec<DeclaredObject>, Errors) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let objects = source
            .files
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|path| DeclaredObject {
                kind: "ConfigMap".to_string(),
                name: path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or("unnamed")
                    .to_string(),
                namespace: None,
                manifest: serde_json::json!({}),
            })
            .collect();
        (objects, self.errs.lock().expect("lock").clone())
    }
}

#[derive(Default)]
pub struct FakeApplier {
    result: Mutex<Errors>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicBool,
}

impl FakeApplier {
    pub fn set_result(&self, errs: Errors) {
        *self.result.lock().expect("lock") = errs;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("lock") = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Applier for FakeApplier {
    async fn apply(&self, _cache: &SourceCache) -> Errors {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(true, Ordering::SeqCst);
        let delay = *self.delay.lock().expect("lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.store(false, Ordering::SeqCst);
        self.result.lock().expect("lock").clone()
    }

    fn syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn sync_errors(&self) -> Errors {
        self.result.lock().expect("lock").clone()
    }
}

#[derive(Default)]
pub struct StaticSignals {
    pub conflict: AtomicBool,
    pub watch: AtomicBool,
}

impl SyncSignals for StaticSignals {
    fn need_to_update_watch(&self) -> bool {
        self.watch.load(Ordering::SeqCst)
    }

    fn management_conflict(&self) -> bool {
        self.conflict.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum StatusEvent {
    Rendering(RenderingStatus),
    Source(SourceStatus),
    Sync(SyncStatus),
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<StatusEvent>>,
    pub fail_rendering: AtomicBool,
    pub fail_source: AtomicBool,
    pub fail_sync: AtomicBool,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().expect("lock").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("lock").clear();
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn set_rendering_status(
        &self,
        _prev: &RenderingStatus,
        new: &RenderingStatus,
    ) -> Result<(), PublishError> {
        if self.fail_rendering.load(Ordering::SeqCst) {
            return Err(PublishError("rendering write refused".into()));
        }
        self.events
            .lock()
            .expect("lock")
            .push(StatusEvent::Rendering(new.clone()));
        Ok(())
    }

    async fn set_source_status(&self, new: &SourceStatus) -> Result<(), PublishError> {
        if self.fail_source.load(Ordering::SeqCst) {
            return Err(PublishError("source write refused".into()));
        }
        self.events
            .lock()
            .expect("lock")
            .push(StatusEvent::Source(new.clone()));
        Ok(())
    }

    async fn set_sync_status(&self, new: &SyncStatus) -> Result<(), PublishError> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(PublishError("sync write refused".into()));
        }
        self.events
            .lock()
            .expect("lock")
            .push(StatusEvent::Sync(new.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingRootSyncs {
    prepends: Mutex<Vec<(String, Vec<ConflictError>)>>,
}

impl RecordingRootSyncs {
    pub fn prepends(&self) -> Vec<(String, Vec<ConflictError>)> {
        self.prepends.lock().expect("lock").clone()
    }
}

#[async_trait]
impl RootSyncClient for RecordingRootSyncs {
    async fn prepend_remediator_errors(
        &self,
        root_sync: &str,
        errs: &[ConflictError],
        _denominator: NonZeroUsize,
    ) -> Result<(), PublishError> {
        self.prepends
            .lock()
            .expect("lock")
            .push((root_sync.to_string(), errs.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A repo plus one of every fake, wired into a reconciler on demand.
pub struct Harness {
    pub repo: TestRepo,
    pub parser: Arc<FakeParser>,
    pub applier: Arc<FakeApplier>,
    pub signals: Arc<StaticSignals>,
    pub publisher: Arc<RecordingPublisher>,
    pub root_syncs: Arc<RecordingRootSyncs>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            repo: TestRepo::new(),
            parser: Arc::new(FakeParser::default()),
            applier: Arc::new(FakeApplier::default()),
            signals: Arc::new(StaticSignals::default()),
            publisher: Arc::new(RecordingPublisher::default()),
            root_syncs: Arc::new(RecordingRootSyncs::default()),
        }
    }

    pub fn options(&self) -> Options {
        Options::new("root-reconciler", self.repo.path())
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler_with(self.options())
    }

    pub fn reconciler_with(&self, opts: Options) -> Reconciler {
        Reconciler::new(
            opts,
            self.parser.clone(),
            self.applier.clone(),
            self.signals.clone(),
            self.publisher.clone(),
            self.root_syncs.clone(),
        )
    }
}
