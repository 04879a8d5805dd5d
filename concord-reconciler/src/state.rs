//! In-memory state owned by the driver: the source cache, the retry budget,
//! and the checkpoint flag.
//!
//! The driver task is the only mutator. Resets are scoped so that each
//! trigger invalidates exactly what it must and nothing more.

use std::path::Path;

use tokio::time::Instant;

use concord_core::error::Errors;
use concord_core::types::{Commit, DeclaredObject, ParserResult, SourceSnapshot};

use crate::options::RetryBackoff;

/// Cached snapshot of the last read source and the parser output derived
/// from it.
#[derive(Debug, Default)]
pub struct SourceCache {
    source: Option<SourceSnapshot>,
    parser_result: Option<ParserResult>,
    parser_result_up_to_date: bool,
}

impl SourceCache {
    pub fn source(&self) -> Option<&SourceSnapshot> {
        self.source.as_ref()
    }

    pub fn commit(&self) -> Option<&Commit> {
        self.source.as_ref().map(|s| &s.commit)
    }

    pub fn sync_dir(&self) -> Option<&Path> {
        self.source.as_ref().map(|s| s.sync_dir.as_path())
    }

    /// Replace the cached snapshot. Any previous parser result is derived
    /// from an older snapshot and is marked stale.
    pub fn set_source(&mut self, snapshot: SourceSnapshot) {
        self.source = Some(snapshot);
        self.parser_result_up_to_date = false;
    }

    pub fn parser_result(&self) -> Option<&ParserResult> {
        self.parser_result.as_ref()
    }

    pub fn set_parser_result(&mut self, objects: Vec<DeclaredObject>, errs: Errors) {
        self.parser_result = Some(ParserResult { objects, errs });
        self.parser_result_up_to_date = true;
    }

    pub fn parser_result_up_to_date(&self) -> bool {
        self.parser_result_up_to_date && self.parser_result.is_some()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn clear_parser_result(&mut self) {
        self.parser_result = None;
        self.parser_result_up_to_date = false;
    }
}

/// Error-driven retry budget with capped exponential backoff.
#[derive(Debug, Default)]
pub struct RetryState {
    failed: bool,
    attempt: u32,
    next_eligible: Option<Instant>,
}

impl RetryState {
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_eligible(&self) -> Option<Instant> {
        self.next_eligible
    }
}

/// State for one reconciler, created at driver start and dropped at stop.
#[derive(Debug, Default)]
pub struct ReconcilerState {
    pub cache: SourceCache,
    retry: RetryState,
    errs: Errors,
    checkpointed: bool,
}

impl ReconcilerState {
    /// Full reset: the next pass re-reads and re-parses everything. Used
    /// when a new commit is waiting on hydration.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.retry = RetryState::default();
        self.errs = Errors::default();
        self.checkpointed = false;
    }

    /// Drop the cached snapshot and parser result, keeping retry
    /// bookkeeping. Used mid-pass when the sync directory changed.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    /// Force every stage of the next pass to run again while keeping the
    /// cached source, so an unchanged sync directory is not re-read from
    /// disk.
    pub fn reset_all_but_source_state(&mut self) {
        self.cache.clear_parser_result();
        self.retry = RetryState::default();
        self.errs = Errors::default();
        self.checkpointed = false;
    }

    /// Record a failing pass and schedule the next retry with capped
    /// exponential backoff.
    pub fn invalidate(&mut self, errs: Errors, backoff: &RetryBackoff) {
        tracing::debug!(error = %errs, "reconciliation pass failed");
        self.errs = errs;
        self.checkpointed = false;
        self.retry.failed = true;
        self.retry.attempt = self.retry.attempt.saturating_add(1);
        self.retry.next_eligible = Some(Instant::now() + backoff.delay(self.retry.attempt));
    }

    /// Mark the last pass as having succeeded end to end, status writes
    /// included.
    pub fn checkpoint(&mut self) {
        self.errs = Errors::default();
        self.retry = RetryState::default();
        self.checkpointed = true;
    }

    pub fn ready_to_retry(&self, now: Instant) -> bool {
        self.retry.failed && self.retry.next_eligible.map_or(true, |at| now >= at)
    }

    pub fn checkpointed(&self) -> bool {
        self.checkpointed
    }

    pub fn retry(&self) -> &RetryState {
        &self.retry
    }

    /// Errors recorded by the most recent failing pass.
    pub fn last_errors(&self) -> &Errors {
        &self.errs
    }
}
