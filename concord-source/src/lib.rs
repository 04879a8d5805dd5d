//! # concord-source
//!
//! Filesystem plumbing between the sync sidecar, the hydration controller,
//! and the reconciliation driver: commit and sync-directory resolution, the
//! hydration render gate, and declared-file enumeration. All of it is
//! read-only; the sidecars own every write below the repo root.

pub mod error;
pub mod files;
pub mod layout;
pub mod reader;
pub mod render;

pub use error::SourceError;
pub use files::list_source_files;
pub use reader::source_commit_and_dir;
pub use render::{done_commit, hydrated_sync_dir, RenderDecision};
