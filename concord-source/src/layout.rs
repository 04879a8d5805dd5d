//! Filesystem layout shared with the sync sidecar and the hydration
//! controller. The repo root is the only coordination point between the
//! three processes; everything below it is derived here.

use std::path::{Path, PathBuf};

/// Name of the done-marker the hydration controller writes at the repo root.
/// Its contents are the commit for which hydration completed.
pub const DONE_FILE: &str = "done";

/// Directory the sync sidecar populates with raw source checkouts.
pub const SOURCE_DIR: &str = "source";

/// Directory the hydration controller populates with rendered output.
pub const HYDRATED_DIR: &str = "hydrated";

pub fn source_root(repo_root: &Path) -> PathBuf {
    repo_root.join(SOURCE_DIR)
}

/// The sidecar-maintained symlink under `source/` pointing at the current
/// checkout.
pub fn source_link(repo_root: &Path, link: &str) -> PathBuf {
    source_root(repo_root).join(link)
}

pub fn hydrated_root(repo_root: &Path) -> PathBuf {
    repo_root.join(HYDRATED_DIR)
}

pub fn hydrated_link(repo_root: &Path, link: &str) -> PathBuf {
    hydrated_root(repo_root).join(link)
}

pub fn done_file(repo_root: &Path) -> PathBuf {
    repo_root.join(DONE_FILE)
}
