//! Resolution of the current commit and sync directory from the shared
//! filesystem populated by the sync sidecar.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use concord_core::types::{Commit, SourceType};

use crate::error::{io_err, SourceError};

/// Resolve the commit currently checked out by the sidecar and the absolute
/// directory declared objects live under.
///
/// The sidecar maintains `source_dir` as a symlink to a checkout named by
/// its commit; the link's target basename is the commit identifier. A
/// missing or dangling link means the sidecar has not finished yet, which is
/// transient, not a failure.
pub fn source_commit_and_dir(
    source_type: SourceType,
    source_dir: &Path,
    sync_rel_dir: &Path,
    reconciler_name: &str,
) -> Result<(Commit, PathBuf), SourceError> {
    let resolved = match std::fs::canonicalize(source_dir) {
        Ok(path) => path,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(SourceError::NotReady {
                path: source_dir.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(source_dir, err)),
    };

    let commit = resolved
        .file_name()
        .and_then(|name| name.to_str())
        .map(Commit::from)
        .ok_or_else(|| SourceError::NotReady {
            path: resolved.clone(),
        })?;

    let sync_dir = resolved.join(sync_rel_dir);
    match std::fs::metadata(&sync_dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(SourceError::MissingSyncDir { path: sync_dir }),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(SourceError::MissingSyncDir { path: sync_dir })
        }
        Err(err) => return Err(io_err(&sync_dir, err)),
    }

    tracing::debug!(
        source_type = %source_type,
        reconciler = reconciler_name,
        commit = %commit,
        sync_dir = %sync_dir.display(),
        "resolved source commit and sync directory",
    );
    Ok((commit, sync_dir))
}
