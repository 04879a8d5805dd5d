//! Hydration render gate: the done-marker and the hydrated output
//! directory.
//!
//! Hydration and reconciliation share the filesystem as their only
//! synchronization medium. The done-marker's contents are the commit for
//! which hydration completed; the presence of the hydrated root decides
//! whether hydrated output or raw source is authoritative.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use concord_core::types::Commit;

use crate::error::SourceError;

/// Read the commit recorded in the done-marker. `None` when the marker is
/// absent (hydration has not completed for any commit yet).
pub fn done_commit(done_file: &Path) -> Result<Option<Commit>, SourceError> {
    match std::fs::read_to_string(done_file) {
        Ok(contents) => Ok(Some(Commit::from(contents.trim()))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SourceError::Hydration {
            path: done_file.to_path_buf(),
            message: format!("unable to read the done file: {err}"),
        }),
    }
}

/// Which directory a pass should read declared files from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderDecision {
    /// Hydrated output is authoritative.
    Rendered { sync_dir: PathBuf },
    /// No hydrated output exists; raw source is authoritative.
    SkippedRaw,
    /// Hydrated output exists but is unusable.
    Failed { message: String },
}

/// Decide between hydrated output and raw source for the current pass.
///
/// Callers check the done-marker first; this only evaluates the hydrated
/// directory itself.
pub fn hydrated_sync_dir(hydrated_root: &Path, link: &str, sync_rel_dir: &Path) -> RenderDecision {
    match std::fs::metadata(hydrated_root) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return RenderDecision::SkippedRaw,
        Err(err) => {
            return RenderDecision::Failed {
                message: format!(
                    "unable to evaluate the hydrated path {}: {err}",
                    hydrated_root.display()
                ),
            }
        }
    }

    let link_path = hydrated_root.join(link);
    let resolved = match std::fs::canonicalize(&link_path) {
        Ok(path) => path,
        Err(err) => {
            return RenderDecision::Failed {
                message: format!(
                    "unable to resolve the hydrated link {}: {err}",
                    link_path.display()
                ),
            }
        }
    };

    let sync_dir = resolved.join(sync_rel_dir);
    if !sync_dir.is_dir() {
        return RenderDecision::Failed {
            message: format!(
                "sync directory {} missing from hydrated output",
                sync_dir.display()
            ),
        };
    }
    RenderDecision::Rendered { sync_dir }
}
