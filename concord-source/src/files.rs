//! Enumeration of declared resource files under a sync directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, SourceError};

const DECLARED_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// List every declared resource file under `sync_dir`, sorted for
/// determinism. Hidden entries are skipped.
///
/// A directory vanishing mid-walk means the sidecar is swapping the link;
/// that is not-ready, not a hard failure.
pub fn list_source_files(sync_dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let mut files = Vec::new();
    let mut dirs = vec![sync_dir.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SourceError::NotReady { path: current })
            }
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            if is_hidden(&entry.file_name()) {
                continue;
            }
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if ty.is_dir() {
                dirs.push(entry.path());
            } else if is_declared_file(&entry.path()) {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.')).unwrap_or(false)
}

fn is_declared_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            DECLARED_EXTENSIONS
                .iter()
                .any(|declared| ext.eq_ignore_ascii_case(declared))
        })
        .unwrap_or(false)
}
