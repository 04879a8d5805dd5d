//! Domain types shared across the Concord crates.
//!
//! Commits are opaque strings; equality is the only operation they support.
//! All filesystem locations use `PathBuf`, never `&str` or `String`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Errors;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of a source snapshot: a git SHA, an OCI digest, or a
/// chart version. Commits support total equality and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commit(pub String);

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Commit {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Commit {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of external source the sync sidecar fetches configuration from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Git,
    Oci,
    Helm,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Git => write!(f, "git"),
            SourceType::Oci => write!(f, "oci"),
            SourceType::Helm => write!(f, "helm"),
        }
    }
}

/// Scope a configuration manager operates at: the cluster root, or a single
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerScope {
    Root,
    Namespace(String),
}

impl fmt::Display for ManagerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerScope::Root => write!(f, ":root"),
            ManagerScope::Namespace(ns) => ns.fmt(f),
        }
    }
}

/// Identity of the reconciler that manages an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub scope: ManagerScope,
    pub name: String,
}

impl Manager {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            scope: ManagerScope::Root,
            name: name.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: ManagerScope::Namespace(namespace.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A declared resource produced by the parser. The driver never looks inside
/// the manifest; it is carried opaquely from parser to applier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredObject {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub manifest: serde_json::Value,
}

/// The source snapshot a reconciliation pass works against.
///
/// `files` is populated only after a successful read. The commit and sync
/// directory never change within one snapshot; a new commit replaces the
/// snapshot as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub commit: Commit,
    pub sync_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<PathBuf>>,
}

/// Parser output derived from a [`SourceSnapshot`]. Stale as soon as the
/// snapshot it was derived from is replaced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParserResult {
    pub objects: Vec<DeclaredObject>,
    pub errs: Errors,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_display_and_equality() {
        assert_eq!(Commit::from("abc123").to_string(), "abc123");
        assert_eq!(Commit::from("x"), Commit::from(String::from("x")));
        assert_ne!(Commit::from("a"), Commit::from("b"));
    }

    #[test]
    fn manager_display_includes_scope() {
        assert_eq!(Manager::root("root-a").to_string(), ":root/root-a");
        assert_eq!(
            Manager::namespaced("shipping", "repo-sync").to_string(),
            "shipping/repo-sync"
        );
    }

    #[test]
    fn source_type_display() {
        assert_eq!(SourceType::Git.to_string(), "git");
        assert_eq!(SourceType::Oci.to_string(), "oci");
        assert_eq!(SourceType::Helm.to_string(), "helm");
    }
}
