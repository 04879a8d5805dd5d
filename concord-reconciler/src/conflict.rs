//! Routing of management conflicts to the RootSync that manages the
//! conflicting objects.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use concord_core::error::{ConflictError, Errors, ReconcileError};
use concord_core::types::ManagerScope;

use crate::collaborators::RootSyncClient;

/// Upper bound on remediator errors kept on a RootSync status. The
/// configured denominator divides it, so several reconcilers reporting into
/// the same RootSync share the capacity.
pub const REMEDIATOR_ERROR_LIMIT: usize = 100;

/// Report conflicts to the RootSyncs that manage the conflicting resources.
///
/// Cluster-root managers adopt objects unconditionally, so both sides of a
/// fight keep applying; surfacing the conflict on the other RootSync makes
/// it visible from either end. Namespaced managers never adopt objects
/// another manager owns, so their conflicts are only logged.
pub(crate) async fn report_root_conflicts(
    client: &dyn RootSyncClient,
    conflicts: &[ConflictError],
    denominator: NonZeroUsize,
) -> Result<(), Errors> {
    if conflicts.is_empty() {
        return Ok(());
    }

    let mut by_manager: BTreeMap<String, Vec<ConflictError>> = BTreeMap::new();
    for conflict in conflicts {
        by_manager
            .entry(conflict.manager.to_string())
            .or_default()
            .push(conflict.clone());
    }

    let mut errs = Errors::default();
    for (manager, group) in by_manager {
        match &group[0].manager.scope {
            ManagerScope::Root => {
                let name = group[0].manager.name.clone();
                tracing::info!(manager = %manager, "detected conflict with a cluster-root manager");
                if let Err(err) = client
                    .prepend_remediator_errors(&name, &group, denominator)
                    .await
                {
                    tracing::error!(
                        root_sync = %name,
                        error = %err,
                        "failed to prepend remediator conflicts",
                    );
                    errs.push(ReconcileError::StatusPublish(format!(
                        "failed to update RootSync {name} to prepend remediator conflicts: {err}"
                    )));
                }
            }
            ManagerScope::Namespace(_) => {
                tracing::info!(manager = %manager, "detected conflict with a namespaced manager");
            }
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

/// Prepend new conflict errors to an existing remediator-error list,
/// deduplicating by value and evicting the oldest entries beyond the
/// capacity. Write-path implementations share this with the tests.
pub fn prepend_conflict_errors(
    existing: &mut Vec<ConflictError>,
    new: &[ConflictError],
    denominator: NonZeroUsize,
) {
    let capacity = (REMEDIATOR_ERROR_LIMIT / denominator.get()).max(1);
    let mut merged: Vec<ConflictError> = Vec::new();
    for err in new.iter().chain(existing.iter()) {
        if merged.contains(err) {
            continue;
        }
        merged.push(err.clone());
        if merged.len() == capacity {
            break;
        }
    }
    *existing = merged;
}
