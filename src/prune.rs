//! Removal of destinations whose ids left the table.
//!
//! Candidates come from the run state, not from scanning the tree: only
//! what depsync itself materialized is ever deleted, and only while the
//! marker on disk still names the same id.

use crate::error::SyncError;
use crate::marker::{self, Inspection};
use crate::plan;
use crate::state::{RunState, StateLayout};
use crate::table::DepsTable;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PruneAction {
    Removed,
    WouldRemove,
    /// Destination already gone or owned by someone else; only the state
    /// record was dropped.
    Forgotten,
    /// Still needed by an entry of the current table.
    Kept,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrunedEntry {
    pub id: String,
    pub path: PathBuf,
    pub action: PruneAction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub dry_run: bool,
    pub entries: Vec<PrunedEntry>,
}

impl PruneReport {
    pub fn removed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, PruneAction::Removed | PruneAction::WouldRemove))
            .count()
    }
}

pub fn prune(root: &Path, table: &DepsTable, dry_run: bool) -> Result<PruneReport, SyncError> {
    let layout = StateLayout::new(root);
    let _lock = if dry_run { None } else { Some(layout.lock()?) };
    let mut state = RunState::load(&layout)?;

    let live: Vec<PathBuf> = table
        .entries()
        .iter()
        .filter_map(|e| plan::normalize_destination(&e.id, &e.destination).ok())
        .collect();

    let mut candidates: Vec<(String, Option<PathBuf>)> = state
        .entries
        .iter()
        .filter(|(id, _)| !table.contains(id))
        .map(|(id, entry)| {
            (
                id.clone(),
                plan::normalize_destination(id, &entry.path).ok(),
            )
        })
        .collect();
    // Deepest first so inner checkouts go before the trees holding them.
    candidates.sort_by_key(|(_, path)| {
        std::cmp::Reverse(path.as_ref().map_or(0, |p| p.components().count()))
    });

    let mut report = PruneReport {
        dry_run,
        entries: Vec::new(),
    };
    for (id, path) in candidates {
        let Some(path) = path else {
            warn!("{id}: recorded path is not a valid destination, forgetting it");
            if !dry_run {
                state.remove(&id);
            }
            continue;
        };

        let in_use = live
            .iter()
            .any(|l| l == &path || l.starts_with(&path));
        let action = if in_use {
            debug!("{id}: {} still used by the table", path.display());
            PruneAction::Kept
        } else {
            prune_one(root, &id, &path, dry_run)?
        };

        if !dry_run && action != PruneAction::Kept {
            state.remove(&id);
        }
        report.entries.push(PrunedEntry { id, path, action });
    }

    if !dry_run {
        state.save(&layout)?;
    }
    Ok(report)
}

fn prune_one(root: &Path, id: &str, path: &Path, dry_run: bool) -> Result<PruneAction, SyncError> {
    let absolute = root.join(path);
    let owned = match marker::inspect(&absolute) {
        Ok(Inspection::Marked(m)) => m.id == id,
        Ok(_) => false,
        Err(e) => {
            warn!("{id}: cannot read marker in {}: {e}", absolute.display());
            false
        }
    };
    if !owned {
        return Ok(PruneAction::Forgotten);
    }
    if dry_run {
        return Ok(PruneAction::WouldRemove);
    }
    fs::remove_dir_all(&absolute).map_err(|source| SyncError::State {
        path: absolute.clone(),
        source,
    })?;
    info!("pruned {id} at {}", path.display());
    Ok(PruneAction::Removed)
}
