//! Staged materialization with rollback.
//!
//! Content is assembled in `.depsync/staging/<slot>` and only then swapped
//! into place with renames. Every completed step of the swap records how to
//! undo itself; on error the steps are undone in reverse so the destination
//! ends up exactly as it was.
//!
//! A small journal next to the backup lets the next run restore a
//! destination if the process died between moving it aside and finishing.

use crate::backend::{Backend, FetchRequest};
use crate::cancel::CancelToken;
use crate::error::FetchError;
use crate::marker::RevisionMarker;
use crate::state::StateLayout;
use crate::table::DependencyEntry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One entry to bring to its pinned revision.
pub(crate) struct Materialization<'a> {
    pub entry: &'a DependencyEntry,
    pub backend: &'a dyn Backend,
    /// Absolute destination.
    pub destination: PathBuf,
    /// Other entries' destinations inside this one, relative to it.
    pub nested: &'a [PathBuf],
}

#[derive(Debug, Serialize, Deserialize)]
struct Journal {
    id: String,
    destination: PathBuf,
}

#[derive(Debug)]
enum Undo {
    Rename { from: PathBuf, to: PathBuf },
    RemoveFile(PathBuf),
}

/// Directory name for an id: readable prefix plus a short digest so that
/// distinct ids never collide.
pub(crate) fn slot_name(id: &str) -> String {
    let readable: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(48)
        .collect();
    let digest = format!("{:x}", Sha256::digest(id.as_bytes()));
    format!("{readable}-{}", &digest[..12])
}

pub(crate) fn materialize(
    job: &Materialization<'_>,
    layout: &StateLayout,
    cancel: &CancelToken,
) -> Result<(), FetchError> {
    let slot = slot_name(&job.entry.id);
    let staging = layout.staging().join(&slot);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let result = stage_and_swap(job, layout, &slot, &staging, cancel);
    if staging.exists()
        && let Err(e) = fs::remove_dir_all(&staging)
    {
        warn!("could not clean staging {}: {e}", staging.display());
    }
    result
}

fn stage_and_swap(
    job: &Materialization<'_>,
    layout: &StateLayout,
    slot: &str,
    staging: &Path,
    cancel: &CancelToken,
) -> Result<(), FetchError> {
    let previous = job.destination.is_dir().then_some(job.destination.as_path());
    job.backend.materialize(&FetchRequest {
        id: &job.entry.id,
        locator: &job.entry.locator,
        revision: &job.entry.revision,
        staging,
        previous,
        cancel,
    })?;
    cancel.check()?;

    RevisionMarker::new(
        &job.entry.id,
        &job.entry.revision,
        &job.entry.locator,
        job.backend.name(),
    )
    .write(staging)
    .map_err(|e| FetchError::Marker(e.to_string()))?;

    let backup = layout.backup().join(slot);
    let journal = layout.backup().join(format!("{slot}.json"));
    let mut undo = Vec::new();
    if let Err(err) = swap(job, staging, &backup, &journal, &mut undo) {
        rollback(undo);
        return Err(err);
    }

    if backup.exists()
        && let Err(e) = fs::remove_dir_all(&backup)
    {
        warn!("could not remove backup {}: {e}", backup.display());
    }
    let _ = fs::remove_file(&journal);
    info!("{} pinned at {}", job.entry.id, job.entry.revision);
    Ok(())
}

fn swap(
    job: &Materialization<'_>,
    staging: &Path,
    backup: &Path,
    journal: &Path,
    undo: &mut Vec<Undo>,
) -> Result<(), FetchError> {
    let dest = &job.destination;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let had_previous = fs::symlink_metadata(dest).is_ok();
    if had_previous {
        if backup.exists() {
            fs::remove_dir_all(backup)?;
        }
        let record = Journal {
            id: job.entry.id.clone(),
            destination: dest.clone(),
        };
        let content = serde_json::to_vec(&record).map_err(io::Error::other)?;
        fs::write(journal, content)?;
        undo.push(Undo::RemoveFile(journal.to_path_buf()));

        fs::rename(dest, backup)?;
        undo.push(Undo::Rename {
            from: backup.to_path_buf(),
            to: dest.clone(),
        });
    }

    fs::rename(staging, dest)?;
    undo.push(Undo::Rename {
        from: dest.clone(),
        to: staging.to_path_buf(),
    });

    if had_previous {
        for child in job.nested {
            let old = backup.join(child);
            if fs::symlink_metadata(&old).is_err() {
                continue;
            }
            let new = dest.join(child);
            if fs::symlink_metadata(&new).is_ok() {
                warn!(
                    "{}: new content already has {}, nested checkout not carried over",
                    job.entry.id,
                    new.display()
                );
                continue;
            }
            if let Some(parent) = new.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&old, &new)?;
            debug!("carried nested {} across swap", child.display());
            undo.push(Undo::Rename { from: new, to: old });
        }
    }
    Ok(())
}

fn rollback(undo: Vec<Undo>) {
    for step in undo.into_iter().rev() {
        let result = match &step {
            Undo::Rename { from, to } => fs::rename(from, to),
            Undo::RemoveFile(path) => fs::remove_file(path),
        };
        if let Err(e) = result {
            warn!("rollback step {step:?} failed: {e}");
        }
    }
}

/// Restores destinations left moved aside by an interrupted run and clears
/// leftover staging. Returns the number of destinations restored.
pub(crate) fn recover(layout: &StateLayout) -> io::Result<usize> {
    let mut restored = 0;
    let backup_dir = layout.backup();
    if backup_dir.is_dir() {
        for dir_entry in fs::read_dir(&backup_dir)? {
            let path = dir_entry?.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let backup = path.with_extension("");
            match fs::read(&path).map(|raw| serde_json::from_slice::<Journal>(&raw)) {
                Ok(Ok(journal)) => {
                    if backup.exists() && fs::symlink_metadata(&journal.destination).is_err() {
                        if let Some(parent) = journal.destination.parent() {
                            fs::create_dir_all(parent)?;
                        }
                        fs::rename(&backup, &journal.destination)?;
                        info!("restored {} after interrupted run", journal.id);
                        restored += 1;
                    }
                }
                _ => warn!("ignoring unreadable journal {}", path.display()),
            }
            fs::remove_file(&path)?;
        }
        // Anything left is a backup whose swap completed.
        for dir_entry in fs::read_dir(&backup_dir)? {
            let path = dir_entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            }
        }
    }

    let staging_dir = layout.staging();
    if staging_dir.is_dir() {
        for dir_entry in fs::read_dir(&staging_dir)? {
            let path = dir_entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    }
    Ok(restored)
}
