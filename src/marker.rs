//! Revision markers.
//!
//! Every materialized destination carries a `.depsync.json` file naming the
//! entry and revision it holds. The marker is written into staging before the
//! swap, so the marker on disk always describes the content beside it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const MARKER_FILE: &str = ".depsync.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMarker {
    pub id: String,
    pub revision: String,
    pub locator: String,
    pub backend: String,
    pub synced_at: String,
}

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Parse(#[from] serde_json::Error),
}

impl RevisionMarker {
    pub fn new(id: &str, revision: &str, locator: &str, backend: &str) -> Self {
        Self {
            id: id.to_string(),
            revision: revision.to_string(),
            locator: locator.to_string(),
            backend: backend.to_string(),
            synced_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Reads the marker in `dir`, or `None` when there is none.
    pub fn read(dir: &Path) -> Result<Option<Self>, MarkerError> {
        let path = dir.join(MARKER_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Atomically writes the marker into `dir`.
    pub fn write(&self, dir: &Path) -> Result<(), MarkerError> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(MARKER_FILE))
            .map_err(|e| MarkerError::Io(e.error))?;
        Ok(())
    }
}

/// What currently sits at a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    Missing,
    /// An existing directory with nothing in it.
    Empty,
    Marked(RevisionMarker),
    /// Content (or a plain file) without a marker.
    Unmanaged,
}

pub fn inspect(dest: &Path) -> Result<Inspection, MarkerError> {
    let meta = match fs::symlink_metadata(dest) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Inspection::Missing),
        Err(e) => return Err(e.into()),
    };
    if !meta.is_dir() {
        return Ok(Inspection::Unmanaged);
    }
    if let Some(marker) = RevisionMarker::read(dest)? {
        return Ok(Inspection::Marked(marker));
    }
    if fs::read_dir(dest)?.next().is_none() {
        Ok(Inspection::Empty)
    } else {
        Ok(Inspection::Unmanaged)
    }
}

/// Like [`inspect`], but a directory holding nothing except other entries'
/// destinations (`nested`, relative to `dest`) and the directories leading
/// to them counts as `Empty`. Such a directory is left behind when an inner
/// entry lands before its outer one.
pub fn inspect_outer(dest: &Path, nested: &[PathBuf]) -> Result<Inspection, MarkerError> {
    let inspection = inspect(dest)?;
    if inspection == Inspection::Unmanaged
        && !nested.is_empty()
        && dest.is_dir()
        && holds_only(dest, Path::new(""), nested)?
    {
        return Ok(Inspection::Empty);
    }
    Ok(inspection)
}

fn holds_only(dir: &Path, prefix: &Path, nested: &[PathBuf]) -> io::Result<bool> {
    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let relative = prefix.join(dir_entry.file_name());
        if nested.iter().any(|n| *n == relative) {
            continue;
        }
        let leads_to_nested = nested.iter().any(|n| n.starts_with(&relative));
        if !leads_to_nested || !dir_entry.file_type()?.is_dir() {
            return Ok(false);
        }
        if !holds_only(&dir_entry.path(), &relative, nested)? {
            return Ok(false);
        }
    }
    Ok(true)
}
