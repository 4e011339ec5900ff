//! Fetch backends.
//!
//! A backend knows how to turn a locator and a revision into files inside an
//! empty staging directory. Which backend handles an entry is decided from
//! the shape of its locator alone; the first registered backend that claims
//! the locator wins.
//!
//! ## Built-in backends
//!
//! - [`ArchiveBackend`] - `.zip` archives over `http(s)://` or `file://`
//! - [`MirrorBackend`] - `file://<dir>` where each revision is a subdirectory
//! - [`GitBackend`] - git remotes via libgit2

mod archive;
mod git;
mod mirror;

pub use archive::ArchiveBackend;
pub use git::GitBackend;
pub use mirror::MirrorBackend;

use crate::cancel::CancelToken;
use crate::error::FetchError;
use std::fs;
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Everything a backend gets to materialize one entry.
pub struct FetchRequest<'a> {
    pub id: &'a str,
    pub locator: &'a str,
    pub revision: &'a str,
    /// Empty directory to populate.
    pub staging: &'a Path,
    /// Current content of the destination, if any. Read-only.
    pub previous: Option<&'a Path>,
    pub cancel: &'a CancelToken,
}

pub trait Backend: Send + Sync {
    /// Short label recorded in markers and reports.
    fn name(&self) -> &'static str;

    fn handles(&self, locator: &str) -> bool;

    /// Populate `request.staging` with content pinned at `request.revision`.
    fn materialize(&self, request: &FetchRequest<'_>) -> Result<(), FetchError>;
}

pub struct BackendRegistry {
    backends: Vec<Box<dyn Backend>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::empty()
            .with(ArchiveBackend::new())
            .with(MirrorBackend)
            .with(GitBackend::new())
    }
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    pub fn with(mut self, backend: impl Backend + 'static) -> Self {
        self.backends.push(Box::new(backend));
        self
    }

    pub fn resolve(&self, locator: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.handles(locator))
            .map(|b| b.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }
}

/// Recursively copies `src` into `dst`, polling `cancel` per entry.
/// Symlinks are recreated, not followed.
pub(crate) fn copy_tree(src: &Path, dst: &Path, cancel: &CancelToken) -> Result<u64, FetchError> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        cancel.check()?;
        let entry = entry.map_err(|e| FetchError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| FetchError::Io(std::io::Error::other(e)))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// True when `value` is one plain path component (no separators, no `..`).
pub(crate) fn is_single_component(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == value
    )
}

/// Splits `url#fragment`.
pub(crate) fn split_fragment(locator: &str) -> (&str, Option<&str>) {
    match locator.split_once('#') {
        Some((url, fragment)) => (url, Some(fragment)),
        None => (locator, None),
    }
}
