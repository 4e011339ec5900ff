//! Error taxonomy for synchronization runs.
//!
//! - [`ConfigError`] means the table or configuration can't be trusted. It is
//!   raised before anything on disk changes and aborts the whole run.
//! - [`FetchError`] belongs to a single entry. It ends up in the report as
//!   `failed(reason)` and never stops sibling entries.
//! - [`SyncError`] covers run-level failures around the state directory.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("unsupported table format for {0} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("entry with an empty id")]
    EmptyId,
    #[error("duplicate id '{0}'")]
    DuplicateId(String),
    #[error("entry keyed '{key}' declares id '{id}'")]
    KeyMismatch { key: String, id: String },
    #[error("'{id}' has an empty revision")]
    EmptyRevision { id: String },
    #[error("'{id}' has an empty destination path")]
    EmptyPath { id: String },
    #[error("'{id}' destination '{path}' escapes the checkout root")]
    EscapesRoot { id: String, path: String },
    #[error("'{first}' and '{second}' share destination '{path}'")]
    OverlappingPath {
        first: String,
        second: String,
        path: PathBuf,
    },
    #[error("'{id}' destination '{path}' lies inside the state directory")]
    ReservedPath { id: String, path: PathBuf },
    #[error("no backend can fetch '{locator}' for '{id}'")]
    NoBackend { id: String, locator: String },
    #[error("destination '{path}' for '{id}' already holds '{owner}'")]
    PathReused {
        id: String,
        path: PathBuf,
        owner: String,
    },
    #[error("destination '{path}' for '{id}' has content not managed by depsync")]
    Unmanaged { id: String, path: PathBuf },
    #[error("unreadable revision marker at {path}: {message}")]
    CorruptMarker { path: PathBuf, message: String },
    #[error("--only names unknown id '{0}'")]
    UnknownFilterId(String),
    #[error("parallelism must be at least 1")]
    InvalidParallelism,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cancelled")]
    Cancelled,
    #[error("git: {0}")]
    Git(#[from] git2::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("http: {0}")]
    Http(String),
    #[error("archive: {0}")]
    Archive(String),
    #[error("sha256 mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },
    #[error("revision '{revision}' not found in {locator}")]
    RevisionNotFound { revision: String, locator: String },
    #[error("invalid revision '{0}' for this backend")]
    InvalidRevision(String),
    #[error("destination {path} now holds '{owner}'")]
    PathReused { path: PathBuf, owner: String },
    #[error("destination {0} has content not managed by depsync")]
    Unmanaged(PathBuf),
    #[error("marker: {0}")]
    Marker(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("state directory {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("another depsync run holds {0}")]
    Locked(PathBuf),
    #[error("state file {path}: {message}")]
    StateFile { path: PathBuf, message: String },
    #[error("failed to start worker pool: {0}")]
    Pool(String),
}
