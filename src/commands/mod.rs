//! CLI command handlers.
//!
//! Each handler returns the process exit code for its own outcome; errors
//! bubble up as `anyhow::Error` and are classified in `main` with
//! [`exit_code_for`].

pub mod list;
pub mod prune;
pub mod sync;

use crate::config::ProjectConfig;
use crate::error::{ConfigError, SyncError};
use crate::table::DepsTable;
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_ERROR: u8 = 3;

/// Everything a command needs from the checkout root.
pub struct Context {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub table_path: PathBuf,
    pub table: DepsTable,
}

impl Context {
    /// Reads `depsync.toml` and the table. `table` overrides the configured
    /// table path and is taken relative to the current directory.
    pub fn load(root: &Path, table: Option<&Path>) -> Result<Self> {
        let config = ProjectConfig::load(root)?;
        let table_path = match table {
            Some(path) => path.to_path_buf(),
            None => config.table_path(root),
        };
        let table = DepsTable::load(&table_path)
            .with_context(|| format!("loading dependency table {}", table_path.display()))?;
        tracing::debug!(
            "loaded {} entries from {}",
            table.len(),
            table_path.display()
        );
        Ok(Self {
            root: root.to_path_buf(),
            config,
            table_path,
            table,
        })
    }
}

/// Maps a top-level error to its exit code.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_CONFIG_ERROR;
        }
        if let Some(sync) = cause.downcast_ref::<SyncError>() {
            return match sync {
                SyncError::Config(_) => EXIT_CONFIG_ERROR,
                _ => EXIT_ERROR,
            };
        }
    }
    EXIT_ERROR
}

/// Splits `--only a,b` values into ids.
pub fn parse_only(values: &[String]) -> Option<crate::plan::IdFilter> {
    let ids: Vec<&str> = values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    (!ids.is_empty()).then(|| crate::plan::IdFilter::new(ids))
}
