//! The `.depsync/` state directory under the checkout root.
//!
//! ```text
//! .depsync/
//!   lock         advisory lock held by a mutating run
//!   state.toml   ids materialized by previous runs
//!   staging/     content being assembled
//!   backup/      destinations moved aside during a swap
//! ```

use crate::error::SyncError;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".depsync";

#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn staging(&self) -> PathBuf {
        self.dir().join("staging")
    }

    pub fn backup(&self) -> PathBuf {
        self.dir().join("backup")
    }

    pub fn state_file(&self) -> PathBuf {
        self.dir().join("state.toml")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.dir().join("lock")
    }

    pub fn ensure(&self) -> Result<(), SyncError> {
        for dir in [self.staging(), self.backup()] {
            fs::create_dir_all(&dir).map_err(|source| SyncError::State { path: dir, source })?;
        }
        Ok(())
    }

    /// Takes the run lock without waiting.
    pub fn lock(&self) -> Result<RunLock, SyncError> {
        self.ensure()?;
        let path = self.lock_file();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| SyncError::State {
                path: path.clone(),
                source,
            })?;
        file.try_lock_exclusive()
            .map_err(|_| SyncError::Locked(path))?;
        Ok(RunLock { file })
    }
}

/// Released on drop.
pub struct RunLock {
    file: File,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunState {
    #[serde(rename = "entry", default)]
    pub entries: BTreeMap<String, StateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub path: String,
    pub revision: String,
    pub locator: String,
}

impl RunState {
    pub fn load(layout: &StateLayout) -> Result<Self, SyncError> {
        let path = layout.state_file();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| SyncError::State {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| SyncError::StateFile {
            path,
            message: e.to_string(),
        })
    }

    pub fn save(&self, layout: &StateLayout) -> Result<(), SyncError> {
        let path = layout.state_file();
        let content = toml::to_string_pretty(self).map_err(|e| SyncError::StateFile {
            path: path.clone(),
            message: e.to_string(),
        })?;
        layout.ensure()?;
        fs::write(&path, content).map_err(|source| SyncError::State { path, source })
    }

    pub fn get(&self, id: &str) -> Option<&StateEntry> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: &str, path: &str, revision: &str, locator: &str) {
        self.entries.insert(
            id.to_string(),
            StateEntry {
                path: path.to_string(),
                revision: revision.to_string(),
                locator: locator.to_string(),
            },
        );
    }

    pub fn remove(&mut self, id: &str) -> Option<StateEntry> {
        self.entries.remove(id)
    }
}
