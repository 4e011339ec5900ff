use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "depsync.toml";
pub const DEFAULT_TABLE: &str = "DEPS.toml";
const FALLBACK_TABLE: &str = "DEPS.json";

/// Optional `depsync.toml` at the checkout root.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    pub table: Option<PathBuf>,
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub adopt_unmanaged: bool,
}

impl ProjectConfig {
    /// Loads `<root>/depsync.toml`; a missing file means defaults.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path,
            message: e.to_string(),
        })?;
        if config.sync.parallelism == Some(0) {
            return Err(ConfigError::InvalidParallelism);
        }
        Ok(config)
    }

    /// The table to read: configured path, else `DEPS.toml`, else
    /// `DEPS.json` when only that exists.
    pub fn table_path(&self, root: &Path) -> PathBuf {
        if let Some(table) = &self.sync.table {
            return root.join(table);
        }
        let default = root.join(DEFAULT_TABLE);
        let fallback = root.join(FALLBACK_TABLE);
        if !default.exists() && fallback.exists() {
            fallback
        } else {
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert!(config.sync.parallelism.is_none());
        assert!(!config.sync.adopt_unmanaged);
        assert_eq!(config.table_path(dir.path()), dir.path().join("DEPS.toml"));
    }

    #[test]
    fn test_config_parse() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[sync]\ntable = \"infra/deps.json\"\nparallelism = 3\nadopt_unmanaged = true\n",
        )
        .unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.sync.parallelism, Some(3));
        assert!(config.sync.adopt_unmanaged);
        assert_eq!(
            config.table_path(dir.path()),
            dir.path().join("infra/deps.json")
        );
    }

    #[test]
    fn test_json_table_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("DEPS.json"), "{}").unwrap();
        let config = ProjectConfig::default();
        assert_eq!(config.table_path(dir.path()), dir.path().join("DEPS.json"));
    }

    #[test]
    fn test_rejects_zero_parallelism_and_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[sync]\nparallelism = 0\n").unwrap();
        assert!(matches!(
            ProjectConfig::load(dir.path()),
            Err(ConfigError::InvalidParallelism)
        ));

        fs::write(dir.path().join(CONFIG_FILE), "[sync]\njobs = 2\n").unwrap();
        assert!(matches!(
            ProjectConfig::load(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
