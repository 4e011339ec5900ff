//! Loading of the generated dependency table.
//!
//! The table is produced by an external generator; depsync only reads it.
//! Both a map keyed by id and a plain list are accepted, in TOML or JSON:
//!
//! ```toml
//! [deps."chromium.googlesource.com/chromium/deps/icu"]
//! id = "chromium.googlesource.com/chromium/deps/icu"
//! version = "364118a1d9da24bb5b770ac3d762ac144d6da5a4"
//! path = "third_party/externals/icu"
//! ```

use crate::error::ConfigError;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// One pinned dependency record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEntry {
    pub id: String,
    pub locator: String,
    pub revision: String,
    /// Destination relative to the checkout root, as written in the table.
    pub destination: String,
}

impl DependencyEntry {
    pub fn new(id: &str, revision: &str, destination: &str) -> Self {
        Self {
            id: id.to_string(),
            locator: infer_locator(id),
            revision: revision.to_string(),
            destination: destination.to_string(),
        }
    }

    pub fn with_locator(mut self, locator: &str) -> Self {
        self.locator = locator.to_string();
        self
    }
}

/// Immutable set of entries for one run, in table order.
#[derive(Debug, Clone, Default)]
pub struct DepsTable {
    entries: Vec<DependencyEntry>,
}

impl DepsTable {
    /// Wraps already-built entries. Duplicates are kept so validation can
    /// report them.
    pub fn from_entries(entries: Vec<DependencyEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::parse_toml(&content, path),
            Some("json") => Self::parse_json(&content, path),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn parse_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let raw: RawTable = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        raw.into_table()
    }

    pub fn parse_json(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let raw: RawTable = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        raw.into_table()
    }

    pub fn entries(&self) -> &[DependencyEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&DependencyEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Locator used when an entry doesn't name one.
///
/// Ids shaped like `host.name/path` become `https://host.name/path`; anything
/// else is passed through and must be claimed by a backend.
pub fn infer_locator(id: &str) -> String {
    let host = id.split('/').next().unwrap_or_default();
    if !id.contains("://") && id.contains('/') && host.contains('.') {
        format!("https://{id}")
    } else {
        id.to_string()
    }
}

#[derive(Deserialize)]
struct RawTable {
    deps: RawDeps,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDeps {
    List(Vec<RawEntry>),
    Map(KeyedEntries),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    #[serde(default, alias = "Id")]
    id: Option<String>,
    #[serde(alias = "revision", alias = "Version")]
    version: String,
    #[serde(alias = "destination", alias = "Path")]
    path: String,
    #[serde(default)]
    locator: Option<String>,
}

/// Map entries in document order, with repeated keys preserved.
struct KeyedEntries(Vec<(String, RawEntry)>);

impl<'de> Deserialize<'de> for KeyedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyedVisitor;

        impl<'de> Visitor<'de> for KeyedVisitor {
            type Value = KeyedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of dependency id to entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, RawEntry>()? {
                    entries.push((key, value));
                }
                Ok(KeyedEntries(entries))
            }
        }

        deserializer.deserialize_map(KeyedVisitor)
    }
}

impl RawTable {
    fn into_table(self) -> Result<DepsTable, ConfigError> {
        let entries = match self.deps {
            RawDeps::List(list) => list
                .into_iter()
                .map(|raw| {
                    let id = raw.id.clone().unwrap_or_default();
                    raw.into_entry(id)
                })
                .collect(),
            RawDeps::Map(KeyedEntries(map)) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, raw) in map {
                    if let Some(id) = &raw.id
                        && *id != key
                    {
                        return Err(ConfigError::KeyMismatch {
                            key,
                            id: id.clone(),
                        });
                    }
                    entries.push(raw.into_entry(key));
                }
                entries
            }
        };
        Ok(DepsTable::from_entries(entries))
    }
}

impl RawEntry {
    fn into_entry(self, id: String) -> DependencyEntry {
        let locator = self.locator.unwrap_or_else(|| infer_locator(&id));
        DependencyEntry {
            id,
            locator,
            revision: self.version,
            destination: self.path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> &'static Path {
        Path::new("DEPS.toml")
    }

    #[test]
    fn test_parse_generated_map() {
        let toml_str = r#"
[deps."chromium.googlesource.com/chromium/deps/icu"]
id = "chromium.googlesource.com/chromium/deps/icu"
version = "364118a1d9da24bb5b770ac3d762ac144d6da5a4"
path = "third_party/externals/icu"

[deps."infra/3pp/tools/ninja"]
id = "infra/3pp/tools/ninja"
version = "version:2@1.12.1.chromium.4"
path = "bin"
locator = "file:///opt/cipd"
"#;
        let table = DepsTable::parse_toml(toml_str, origin()).unwrap();
        assert_eq!(table.len(), 2);

        let icu = table.get("chromium.googlesource.com/chromium/deps/icu").unwrap();
        assert_eq!(
            icu.locator,
            "https://chromium.googlesource.com/chromium/deps/icu"
        );
        assert_eq!(icu.destination, "third_party/externals/icu");

        let ninja = table.get("infra/3pp/tools/ninja").unwrap();
        assert_eq!(ninja.locator, "file:///opt/cipd");
        assert_eq!(ninja.revision, "version:2@1.12.1.chromium.4");
    }

    #[test]
    fn test_parse_generator_field_names() {
        let json = r#"{ "deps": { "dawn.googlesource.com/dawn": {
            "Id": "dawn.googlesource.com/dawn",
            "Version": "b339ed4daf668b7377134347f29a41239dee3ed6",
            "Path": "third_party/externals/dawn"
        } } }"#;
        let table = DepsTable::parse_json(json, Path::new("DEPS.json")).unwrap();
        let dawn = table.get("dawn.googlesource.com/dawn").unwrap();
        assert_eq!(dawn.revision, "b339ed4daf668b7377134347f29a41239dee3ed6");
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let toml_str = r#"
[deps.a]
id = "b"
version = "r1"
path = "x"
"#;
        let err = DepsTable::parse_toml(toml_str, origin()).unwrap_err();
        assert!(matches!(err, ConfigError::KeyMismatch { .. }));
    }

    #[test]
    fn test_list_form_keeps_duplicates() {
        let json = r#"{ "deps": [
            { "id": "x", "revision": "r1", "destination": "d/x" },
            { "id": "x", "revision": "r2", "destination": "d/y" }
        ] }"#;
        let table = DepsTable::parse_json(json, Path::new("DEPS.json")).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_json_map_keeps_repeated_keys() {
        let json = r#"{ "deps": {
            "x": { "version": "r1", "path": "a" },
            "x": { "version": "r2", "path": "b" }
        } }"#;
        let table = DepsTable::parse_json(json, Path::new("DEPS.json")).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml_str = r#"
[deps.a]
version = "r1"
path = "x"
branch = "main"
"#;
        assert!(DepsTable::parse_toml(toml_str, origin()).is_err());
    }

    #[test]
    fn test_infer_locator() {
        assert_eq!(
            infer_locator("skia.googlesource.com/buildbot"),
            "https://skia.googlesource.com/buildbot"
        );
        assert_eq!(infer_locator("skia/tools/sk"), "skia/tools/sk");
        assert_eq!(infer_locator("https://x.org/a"), "https://x.org/a");
        assert_eq!(infer_locator("plain"), "plain");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DEPS.yaml");
        fs::write(&path, "deps: {}").unwrap();
        assert!(matches!(
            DepsTable::load(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
