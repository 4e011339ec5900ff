//! Validation and scheduling of a run.
//!
//! Building a [`Plan`] never writes to disk. It checks the whole table,
//! inspects every selected destination, and groups entries so that nested
//! destinations (`a` and `a/b`) are processed one after another, outer
//! first, while unrelated trees run in parallel.

use crate::backend::{Backend, BackendRegistry};
use crate::error::ConfigError;
use crate::marker::{self, Inspection};
use crate::state::STATE_DIR;
use crate::table::{DependencyEntry, DepsTable};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use petgraph::unionfind::UnionFind;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Restricts a run to a subset of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdFilter {
    ids: BTreeSet<String>,
}

impl IdFilter {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Current,
    Fetch,
    /// `from` is the previous revision, `None` for adopted content.
    Update { from: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    PathReused { owner: String },
    Unmanaged,
}

/// What needs to happen to bring `inspection` to `revision`.
pub fn decide(
    id: &str,
    revision: &str,
    inspection: &Inspection,
    adopt_unmanaged: bool,
) -> Result<Action, Conflict> {
    match inspection {
        Inspection::Missing | Inspection::Empty => Ok(Action::Fetch),
        Inspection::Marked(m) if m.id != id => Err(Conflict::PathReused {
            owner: m.id.clone(),
        }),
        Inspection::Marked(m) if m.revision == revision => Ok(Action::Current),
        Inspection::Marked(m) => Ok(Action::Update {
            from: Some(m.revision.clone()),
        }),
        Inspection::Unmanaged if adopt_unmanaged => Ok(Action::Update { from: None }),
        Inspection::Unmanaged => Err(Conflict::Unmanaged),
    }
}

/// Normalizes a destination to plain relative components.
pub fn normalize_destination(id: &str, raw: &str) -> Result<PathBuf, ConfigError> {
    let mut normalized = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ConfigError::EscapesRoot {
                    id: id.to_string(),
                    path: raw.to_string(),
                });
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(ConfigError::EmptyPath { id: id.to_string() });
    }
    if normalized.starts_with(STATE_DIR) {
        return Err(ConfigError::ReservedPath {
            id: id.to_string(),
            path: normalized,
        });
    }
    Ok(normalized)
}

/// One table entry that passed validation.
#[derive(Clone)]
pub struct Validated<'a> {
    pub entry: &'a DependencyEntry,
    pub destination: PathBuf,
    pub backend: &'a dyn Backend,
}

/// Table-level checks: ids, revisions, paths, overlap and backend dispatch.
pub fn validate<'a>(
    table: &'a DepsTable,
    backends: &'a BackendRegistry,
) -> Result<Vec<Validated<'a>>, ConfigError> {
    let mut seen_ids = HashSet::new();
    let mut seen_paths: HashMap<PathBuf, &str> = HashMap::new();
    let mut validated = Vec::with_capacity(table.len());

    for entry in table.entries() {
        if entry.id.is_empty() {
            return Err(ConfigError::EmptyId);
        }
        if !seen_ids.insert(entry.id.as_str()) {
            return Err(ConfigError::DuplicateId(entry.id.clone()));
        }
        if entry.revision.is_empty() {
            return Err(ConfigError::EmptyRevision {
                id: entry.id.clone(),
            });
        }
        let destination = normalize_destination(&entry.id, &entry.destination)?;
        if let Some(first) = seen_paths.insert(destination.clone(), entry.id.as_str()) {
            return Err(ConfigError::OverlappingPath {
                first: first.to_string(),
                second: entry.id.clone(),
                path: destination,
            });
        }
        let backend = backends
            .resolve(&entry.locator)
            .ok_or_else(|| ConfigError::NoBackend {
                id: entry.id.clone(),
                locator: entry.locator.clone(),
            })?;

        validated.push(Validated {
            entry,
            destination,
            backend,
        });
    }
    Ok(validated)
}

/// Destinations strictly inside `parent`, relative to it, without the ones
/// already covered by a shallower nested destination.
pub fn direct_children(parent: &Path, all: &[PathBuf]) -> Vec<PathBuf> {
    let mut inner: Vec<&PathBuf> = all
        .iter()
        .filter(|d| d.as_path() != parent && d.starts_with(parent))
        .collect();
    inner.sort();

    let mut direct: Vec<PathBuf> = Vec::new();
    for dest in inner {
        let Ok(relative) = dest.strip_prefix(parent) else {
            continue;
        };
        if !direct.iter().any(|d| relative.starts_with(d)) {
            direct.push(relative.to_path_buf());
        }
    }
    direct
}

pub struct PlannedEntry<'a> {
    pub entry: &'a DependencyEntry,
    pub destination: PathBuf,
    pub backend: &'a dyn Backend,
    pub action: Action,
    /// Destinations of other entries living inside this one.
    pub nested: Vec<PathBuf>,
}

pub struct Plan<'a> {
    root: PathBuf,
    entries: Vec<PlannedEntry<'a>>,
    groups: Vec<Vec<usize>>,
}

impl<'a> Plan<'a> {
    pub fn build(
        root: &Path,
        table: &'a DepsTable,
        backends: &'a BackendRegistry,
        filter: Option<&IdFilter>,
        adopt_unmanaged: bool,
    ) -> Result<Self, ConfigError> {
        let validated = validate(table, backends)?;

        if let Some(filter) = filter {
            for id in filter.ids() {
                if !table.contains(id) {
                    return Err(ConfigError::UnknownFilterId(id.to_string()));
                }
            }
        }

        let all_destinations: Vec<PathBuf> =
            validated.iter().map(|v| v.destination.clone()).collect();

        let mut entries = Vec::new();
        for item in validated {
            if filter.is_some_and(|f| !f.matches(&item.entry.id)) {
                continue;
            }
            check_no_symlink_escape(root, &item)?;

            let nested = direct_children(&item.destination, &all_destinations);
            let absolute = root.join(&item.destination);
            let inspection = marker::inspect_outer(&absolute, &nested).map_err(|e| {
                ConfigError::CorruptMarker {
                    path: absolute.clone(),
                    message: e.to_string(),
                }
            })?;
            let action = decide(
                &item.entry.id,
                &item.entry.revision,
                &inspection,
                adopt_unmanaged,
            )
            .map_err(|conflict| conflict_error(&item, conflict))?;
            debug!("plan: {} -> {:?}", item.entry.id, action);

            entries.push(PlannedEntry {
                entry: item.entry,
                nested,
                destination: item.destination,
                backend: item.backend,
                action,
            });
        }

        let groups = nesting_groups(&entries);
        Ok(Self {
            root: root.to_path_buf(),
            entries,
            groups,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[PlannedEntry<'a>] {
        &self.entries
    }

    /// Independent groups of entry indices; each group is in outer-to-inner
    /// order.
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn conflict_error(item: &Validated<'_>, conflict: Conflict) -> ConfigError {
    match conflict {
        Conflict::PathReused { owner } => ConfigError::PathReused {
            id: item.entry.id.clone(),
            path: item.destination.clone(),
            owner,
        },
        Conflict::Unmanaged => ConfigError::Unmanaged {
            id: item.entry.id.clone(),
            path: item.destination.clone(),
        },
    }
}

/// Refuses destinations reached through a symlink, which could point
/// anywhere.
fn check_no_symlink_escape(root: &Path, item: &Validated<'_>) -> Result<(), ConfigError> {
    let mut current = root.to_path_buf();
    for component in item.destination.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ConfigError::EscapesRoot {
                    id: item.entry.id.clone(),
                    path: item.entry.destination.clone(),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: current,
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Splits entries into groups connected by nesting, each topologically
/// ordered outer before inner.
fn nesting_groups(entries: &[PlannedEntry<'_>]) -> Vec<Vec<usize>> {
    let n = entries.len();
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(n, 0);
    let nodes: Vec<_> = (0..n).map(|i| graph.add_node(i)).collect();
    let mut sets = UnionFind::<usize>::new(n);

    for (i, outer) in entries.iter().enumerate() {
        for (j, inner) in entries.iter().enumerate() {
            if i != j && inner.destination.starts_with(&outer.destination) {
                graph.add_edge(nodes[i], nodes[j], ());
                sets.union(i, j);
            }
        }
    }

    let order: Vec<usize> = match toposort(&graph, None) {
        Ok(sorted) => sorted.into_iter().map(|node| graph[node]).collect(),
        // Distinct paths can't nest cyclically; depth order is equivalent.
        Err(_) => {
            let mut by_depth: Vec<usize> = (0..n).collect();
            by_depth.sort_by_key(|&i| entries[i].destination.components().count());
            by_depth
        }
    };

    let labels = sets.into_labeling();
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in order {
        groups.entry(labels[i]).or_default().push(i);
    }
    groups.into_values().collect()
}
