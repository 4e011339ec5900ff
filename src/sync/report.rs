use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "kebab-case")]
pub enum FailureReason {
    Cancelled,
    Fetch(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::Fetch(message) => write!(f, "{message}"),
        }
    }
}

/// Result of one entry in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    AlreadyCurrent,
    FetchedNew,
    Updated { from: Option<String> },
    WouldFetch,
    WouldUpdate { from: Option<String> },
    Failed { reason: FailureReason },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::AlreadyCurrent => "already-current",
            Outcome::FetchedNew => "fetched-new",
            Outcome::Updated { .. } => "updated",
            Outcome::WouldFetch => "would-fetch",
            Outcome::WouldUpdate { .. } => "would-update",
            Outcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn failed(reason: FailureReason) -> Self {
        Outcome::Failed { reason }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Updated { from: Some(from) } | Outcome::WouldUpdate { from: Some(from) } => {
                write!(f, "{} (was {})", self.label(), from)
            }
            Outcome::Failed { reason } => write!(f, "failed({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub id: String,
    pub destination: PathBuf,
    pub revision: String,
    pub backend: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub current: usize,
    pub fetched: usize,
    pub updated: usize,
    pub pending: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub entries: Vec<EntryReport>,
}

impl SyncReport {
    /// Entries are sorted by id regardless of completion order.
    pub fn new(dry_run: bool, mut entries: Vec<EntryReport>) -> Self {
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Self { dry_run, entries }
    }

    pub fn is_success(&self) -> bool {
        !self.entries.iter().any(|e| e.outcome.is_failure())
    }

    pub fn get(&self, id: &str) -> Option<&EntryReport> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn outcome(&self, id: &str) -> Option<&Outcome> {
        self.get(id).map(|e| &e.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| e.outcome.is_failure())
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for entry in &self.entries {
            match &entry.outcome {
                Outcome::AlreadyCurrent => summary.current += 1,
                Outcome::FetchedNew => summary.fetched += 1,
                Outcome::Updated { .. } => summary.updated += 1,
                Outcome::WouldFetch | Outcome::WouldUpdate { .. } => summary.pending += 1,
                Outcome::Failed {
                    reason: FailureReason::Cancelled,
                } => {
                    summary.failed += 1;
                    summary.cancelled += 1;
                }
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}
