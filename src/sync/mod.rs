//! The synchronization run.
//!
//! [`sync`] validates and plans the whole table before touching disk, then
//! hands independent groups of entries to a bounded worker pool. Inside a
//! group, entries run outer-to-inner. A failure only marks its own entry as
//! failed; the destination keeps its previous content.
//!
//! ```no_run
//! use depsync::backend::BackendRegistry;
//! use depsync::cancel::CancelToken;
//! use depsync::sync::{self, Silent, SyncOptions};
//! use depsync::table::DepsTable;
//! use std::path::Path;
//!
//! let table = DepsTable::load(Path::new("DEPS.toml"))?;
//! let report = sync::sync(
//!     Path::new("."),
//!     &table,
//!     &SyncOptions::default(),
//!     &BackendRegistry::default(),
//!     &CancelToken::new(),
//!     &Silent,
//! )?;
//! assert!(report.is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod report;
mod transaction;

pub use report::{EntryReport, FailureReason, Outcome, Summary, SyncReport};

use crate::backend::BackendRegistry;
use crate::cancel::CancelToken;
use crate::error::{ConfigError, FetchError, SyncError};
use crate::marker;
use crate::plan::{self, Action, Conflict, IdFilter, Plan, PlannedEntry};
use crate::state::{RunState, StateLayout};
use crate::table::DepsTable;
use rayon::prelude::*;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};
use transaction::Materialization;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum number of concurrent fetches.
    pub parallelism: usize,
    /// Inspect and report without writing anything.
    pub dry_run: bool,
    pub filter: Option<IdFilter>,
    /// Replace existing content that has no revision marker.
    pub adopt_unmanaged: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            dry_run: false,
            filter: None,
            adopt_unmanaged: false,
        }
    }
}

pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Observer for run progress. Called from worker threads.
pub trait Progress: Sync {
    fn begin(&self, _total: usize) {}
    fn started(&self, _id: &str) {}
    fn finished(&self, _report: &EntryReport) {}
}

/// Progress that reports nothing.
pub struct Silent;

impl Progress for Silent {}

pub fn sync(
    root: &Path,
    table: &DepsTable,
    options: &SyncOptions,
    backends: &BackendRegistry,
    cancel: &CancelToken,
    progress: &dyn Progress,
) -> Result<SyncReport, SyncError> {
    if options.parallelism == 0 {
        return Err(ConfigError::InvalidParallelism.into());
    }

    let plan = Plan::build(
        root,
        table,
        backends,
        options.filter.as_ref(),
        options.adopt_unmanaged,
    )?;
    debug!(
        "planned {} entries in {} groups",
        plan.len(),
        plan.groups().len()
    );

    if options.dry_run {
        return Ok(dry_run_report(&plan, progress));
    }

    let layout = StateLayout::new(root);
    let _lock = layout.lock()?;
    let restored = transaction::recover(&layout).map_err(|source| SyncError::State {
        path: layout.dir(),
        source,
    })?;
    if restored > 0 {
        warn!("restored {restored} destinations left by an interrupted run");
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.parallelism)
        .build()
        .map_err(|e| SyncError::Pool(e.to_string()))?;

    progress.begin(plan.len());
    let reports = Mutex::new(Vec::with_capacity(plan.len()));
    pool.install(|| {
        plan.groups().par_iter().for_each(|group| {
            for &index in group {
                let planned = &plan.entries()[index];
                progress.started(&planned.entry.id);
                let report = run_entry(&plan, planned, options, &layout, cancel);
                progress.finished(&report);
                reports
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(report);
            }
        });
    });

    let report = SyncReport::new(
        false,
        reports.into_inner().unwrap_or_else(PoisonError::into_inner),
    );
    record_state(&layout, &report, table)?;
    info!("sync finished: {:?}", report.summary());
    Ok(report)
}

fn dry_run_report(plan: &Plan<'_>, progress: &dyn Progress) -> SyncReport {
    progress.begin(plan.len());
    let entries = plan
        .entries()
        .iter()
        .map(|planned| {
            let outcome = match &planned.action {
                Action::Current => Outcome::AlreadyCurrent,
                Action::Fetch => Outcome::WouldFetch,
                Action::Update { from } => Outcome::WouldUpdate { from: from.clone() },
            };
            let report = entry_report(planned, outcome);
            progress.finished(&report);
            report
        })
        .collect();
    SyncReport::new(true, entries)
}

fn run_entry(
    plan: &Plan<'_>,
    planned: &PlannedEntry<'_>,
    options: &SyncOptions,
    layout: &StateLayout,
    cancel: &CancelToken,
) -> EntryReport {
    let outcome = match execute(plan, planned, options, layout, cancel) {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => Outcome::failed(FailureReason::Cancelled),
        Err(e) => {
            warn!("{}: {e}", planned.entry.id);
            Outcome::failed(FailureReason::Fetch(e.to_string()))
        }
    };
    entry_report(planned, outcome)
}

fn execute(
    plan: &Plan<'_>,
    planned: &PlannedEntry<'_>,
    options: &SyncOptions,
    layout: &StateLayout,
    cancel: &CancelToken,
) -> Result<Outcome, FetchError> {
    cancel.check()?;

    // An outer entry earlier in the group may have replaced this tree.
    let destination = plan.root().join(&planned.destination);
    let inspection = marker::inspect_outer(&destination, &planned.nested)
        .map_err(|e| FetchError::Marker(e.to_string()))?;
    let action = plan::decide(
        &planned.entry.id,
        &planned.entry.revision,
        &inspection,
        options.adopt_unmanaged,
    )
    .map_err(|conflict| match conflict {
        Conflict::PathReused { owner } => FetchError::PathReused {
            path: planned.destination.clone(),
            owner,
        },
        Conflict::Unmanaged => FetchError::Unmanaged(planned.destination.clone()),
    })?;

    let outcome = match action {
        Action::Current => return Ok(Outcome::AlreadyCurrent),
        Action::Fetch => Outcome::FetchedNew,
        Action::Update { from } => Outcome::Updated { from },
    };

    let job = Materialization {
        entry: planned.entry,
        backend: planned.backend,
        destination,
        nested: &planned.nested,
    };
    transaction::materialize(&job, layout, cancel)?;
    Ok(outcome)
}

fn entry_report(planned: &PlannedEntry<'_>, outcome: Outcome) -> EntryReport {
    EntryReport {
        id: planned.entry.id.clone(),
        destination: planned.destination.clone(),
        revision: planned.entry.revision.clone(),
        backend: planned.backend.name().to_string(),
        outcome,
    }
}

/// Remembers every entry that is now pinned so `prune` can find it later.
fn record_state(
    layout: &StateLayout,
    report: &SyncReport,
    table: &DepsTable,
) -> Result<(), SyncError> {
    let mut state = RunState::load(layout)?;
    for entry_report in report.entries.iter().filter(|e| !e.outcome.is_failure()) {
        if let Some(entry) = table.get(&entry_report.id) {
            state.insert(
                &entry.id,
                &entry_report.destination.to_string_lossy(),
                &entry.revision,
                &entry.locator,
            );
        }
    }
    state.save(layout)
}
