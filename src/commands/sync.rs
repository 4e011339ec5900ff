//! `depsync sync` and `depsync status`.

use super::{Context, EXIT_FAILURE, EXIT_SUCCESS};
use crate::backend::BackendRegistry;
use crate::cancel::CancelToken;
use crate::plan::IdFilter;
use crate::sync::{self, EntryReport, Progress, Silent, SyncOptions, SyncReport};
use crate::ui::{self, Table};
use anyhow::Result;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

pub struct SyncArgs {
    pub dry_run: bool,
    pub parallelism: Option<usize>,
    pub only: Option<IdFilter>,
}

/// Progress bar with one printed line per finished entry.
struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        Self { pb }
    }
}

impl Progress for BarProgress {
    fn begin(&self, total: usize) {
        self.pb.set_length(total as u64);
    }

    fn started(&self, id: &str) {
        self.pb.set_message(id.to_string());
    }

    fn finished(&self, report: &EntryReport) {
        // A hidden bar (stdout not a terminal) drops println.
        if self.pb.is_hidden() {
            println!("{}", entry_line(report));
        } else {
            self.pb.println(entry_line(report));
        }
        self.pb.inc(1);
    }
}

fn entry_line(report: &EntryReport) -> String {
    format!(
        "{} {} {} {}",
        ui::outcome_glyph(&report.outcome),
        report.id.bold(),
        report.destination.display().to_string().dimmed(),
        ui::outcome_label(&report.outcome)
    )
}

fn options(ctx: &Context, dry_run: bool, parallelism: Option<usize>, only: Option<IdFilter>) -> SyncOptions {
    SyncOptions {
        parallelism: parallelism
            .or(ctx.config.sync.parallelism)
            .unwrap_or_else(sync::default_parallelism),
        dry_run,
        filter: only,
        adopt_unmanaged: ctx.config.sync.adopt_unmanaged,
    }
}

pub fn run_sync(ctx: &Context, args: SyncArgs, cancel: &CancelToken) -> Result<u8> {
    let options = options(ctx, args.dry_run, args.parallelism, args.only);
    let backends = BackendRegistry::default();

    if args.dry_run {
        println!("{} Dry run, nothing will be written.", "ℹ".blue());
    }
    let bar = BarProgress::new();
    let result = sync::sync(&ctx.root, &ctx.table, &options, &backends, cancel, &bar);
    bar.pb.finish_and_clear();
    let report = result?;

    print_summary(&report);
    Ok(if report.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

pub fn run_status(ctx: &Context, only: Option<IdFilter>) -> Result<u8> {
    let mut options = options(ctx, true, None, only);
    options.parallelism = 1;
    let report = sync::sync(
        &ctx.root,
        &ctx.table,
        &options,
        &BackendRegistry::default(),
        &CancelToken::new(),
        &Silent,
    )?;

    let mut table = Table::new(&["Id", "Path", "Revision", "Backend", "Status"]);
    for entry in &report.entries {
        table.add_row(vec![
            entry.id.bold().to_string(),
            entry.destination.display().to_string(),
            entry.revision.clone(),
            entry.backend.clone(),
            ui::outcome_label(&entry.outcome).to_string(),
        ]);
    }
    if table.is_empty() {
        println!("{} No entries in {}.", "ℹ".blue(), ctx.table_path.display());
    } else {
        table.print();
    }
    print_summary(&report);
    Ok(EXIT_SUCCESS)
}

fn print_summary(report: &SyncReport) {
    let summary = report.summary();
    let mut parts = Vec::new();
    if summary.fetched > 0 {
        parts.push(format!("{} fetched", summary.fetched).green().to_string());
    }
    if summary.updated > 0 {
        parts.push(format!("{} updated", summary.updated).green().to_string());
    }
    if summary.pending > 0 {
        parts.push(format!("{} pending", summary.pending).yellow().to_string());
    }
    if summary.current > 0 {
        parts.push(format!("{} current", summary.current).dimmed().to_string());
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed).red().bold().to_string());
    }
    if parts.is_empty() {
        parts.push("nothing to do".dimmed().to_string());
    }

    let glyph = if report.is_success() {
        "✓".green()
    } else {
        "x".red()
    };
    println!("{glyph} {}", parts.join(", "));

    for failure in report.failures() {
        println!("   {} {}", failure.id.red(), failure.outcome);
    }
    if summary.cancelled > 0 {
        println!(
            "   {} entries were cancelled; run {} again to finish.",
            summary.cancelled,
            "depsync sync".cyan().bold()
        );
    }
}
