//! `depsync prune`.

use super::{Context, EXIT_SUCCESS};
use crate::prune::{self, PruneAction};
use anyhow::Result;
use colored::*;

pub fn run_prune(ctx: &Context, dry_run: bool) -> Result<u8> {
    let report = prune::prune(&ctx.root, &ctx.table, dry_run)?;
    if report.entries.is_empty() {
        println!("{} Nothing to prune.", "✓".green());
        return Ok(EXIT_SUCCESS);
    }

    for entry in &report.entries {
        let (glyph, label) = match entry.action {
            PruneAction::Removed => ("-".red(), "removed".red()),
            PruneAction::WouldRemove => ("~".yellow(), "would remove".yellow()),
            PruneAction::Forgotten => ("·".dimmed(), "forgotten (not ours on disk)".dimmed()),
            PruneAction::Kept => ("=".dimmed(), "kept (path still in use)".dimmed()),
        };
        println!(
            "{} {} {} {}",
            glyph,
            entry.id.bold(),
            entry.path.display().to_string().dimmed(),
            label
        );
    }

    let verb = if dry_run { "would be removed" } else { "removed" };
    println!("{} {} {}", "✓".green(), report.removed(), verb);
    Ok(EXIT_SUCCESS)
}
