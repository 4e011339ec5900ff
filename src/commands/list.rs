//! `depsync list`: the table as depsync reads it.

use super::{Context, EXIT_SUCCESS};
use crate::backend::BackendRegistry;
use crate::ui::Table;
use anyhow::Result;
use colored::*;

pub fn run_list(ctx: &Context) -> Result<u8> {
    let backends = BackendRegistry::default();
    let mut table = Table::new(&["Id", "Revision", "Path", "Locator", "Backend"]);
    for entry in ctx.table.entries() {
        let backend = match backends.resolve(&entry.locator) {
            Some(backend) => backend.name().cyan().to_string(),
            None => "none".red().to_string(),
        };
        table.add_row(vec![
            entry.id.bold().to_string(),
            entry.revision.clone(),
            entry.destination.clone(),
            entry.locator.clone(),
            backend,
        ]);
    }

    if table.is_empty() {
        println!("{} No entries in {}.", "ℹ".blue(), ctx.table_path.display());
    } else {
        table.print();
        println!(
            "   {} entries from {}, backends tried in order: {}",
            ctx.table.len(),
            ctx.table_path.display().to_string().dimmed(),
            backends.names().join(", ")
        );
    }
    Ok(EXIT_SUCCESS)
}
