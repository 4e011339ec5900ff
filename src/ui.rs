//! Terminal output helpers.
//!
//! - [`Table`] renders rows in a box-drawn table that shrinks its widest
//!   columns to fit the terminal.
//! - [`outcome_label`] colours a sync outcome for status lines.
//!
//! ```rust
//! use depsync::ui::Table;
//!
//! let mut table = Table::new(&["Id", "Revision"]);
//! table.add_row(vec!["icu".to_string(), "364118a".to_string()]);
//! assert!(table.render_with_width(80).contains("icu"));
//! ```

use crate::sync::Outcome;
use colored::*;
use console::{measure_text_width, truncate_str};

/// Columns never shrink below this.
const MIN_COLUMN: usize = 8;

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are ignored.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) {
        let (_, width) = console::Term::stdout().size();
        print!("{}", self.render_with_width(width as usize));
    }

    pub fn render_with_width(&self, max_width: usize) -> String {
        if self.headers.is_empty() {
            return String::new();
        }
        let widths = self.column_widths(max_width);

        let border = |left: &str, mid: &str, right: &str| {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {left}{}{right}\n", segments.join(mid))
        };
        let line = |cells: &[String], bold: bool| {
            let mut out = String::from("  │");
            for (cell, &width) in cells.iter().zip(&widths) {
                let clean = sanitize(cell);
                let shown = truncate_str(&clean, width, "...");
                let padding = width.saturating_sub(measure_text_width(&shown));
                let shown = if bold {
                    shown.bold().to_string()
                } else {
                    shown.to_string()
                };
                out.push_str(&format!(" {shown}{} │", " ".repeat(padding)));
            }
            out.push('\n');
            out
        };

        let mut out = border("┌", "┬", "┐");
        out.push_str(&line(&self.headers, true));
        out.push_str(&border("├", "┼", "┤"));
        for row in &self.rows {
            out.push_str(&line(row, false));
        }
        out.push_str(&border("└", "┴", "┘"));
        out
    }

    fn column_widths(&self, max_width: usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self
            .headers
            .iter()
            .map(|h| measure_text_width(h))
            .collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(measure_text_width(&sanitize(cell)));
            }
        }

        // Indent, outer borders and " x │" padding per column.
        let overhead = 3 + 3 * widths.len();
        let available = max_width.saturating_sub(overhead);
        let mut total: usize = widths.iter().sum();
        while total > available {
            let Some((widest, &w)) = widths.iter().enumerate().max_by_key(|&(_, w)| *w) else {
                break;
            };
            if w <= MIN_COLUMN {
                break;
            }
            widths[widest] -= 1;
            total -= 1;
        }
        widths
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            _ => c,
        })
        .collect()
}

pub fn outcome_label(outcome: &Outcome) -> ColoredString {
    let text = outcome.to_string();
    match outcome {
        Outcome::AlreadyCurrent => text.dimmed(),
        Outcome::FetchedNew | Outcome::Updated { .. } => text.green(),
        Outcome::WouldFetch | Outcome::WouldUpdate { .. } => text.yellow(),
        Outcome::Failed { .. } => text.red().bold(),
    }
}

/// Status glyph shown before a per-entry line.
pub fn outcome_glyph(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::AlreadyCurrent => "=".dimmed(),
        Outcome::FetchedNew | Outcome::Updated { .. } => "✓".green(),
        Outcome::WouldFetch | Outcome::WouldUpdate { .. } => "~".yellow(),
        Outcome::Failed { .. } => "x".red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_render_aligns_columns() {
        plain();
        let mut table = Table::new(&["Id", "Revision"]);
        table.add_row(vec!["icu".into(), "364118a".into()]);
        table.add_row(vec!["zlib-ng".into(), "r1".into()]);
        table.add_row(vec!["dropped".into()]);

        let out = table.render_with_width(200);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines.iter().all(|l| measure_text_width(l) == measure_text_width(lines[0])));
        assert!(out.contains("│ zlib-ng │ r1       │"));
    }

    #[test]
    fn test_render_truncates_to_width() {
        plain();
        let mut table = Table::new(&["Id", "Path"]);
        table.add_row(vec![
            "chromium.googlesource.com/chromium/deps/icu".into(),
            "third_party/externals/icu".into(),
        ]);
        let out = table.render_with_width(40);
        assert!(out.lines().all(|l| measure_text_width(l) <= 40));
        assert!(out.contains("..."));
    }
}
