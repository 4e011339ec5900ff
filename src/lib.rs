//! # depsync - pinned dependency synchronizer
//!
//! depsync reads a generated table of `id -> { revision, path }` entries and
//! makes the working tree match it: every destination ends up holding its
//! entry's pinned revision, or the entry is reported as failed and its
//! previous content is left intact.
//!
//! ## Features
//!
//! - **Idempotent**: a revision marker in each destination makes re-runs
//!   report `already-current` without touching the network
//! - **Parallel**: independent trees are fetched on a bounded worker pool;
//!   nested destinations run outer before inner
//! - **Transactional**: content is staged and swapped in with renames that
//!   roll back on failure
//! - **Pluggable backends**: git, local mirrors and zip archives
//!
//! ## Quick Start
//!
//! ```bash
//! depsync status
//! depsync sync -j 8
//! ```
//!
//! ## Module Organization
//!
//! - [`table`] - Loading the dependency table
//! - [`plan`] - Validation and scheduling
//! - [`sync`] - The synchronization run
//! - [`backend`] - Fetch strategies
//! - [`commands`] - CLI command handlers

/// Fetch backends and their registry.
pub mod backend;

/// Cooperative cancellation and Ctrl-C handling.
pub mod cancel;

/// CLI command handlers.
pub mod commands;

/// Project configuration (`depsync.toml`).
pub mod config;

/// Error types.
pub mod error;

/// Per-destination revision markers.
pub mod marker;

/// Table validation, inspection and scheduling.
pub mod plan;

/// Removal of checkouts that left the table.
pub mod prune;

/// The `.depsync/` state directory.
pub mod state;

/// Synchronization runs and their reports.
pub mod sync;

/// Dependency table loading (`DEPS.toml` / `DEPS.json`).
pub mod table;

/// Terminal UI utilities (tables, colors).
pub mod ui;
