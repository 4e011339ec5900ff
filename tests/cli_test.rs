//! Exit codes and output of the `depsync` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn depsync(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_depsync"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("DEPSYNC_LOG")
        .output()
        .expect("failed to run depsync")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Mirror with `icu/r1`, `icu/r2` and `zlib/r1`, plus a root holding a
/// DEPS.toml that pins both entries.
fn project(icu_revision: &str) -> (tempfile::TempDir, tempfile::TempDir) {
    let mirror = tempfile::tempdir().unwrap();
    for (name, rev) in [("icu", "r1"), ("icu", "r2"), ("zlib", "r1")] {
        let dir = mirror.path().join(name).join(rev);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("VERSION"), format!("{name} {rev}")).unwrap();
    }
    let root = tempfile::tempdir().unwrap();
    write_table(root.path(), mirror.path(), icu_revision);
    (mirror, root)
}

fn write_table(root: &Path, mirror: &Path, icu_revision: &str) {
    let table = format!(
        r#"
[deps.icu]
version = "{icu_revision}"
path = "third_party/externals/icu"
locator = 'file://{mirror}/icu'

[deps.zlib]
version = "r1"
path = "third_party/externals/zlib"
locator = 'file://{mirror}/zlib'
"#,
        mirror = mirror.display()
    );
    fs::write(root.join("DEPS.toml"), table).unwrap();
}

#[test]
fn test_sync_then_status() {
    let (_mirror, root) = project("r1");

    let output = depsync(root.path(), &["sync", "-j", "2"]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert!(root.path().join("third_party/externals/icu/VERSION").exists());

    let output = depsync(root.path(), &["status"]);
    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.contains("icu"));
    assert!(text.contains("already-current"));
}

#[test]
fn test_dry_run_reports_pending_update() {
    let (mirror, root) = project("r1");
    assert_eq!(depsync(root.path(), &["sync"]).status.code(), Some(0));

    write_table(root.path(), mirror.path(), "r2");
    let output = depsync(root.path(), &["sync", "--dry-run"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("would-update (was r1)"));
    assert_eq!(
        fs::read_to_string(root.path().join("third_party/externals/icu/VERSION")).unwrap(),
        "icu r1"
    );
}

#[test]
fn test_failed_entry_exits_one() {
    let (_mirror, root) = project("r9");
    let output = depsync(root.path(), &["sync"]);
    assert_eq!(output.status.code(), Some(1));
    // The sibling still landed.
    assert!(root.path().join("third_party/externals/zlib/VERSION").exists());
}

#[test]
fn test_configuration_errors_exit_two() {
    let (_mirror, root) = project("r1");

    let output = depsync(root.path(), &["sync", "--only", "nope"]);
    assert_eq!(output.status.code(), Some(2));

    let output = depsync(root.path(), &["sync", "-j", "0"]);
    assert_eq!(output.status.code(), Some(2));

    let empty = tempfile::tempdir().unwrap();
    let output = depsync(empty.path(), &["list"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("DEPS.toml"));
}

#[test]
fn test_list_and_prune() {
    let (mirror, root) = project("r1");
    let output = depsync(root.path(), &["list"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("mirror"));

    assert_eq!(depsync(root.path(), &["sync"]).status.code(), Some(0));

    // Drop zlib from the table.
    let table = format!(
        "[deps.icu]\nversion = \"r1\"\npath = \"third_party/externals/icu\"\nlocator = 'file://{}/icu'\n",
        mirror.path().display()
    );
    fs::write(root.path().join("DEPS.toml"), table).unwrap();

    let output = depsync(root.path(), &["prune", "--dry-run"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("zlib"));
    assert!(root.path().join("third_party/externals/zlib").exists());

    assert_eq!(depsync(root.path(), &["prune"]).status.code(), Some(0));
    assert!(!root.path().join("third_party/externals/zlib").exists());
    assert!(root.path().join("third_party/externals/icu/VERSION").exists());
}

#[test]
fn test_completion_needs_no_table() {
    let empty = tempfile::tempdir().unwrap();
    let output = depsync(empty.path(), &["completion", "bash"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("depsync"));
}
