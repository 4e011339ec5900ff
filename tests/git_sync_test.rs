//! Synchronization against local git repositories.

use depsync::backend::BackendRegistry;
use depsync::cancel::CancelToken;
use depsync::marker::RevisionMarker;
use depsync::sync::{self, Outcome, Silent, SyncOptions};
use depsync::table::{DependencyEntry, DepsTable};
use git2::{Oid, Repository, Signature};
use std::fs;
use std::path::Path;

fn commit_file(repo: &Repository, name: &str, content: &str) -> Oid {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(name), content).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("depsync", "depsync@example.com").unwrap();
    let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, content, &tree, &parents)
        .unwrap()
}

fn run(root: &Path, table: &DepsTable) -> sync::SyncReport {
    sync::sync(
        root,
        table,
        &SyncOptions {
            parallelism: 2,
            ..SyncOptions::default()
        },
        &BackendRegistry::default(),
        &CancelToken::new(),
        &Silent,
    )
    .unwrap()
}

#[test]
fn test_git_entry_pins_commit_then_tag() {
    let upstream_dir = tempfile::tempdir().unwrap();
    let upstream = Repository::init(upstream_dir.path()).unwrap();
    let first = commit_file(&upstream, "zlib.h", "1.2");
    upstream
        .tag_lightweight("v1.2", &upstream.find_object(first, None).unwrap(), false)
        .unwrap();
    let second = commit_file(&upstream, "zlib.h", "1.3");

    let locator = format!("git+file://{}", upstream_dir.path().display());
    let entry = |revision: &str| {
        DepsTable::from_entries(vec![
            DependencyEntry::new("zlib", revision, "third_party/externals/zlib")
                .with_locator(&locator),
        ])
    };
    let root = tempfile::tempdir().unwrap();
    let dest = root.path().join("third_party/externals/zlib");

    let report = run(root.path(), &entry(&second.to_string()));
    assert_eq!(report.outcome("zlib"), Some(&Outcome::FetchedNew));
    assert_eq!(report.get("zlib").unwrap().backend, "git");
    assert_eq!(fs::read_to_string(dest.join("zlib.h")).unwrap(), "1.3");

    let report = run(root.path(), &entry(&second.to_string()));
    assert_eq!(report.outcome("zlib"), Some(&Outcome::AlreadyCurrent));

    let report = run(root.path(), &entry("v1.2"));
    assert!(matches!(report.outcome("zlib"), Some(Outcome::Updated { .. })));
    assert_eq!(fs::read_to_string(dest.join("zlib.h")).unwrap(), "1.2");

    let checkout = Repository::open(&dest).unwrap();
    assert_eq!(checkout.head().unwrap().target(), Some(first));
    let marker = RevisionMarker::read(&dest).unwrap().unwrap();
    assert_eq!(marker.revision, "v1.2");
    assert_eq!(marker.backend, "git");
}

#[test]
fn test_git_unknown_revision_fails_entry() {
    let upstream_dir = tempfile::tempdir().unwrap();
    let upstream = Repository::init(upstream_dir.path()).unwrap();
    commit_file(&upstream, "README", "hello");

    let locator = format!("git+file://{}", upstream_dir.path().display());
    let table = DepsTable::from_entries(vec![
        DependencyEntry::new("repo", "does-not-exist", "repo").with_locator(&locator),
    ]);
    let root = tempfile::tempdir().unwrap();
    let report = run(root.path(), &table);

    assert!(!report.is_success());
    assert!(report.outcome("repo").unwrap().is_failure());
    assert!(!root.path().join("repo").exists());
}
