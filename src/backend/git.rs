//! Git backend built on libgit2.
//!
//! Updates reuse the object database of the previous checkout so only new
//! objects are transferred. The worktree itself is always checked out fresh,
//! detached at the pinned commit.

use super::{Backend, FetchRequest, copy_tree};
use crate::cancel::CancelToken;
use crate::error::FetchError;
use git2::build::CheckoutBuilder;
use git2::{AutotagOption, FetchOptions, Oid, RemoteCallbacks, Repository};
use regex::Regex;
use std::fs;
use std::sync::LazyLock;
use tracing::{debug, info};

static COMMIT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("valid commit id pattern"));

const REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

pub struct GitBackend {
    remote_name: String,
}

impl GitBackend {
    pub fn new() -> Self {
        Self {
            remote_name: "origin".to_string(),
        }
    }
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// URL handed to libgit2; `git+` is only a dispatch hint.
pub fn remote_url(locator: &str) -> &str {
    locator.strip_prefix("git+").unwrap_or(locator)
}

pub fn is_commit_id(revision: &str) -> bool {
    COMMIT_ID.is_match(revision)
}

impl Backend for GitBackend {
    fn name(&self) -> &'static str {
        "git"
    }

    fn handles(&self, locator: &str) -> bool {
        const SCHEMES: [&str; 5] = ["https://", "http://", "ssh://", "git://", "git+"];
        SCHEMES.iter().any(|s| locator.starts_with(s))
            || locator.starts_with("git@")
            || locator.ends_with(".git")
    }

    fn materialize(&self, request: &FetchRequest<'_>) -> Result<(), FetchError> {
        let url = remote_url(request.locator);

        if let Some(previous) = request.previous
            && previous.join(".git").is_dir()
        {
            copy_tree(
                &previous.join(".git"),
                &request.staging.join(".git"),
                request.cancel,
            )?;
            // The old index describes the old worktree, which isn't here.
            let _ = fs::remove_file(request.staging.join(".git").join("index"));
            debug!("git: reusing objects from {}", previous.display());
        }

        let repo = match Repository::open(request.staging) {
            Ok(repo) => repo,
            Err(_) => Repository::init(request.staging)?,
        };
        self.point_remote(&repo, url)?;

        // A full commit id already present locally needs no network. Anything
        // else (tags, branches) is refreshed first since it may have moved.
        let oid = match is_commit_id(request.revision)
            .then(|| resolve(&repo, &self.remote_name, request.revision))
            .flatten()
        {
            Some(oid) => oid,
            None => {
                self.fetch(&repo, request.revision, request.cancel)?;
                resolve(&repo, &self.remote_name, request.revision).ok_or_else(|| {
                    FetchError::RevisionNotFound {
                        revision: request.revision.to_string(),
                        locator: url.to_string(),
                    }
                })?
            }
        };

        request.cancel.check()?;
        let object = repo.find_object(oid, None)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().recreate_missing(true);
        repo.checkout_tree(&object, Some(&mut checkout))?;
        repo.set_head_detached(oid)?;

        info!("git: {} at {}", request.id, short_hash(&oid.to_string()));
        Ok(())
    }
}

impl GitBackend {
    fn point_remote(&self, repo: &Repository, url: &str) -> Result<(), FetchError> {
        match repo.find_remote(&self.remote_name) {
            Ok(remote) if remote.url() == Some(url) => Ok(()),
            Ok(_) => Ok(repo.remote_set_url(&self.remote_name, url)?),
            Err(_) => repo.remote(&self.remote_name, url).map(|_| ()).map_err(Into::into),
        }
    }

    fn fetch(&self, repo: &Repository, revision: &str, cancel: &CancelToken) -> Result<(), FetchError> {
        let mut remote = repo.find_remote(&self.remote_name)?;

        // Servers that allow fetching reachable commits by id save a full
        // ref download; fall back to heads and tags otherwise.
        if is_commit_id(revision) {
            let wanted = Oid::from_str(revision)?;
            match remote.fetch(&[revision], Some(&mut fetch_options(cancel)), None) {
                Ok(()) if repo.find_commit(wanted).is_ok() => return Ok(()),
                Ok(()) => {}
                Err(e) => {
                    cancel.check()?;
                    debug!("git: direct fetch of {revision} failed: {e}");
                }
            }
        }

        let mut options = fetch_options(cancel);
        options.download_tags(AutotagOption::All);
        match remote.fetch(&REFSPECS, Some(&mut options), None) {
            Ok(()) => Ok(()),
            Err(_) if cancel.is_cancelled() => Err(FetchError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

fn fetch_options(cancel: &CancelToken) -> FetchOptions<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |_| !cancel.is_cancelled());
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

/// Resolves a revision as a commit id, tag, remote branch, or revspec.
fn resolve(repo: &Repository, remote: &str, revision: &str) -> Option<Oid> {
    let candidates = [
        revision.to_string(),
        format!("refs/tags/{revision}"),
        format!("refs/remotes/{remote}/{revision}"),
    ];
    candidates.iter().find_map(|spec| {
        repo.revparse_single(spec)
            .ok()?
            .peel_to_commit()
            .ok()
            .map(|commit| commit.id())
    })
}

fn short_hash(rev: &str) -> &str {
    if rev.len() > 7 { &rev[..7] } else { rev }
}
