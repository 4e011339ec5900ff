//! Local mirror backend.
//!
//! A mirror is a directory holding one subdirectory per revision:
//!
//! ```text
//! /srv/mirror/
//!   r1/...
//!   r2/...
//! ```
//!
//! Materializing copies `<mirror>/<revision>/` in full, so nothing from a
//! previous revision survives an update.

use super::{Backend, FetchRequest, copy_tree, is_single_component, split_fragment};
use crate::error::FetchError;
use std::path::PathBuf;
use tracing::debug;

pub struct MirrorBackend;

const SCHEME: &str = "file://";

impl Backend for MirrorBackend {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn handles(&self, locator: &str) -> bool {
        let (url, _) = split_fragment(locator);
        url.starts_with(SCHEME) && !url.ends_with(".zip") && !url.ends_with(".git")
    }

    fn materialize(&self, request: &FetchRequest<'_>) -> Result<(), FetchError> {
        if !is_single_component(request.revision) {
            return Err(FetchError::InvalidRevision(request.revision.to_string()));
        }

        let (url, _) = split_fragment(request.locator);
        let base = PathBuf::from(&url[SCHEME.len()..]);
        let source = base.join(request.revision);
        if !source.is_dir() {
            return Err(FetchError::RevisionNotFound {
                revision: request.revision.to_string(),
                locator: request.locator.to_string(),
            });
        }

        let copied = copy_tree(&source, request.staging, request.cancel)?;
        debug!("mirror: copied {copied} files for {}", request.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use std::fs;

    #[test]
    fn test_copies_revision_directory() {
        let mirror = tempfile::tempdir().unwrap();
        fs::create_dir_all(mirror.path().join("r1/include")).unwrap();
        fs::write(mirror.path().join("r1/include/lib.h"), "// r1").unwrap();
        let staging = tempfile::tempdir().unwrap();
        let locator = format!("file://{}", mirror.path().display());

        MirrorBackend
            .materialize(&FetchRequest {
                id: "lib",
                locator: &locator,
                revision: "r1",
                staging: staging.path(),
                previous: None,
                cancel: &CancelToken::new(),
            })
            .unwrap();

        assert_eq!(
            fs::read_to_string(staging.path().join("include/lib.h")).unwrap(),
            "// r1"
        );
    }

    #[test]
    fn test_missing_revision() {
        let mirror = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let locator = format!("file://{}", mirror.path().display());

        let err = MirrorBackend
            .materialize(&FetchRequest {
                id: "lib",
                locator: &locator,
                revision: "r9",
                staging: staging.path(),
                previous: None,
                cancel: &CancelToken::new(),
            })
            .unwrap_err();
        assert!(matches!(err, FetchError::RevisionNotFound { .. }));
    }

    #[test]
    fn test_rejects_traversal_revision() {
        let staging = tempfile::tempdir().unwrap();
        let err = MirrorBackend
            .materialize(&FetchRequest {
                id: "lib",
                locator: "file:///srv/mirror",
                revision: "../etc",
                staging: staging.path(),
                previous: None,
                cancel: &CancelToken::new(),
            })
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRevision(_)));
    }
}
