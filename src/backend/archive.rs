//! Zip archive backend.
//!
//! Locators look like `https://host/pkg-{revision}.zip#sha256=<hex>`. The
//! `{revision}` placeholder is substituted, the archive is downloaded (or
//! opened from `file://`), checked against the optional digest, and
//! extracted. A single top-level directory inside the archive is stripped.

use super::{Backend, FetchRequest, split_fragment};
use crate::cancel::CancelToken;
use crate::error::FetchError;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub struct ArchiveBackend {
    agent: ureq::Agent,
}

impl ArchiveBackend {
    pub fn new() -> Self {
        Self {
            agent: ureq::agent(),
        }
    }
}

impl Default for ArchiveBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for ArchiveBackend {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn handles(&self, locator: &str) -> bool {
        let (url, _) = split_fragment(locator);
        let remote = url.starts_with("https://") || url.starts_with("http://");
        (remote || url.starts_with("file://")) && url.ends_with(".zip")
    }

    fn materialize(&self, request: &FetchRequest<'_>) -> Result<(), FetchError> {
        let (template, fragment) = split_fragment(request.locator);
        let url = template.replace("{revision}", request.revision);
        let expected = fragment.and_then(|f| f.strip_prefix("sha256="));

        // Download next to staging, never inside it.
        let scratch = request.staging.parent().unwrap_or(request.staging);
        let mut download = NamedTempFile::new_in(scratch)?;
        self.download(&url, download.as_file_mut(), request.cancel)?;
        download.as_file().sync_all()?;

        verify_sha256(download.path(), expected)?;
        let extracted = extract_zip(download.path(), request.staging, request.cancel)?;
        info!("archive: extracted {extracted} files for {}", request.id);
        Ok(())
    }
}

impl ArchiveBackend {
    fn download(&self, url: &str, out: &mut fs::File, cancel: &CancelToken) -> Result<(), FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            let mut file = fs::File::open(path)?;
            return copy_with_cancel(&mut file, out, cancel);
        }

        debug!("archive: GET {url}");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| FetchError::Http(format!("{url}: {e}")))?;
        let mut reader = response.into_body().into_reader();
        copy_with_cancel(&mut reader, out, cancel)
    }
}

fn copy_with_cancel(
    reader: &mut impl Read,
    writer: &mut impl Write,
    cancel: &CancelToken,
) -> Result<(), FetchError> {
    let mut buffer = [0u8; 64 * 1024];
    loop {
        cancel.check()?;
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n])?;
    }
    writer.flush()?;
    Ok(())
}

/// Checks a file's SHA-256 against `expected`. No expectation passes.
pub fn verify_sha256(path: &Path, expected: Option<&str>) -> Result<(), FetchError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let actual = format!("{:x}", hasher.finalize());

    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(FetchError::Checksum {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Extracts `archive` into `dest`, refusing entries that would land outside.
pub fn extract_zip(archive: &Path, dest: &Path, cancel: &CancelToken) -> Result<u64, FetchError> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| FetchError::Archive(e.to_string()))?;

    let mut names = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip
            .by_index(i)
            .map_err(|e| FetchError::Archive(e.to_string()))?;
        let name = entry
            .enclosed_name()
            .ok_or_else(|| FetchError::Archive(format!("unsafe entry path '{}'", entry.name())))?;
        names.push((name, entry.is_dir()));
    }
    let strip = common_root(&names);

    let mut extracted = 0;
    for (i, (name, is_dir)) in names.iter().enumerate() {
        cancel.check()?;
        let relative = match &strip {
            Some(root) => match name.strip_prefix(root) {
                Ok(rest) if rest.as_os_str().is_empty() => continue,
                Ok(rest) => rest.to_path_buf(),
                Err(_) => name.clone(),
            },
            None => name.clone(),
        };
        let target = dest.join(&relative);

        if *is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entry = zip
            .by_index(i)
            .map_err(|e| FetchError::Archive(e.to_string()))?;
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        set_mode(&target, entry.unix_mode())?;
        extracted += 1;
    }
    Ok(extracted)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// The single top-level directory every entry lives under, if there is one.
fn common_root(names: &[(PathBuf, bool)]) -> Option<PathBuf> {
    let mut root: Option<&std::ffi::OsStr> = None;
    let mut nested = false;
    for (name, is_dir) in names {
        let mut components = name.components();
        let first = match components.next() {
            Some(Component::Normal(first)) => first,
            _ => return None,
        };
        match root {
            None => root = Some(first),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }
        if components.next().is_some() {
            nested = true;
        } else if !is_dir {
            // A plain file at the top level.
            return None;
        }
    }
    if nested { root.map(PathBuf::from) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn sha256_of(path: &Path) -> String {
        format!("{:x}", Sha256::digest(fs::read(path).unwrap()))
    }

    #[test]
    fn test_extract_strips_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        write_zip(
            &archive,
            &[("pkg-1.0/include/a.h", "a"), ("pkg-1.0/README", "r")],
        );
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let n = extract_zip(&archive, &dest, &CancelToken::new()).unwrap();
        assert_eq!(n, 2);
        assert!(dest.join("include/a.h").exists());
        assert!(dest.join("README").exists());
    }

    #[test]
    fn test_extract_keeps_flat_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("flat.zip");
        write_zip(&archive, &[("ninja", "bin"), ("LICENSE", "l")]);
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        extract_zip(&archive, &dest, &CancelToken::new()).unwrap();
        assert!(dest.join("ninja").exists());
        assert!(dest.join("LICENSE").exists());
    }

    #[test]
    fn test_verify_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        fs::write(&path, "hello").unwrap();
        let digest = sha256_of(&path);

        assert!(verify_sha256(&path, None).is_ok());
        assert!(verify_sha256(&path, Some(&digest.to_uppercase())).is_ok());
        assert!(matches!(
            verify_sha256(&path, Some("00")),
            Err(FetchError::Checksum { .. })
        ));
    }

    #[test]
    fn test_materialize_file_locator_with_revision_and_digest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tool-v2.zip");
        write_zip(&archive, &[("tool/bin/tool", "v2")]);
        let digest = sha256_of(&archive);
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();

        let locator = format!(
            "file://{}/tool-{{revision}}.zip#sha256={digest}",
            dir.path().display()
        );
        let backend = ArchiveBackend::new();
        assert!(backend.handles(&locator));
        backend
            .materialize(&FetchRequest {
                id: "tool",
                locator: &locator,
                revision: "v2",
                staging: &staging,
                previous: None,
                cancel: &CancelToken::new(),
            })
            .unwrap();

        assert_eq!(fs::read_to_string(staging.join("bin/tool")).unwrap(), "v2");
    }

    #[test]
    fn test_materialize_rejects_bad_digest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("f", "x")]);
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();

        let locator = format!("file://{}#sha256=deadbeef", archive.display());
        let err = ArchiveBackend::new()
            .materialize(&FetchRequest {
                id: "a",
                locator: &locator,
                revision: "1",
                staging: &staging,
                previous: None,
                cancel: &CancelToken::new(),
            })
            .unwrap_err();
        assert!(matches!(err, FetchError::Checksum { .. }));
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }
}
