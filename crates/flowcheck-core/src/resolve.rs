//! Path resolution without hidden global state.
//!
//! Every lookup takes its candidates explicitly: the config loader hands
//! [`first_existing`] an ordered list, and "latest artifact" resolution is a
//! pure function of a directory listing.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Marker in a filename that takes the artifact out of "latest" resolution.
pub const ARCHIVED_MARKER: &str = ".archived.";

/// Return the first candidate that exists as a regular file.
pub fn first_existing<I, P>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    candidates
        .into_iter()
        .map(Into::into)
        .find(|path: &PathBuf| path.is_file())
}

/// Resolve `path` against `base` unless it is already absolute.
#[must_use]
pub fn resolve_under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// `true` when the filename carries the archived marker.
#[must_use]
pub fn is_archived(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(ARCHIVED_MARKER))
}

/// Sort key for "latest" resolution: filename first, modification time as
/// the tie-break. Filenames are date-stamped, so lexical order is recency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub name: String,
    pub modified: Option<SystemTime>,
}

impl ArtifactKey {
    /// Key of an existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub fn of(path: &Path) -> io::Result<Self> {
        let modified = fs::metadata(path)?.modified().ok();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, modified })
    }
}

impl PartialOrd for ArtifactKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArtifactKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.modified.cmp(&other.modified))
    }
}

/// The latest non-archived file with `extension` directly under `dir`.
///
/// A missing directory has no latest artifact.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be listed.
pub fn latest_artifact(dir: &Path, extension: &str) -> io::Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut best: Option<(ArtifactKey, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches_ext = path.extension().and_then(|ext| ext.to_str()) == Some(extension);
        if !path.is_file() || !matches_ext || is_archived(&path) {
            continue;
        }
        let key = ArtifactKey::of(&path)?;
        if best.as_ref().is_none_or(|(current, _)| key > *current) {
            best = Some((key, path));
        }
    }

    Ok(best.map(|(_, path)| path))
}
