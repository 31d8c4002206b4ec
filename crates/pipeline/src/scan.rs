//! Scanner module for snapshotting the staging area.
//!
//! A run works on the set of files present when it starts. The scan is
//! shallow: only direct children of the staging directory are considered, and
//! hidden entries (names starting with `.`) are ignored, which also keeps the
//! relocator's in-flight staging directories out of the snapshot.

use crate::media::{MediaFile, MediaKind};
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Files captured at run start, split by preservation route and sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    /// Files to transcode into archival derivatives.
    pub derivative_sources: Vec<MediaFile>,
    /// Files to back up unchanged.
    pub direct_copies: Vec<MediaFile>,
}

impl FileSet {
    pub fn len(&self) -> usize {
        self.derivative_sources.len() + self.direct_copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Takes the start-of-run snapshot of `staging`.
///
/// Fails if the staging directory cannot be listed; individual entries that
/// vanish or cannot be stat'ed while listing are skipped.
pub fn discover(staging: &Path) -> io::Result<FileSet> {
    let mut files = FileSet::default();

    let walker = WalkDir::new(staging)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // The root itself failing to open is fatal for the run
            Err(e) if e.depth() == 0 || e.path() == Some(staging) => return Err(e.into()),
            Err(_) => continue,
        };

        if !entry.file_type().is_file() || is_hidden(entry.path()) {
            continue;
        }

        match MediaKind::from_path(entry.path()) {
            Some(kind @ MediaKind::DerivativeSource) => files
                .derivative_sources
                .push(MediaFile::discovered(entry.path().to_path_buf(), kind)),
            Some(kind @ MediaKind::DirectCopy) => files
                .direct_copies
                .push(MediaFile::discovered(entry.path().to_path_buf(), kind)),
            None => {}
        }
    }

    Ok(files)
}
