//! Media file identity and sidecar naming.
//!
//! Every artifact the pipeline produces is colocated with its primary file and
//! named by appending a fixed suffix to the primary file's full name:
//! `<path>.framemd5` for frame manifests and `<path>.md5` for digest records.
//! The archival derivative of a source swaps the container extension for
//! `.mkv`.

use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix of a frame-manifest sidecar.
pub const MANIFEST_SUFFIX: &str = ".framemd5";

/// Suffix of a digest-record sidecar.
pub const DIGEST_RECORD_SUFFIX: &str = ".md5";

/// Container extension of the lossless archival derivative.
pub const ARCHIVAL_EXTENSION: &str = "mkv";

/// Extension of files that are transcoded before backup.
pub const DERIVATIVE_SOURCE_EXTENSION: &str = "mov";

/// Extension of files that are backed up as-is.
pub const DIRECT_COPY_EXTENSION: &str = "avi";

/// How a discovered file is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Transcoded to a lossless derivative; the source is deleted once the
    /// derivative is verified in the backup store.
    DerivativeSource,
    /// Copied to the backup store unchanged.
    DirectCopy,
}

impl MediaKind {
    /// Determine the kind from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            DERIVATIVE_SOURCE_EXTENSION => Some(MediaKind::DerivativeSource),
            DIRECT_COPY_EXTENSION => Some(MediaKind::DirectCopy),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::DerivativeSource => write!(f, "derivative_source"),
            MediaKind::DirectCopy => write!(f, "direct_copy"),
        }
    }
}

/// The directory a file currently lives in. Exactly one at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Staging,
    Backup,
    Quarantine,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Staging => write!(f, "staging"),
            Location::Backup => write!(f, "backup"),
            Location::Quarantine => write!(f, "quarantine"),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(suffix);
    PathBuf::from(sidecar)
}

/// Frame-manifest sidecar path: `/dir/clip.mov` -> `/dir/clip.mov.framemd5`
pub fn manifest_path(path: &Path) -> PathBuf {
    with_suffix(path, MANIFEST_SUFFIX)
}

/// Digest-record sidecar path: `/dir/clip.mkv` -> `/dir/clip.mkv.md5`
pub fn digest_record_path(path: &Path) -> PathBuf {
    with_suffix(path, DIGEST_RECORD_SUFFIX)
}

/// Archival derivative path: `/dir/clip.mov` -> `/dir/clip.mkv`
pub fn derivative_path(source: &Path) -> PathBuf {
    source.with_extension(ARCHIVAL_EXTENSION)
}

/// A file captured by the start-of-run snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Full path of the primary file.
    pub path: PathBuf,
    /// Preservation route.
    pub kind: MediaKind,
    /// Directory the primary file currently lives in.
    pub location: Location,
}

impl MediaFile {
    /// A freshly discovered file in the staging area.
    pub fn discovered(path: PathBuf, kind: MediaKind) -> Self {
        Self {
            path,
            kind,
            location: Location::Staging,
        }
    }

    /// Basename of the primary file, for logs and summaries.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.path)
    }

    pub fn digest_record_path(&self) -> PathBuf {
        digest_record_path(&self.path)
    }

    pub fn derivative_path(&self) -> PathBuf {
        derivative_path(&self.path)
    }

    /// Source container plus its frame manifest.
    pub fn source_set(&self) -> Vec<PathBuf> {
        vec![self.path.clone(), self.manifest_path()]
    }

    /// Derivative plus its frame manifest and digest record.
    pub fn derivative_set(&self) -> Vec<PathBuf> {
        let derivative = self.derivative_path();
        vec![
            derivative.clone(),
            manifest_path(&derivative),
            digest_record_path(&derivative),
        ]
    }

    /// Direct-copy file plus its digest record.
    pub fn direct_copy_set(&self) -> Vec<PathBuf> {
        vec![self.path.clone(), self.digest_record_path()]
    }

    /// Ordered sidecar artifacts that may belong to this file, depending on
    /// how far its pipeline got.
    pub fn sidecars(&self) -> Vec<PathBuf> {
        match self.kind {
            MediaKind::DerivativeSource => {
                let mut sidecars = vec![self.manifest_path()];
                sidecars.extend(self.derivative_set());
                sidecars
            }
            MediaKind::DirectCopy => vec![self.digest_record_path()],
        }
    }

    /// Primary file followed by all of its sidecars.
    pub fn artifact_set(&self) -> Vec<PathBuf> {
        let mut set = vec![self.path.clone()];
        set.extend(self.sidecars());
        set
    }

    /// The same file after its set has been moved into `dir`.
    pub fn relocated(&self, dir: &Path, location: Location) -> Self {
        let path = match self.path.file_name() {
            Some(name) => dir.join(name),
            None => dir.to_path_buf(),
        };
        Self {
            path,
            kind: self.kind,
            location,
        }
    }
}
