//! Frame-manifest generation and comparison.
//!
//! A manifest is the engine's per-frame checksum listing. A derivative is
//! accepted only if its manifest matches the source's line for line, header
//! lines included.

use crate::media::manifest_path;
use crate::tools::{MediaTools, ToolError};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of comparing a source manifest against a derivative manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestComparison {
    Equivalent,
    Differs {
        /// 1-based line number of the first mismatching line
        first_difference: usize,
        source_lines: usize,
        derivative_lines: usize,
    },
    /// One of the manifests could not be read.
    Unreadable(String),
}

impl ManifestComparison {
    pub fn is_equivalent(&self) -> bool {
        matches!(self, ManifestComparison::Equivalent)
    }
}

/// Compare two manifest texts line by line.
///
/// Line terminators are part of each line, so a missing final newline or a
/// CRLF ending counts as a difference.
pub fn compare_manifest_lines(source: &str, derivative: &str) -> ManifestComparison {
    let source_lines: Vec<&str> = source.split_inclusive('\n').collect();
    let derivative_lines: Vec<&str> = derivative.split_inclusive('\n').collect();

    let first_mismatch = source_lines
        .iter()
        .zip(derivative_lines.iter())
        .position(|(a, b)| a != b);

    let first_difference = match first_mismatch {
        Some(index) => index + 1,
        None if source_lines.len() == derivative_lines.len() => {
            return ManifestComparison::Equivalent
        }
        // One is a prefix of the other
        None => source_lines.len().min(derivative_lines.len()) + 1,
    };

    ManifestComparison::Differs {
        first_difference,
        source_lines: source_lines.len(),
        derivative_lines: derivative_lines.len(),
    }
}

/// Compare the manifest files at `source` and `derivative`.
pub fn compare_manifests(source: &Path, derivative: &Path) -> ManifestComparison {
    let read = |path: &Path| {
        fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))
    };

    match (read(source), read(derivative)) {
        (Ok(a), Ok(b)) => compare_manifest_lines(&a, &b),
        (Err(reason), _) | (_, Err(reason)) => ManifestComparison::Unreadable(reason),
    }
}

/// True iff both manifests are readable and equivalent.
pub fn manifests_equivalent(source: &Path, derivative: &Path) -> bool {
    compare_manifests(source, derivative).is_equivalent()
}

/// Generate `<path>.framemd5` and return its path.
///
/// Fails if the engine fails or if the manifest is absent afterwards.
pub async fn generate_manifest<T: MediaTools + ?Sized>(
    tools: &T,
    path: &Path,
) -> Result<PathBuf, ToolError> {
    let manifest = manifest_path(path);
    tools.generate_manifest(path, &manifest).await?;

    if !manifest.is_file() {
        return Err(ToolError::MissingOutput(manifest));
    }
    Ok(manifest)
}
