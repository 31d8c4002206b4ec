//! Relocator module for moving a file together with its sidecars.
//!
//! A set is moved in two phases. Every member is first transferred into a
//! hidden staging directory inside the destination (`.relocate-<uuid>`), by
//! rename or, across filesystems, by copy + sync + remove. Only when all
//! members are staged are they renamed into the destination proper, which is
//! a same-filesystem rename per member.
//!
//! A failure while transferring puts staged members back where they came
//! from. The only outcomes that leave a set split are `Stranded` (the
//! rollback itself failed) and `PartialSet` (a rename inside the destination
//! filesystem failed); both carry enough detail to finish the move by hand.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Errors that can occur while relocating a file set.
#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("Destination is not a directory: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error("Set member does not exist: {}", .0.display())]
    MissingMember(PathBuf),

    #[error("Destination already holds {}", .0.display())]
    DestinationOccupied(PathBuf),

    #[error("Set member has no usable file name: {}", .0.display())]
    NoFileName(PathBuf),

    #[error("Two set members share the file name {0:?}")]
    DuplicateName(OsString),

    #[error("Failed to create directory {}: {source}", .path.display())]
    StagingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A member could not be transferred; the whole set is back at its origin.
    #[error("Failed to move {}: {source}", .path.display())]
    Transfer {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A member could not be transferred and the rollback also failed.
    #[error(
        "Failed to move {} and could not restore the set; {} member(s) left in {}",
        .path.display(), .stranded.len(), .staging_dir.display()
    )]
    Stranded {
        path: PathBuf,
        #[source]
        source: io::Error,
        staging_dir: PathBuf,
        /// Members that could not be returned to their origin
        stranded: Vec<PathBuf>,
    },

    /// Some members reached the destination and the rest are still staged.
    #[error(
        "Only {committed} of {total} member(s) reached {}; the rest remain in {}: {source}",
        .destination.display(), .staging_dir.display()
    )]
    PartialSet {
        destination: PathBuf,
        staging_dir: PathBuf,
        committed: usize,
        total: usize,
        #[source]
        source: io::Error,
    },
}

impl RelocateError {
    /// True if the set is split between locations and needs an operator.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            RelocateError::Stranded { .. } | RelocateError::PartialSet { .. }
        )
    }
}

/// Outcome of deleting a file set.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Members of `files` currently present on disk, in order.
pub fn existing_members(files: &[PathBuf]) -> Vec<PathBuf> {
    files.iter().filter(|path| path.exists()).cloned().collect()
}

/// Move `from` to `to`, copying across filesystems if rename is refused.
fn transfer(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_across(from, to)
}

/// Copy, sync, then remove the original. On failure nothing is left at `to`.
fn copy_across(from: &Path, to: &Path) -> io::Result<()> {
    let copied = fs::copy(from, to).and_then(|_| File::open(to)?.sync_all());
    if let Err(e) = copied {
        discard(to);
        return Err(e);
    }
    if let Err(e) = fs::remove_file(from) {
        // Leave the original in place rather than end up with two copies
        discard(to);
        return Err(e);
    }
    Ok(())
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove incomplete copy"),
    }
}

/// Check the whole set before anything moves.
fn validate(files: &[PathBuf], destination: &Path) -> Result<Vec<OsString>, RelocateError> {
    if !destination.is_dir() {
        return Err(RelocateError::DestinationMissing(destination.to_path_buf()));
    }

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(files.len());

    for path in files {
        let name = path
            .file_name()
            .ok_or_else(|| RelocateError::NoFileName(path.clone()))?
            .to_os_string();

        if !seen.insert(name.clone()) {
            return Err(RelocateError::DuplicateName(name));
        }
        if fs::symlink_metadata(path).is_err() {
            return Err(RelocateError::MissingMember(path.clone()));
        }

        let target = destination.join(&name);
        if fs::symlink_metadata(&target).is_ok() {
            return Err(RelocateError::DestinationOccupied(target));
        }
        names.push(name);
    }

    Ok(names)
}

/// Put already-staged members back; returns the ones that could not be.
fn roll_back(files: &[PathBuf], names: &[OsString], staging_dir: &Path) -> Vec<PathBuf> {
    let mut stranded = Vec::new();

    for (origin, name) in files.iter().zip(names) {
        let staged = staging_dir.join(name);
        if let Err(e) = transfer(&staged, origin) {
            error!(
                file = %staged.display(),
                origin = %origin.display(),
                error = %e,
                "Failed to restore set member"
            );
            stranded.push(staged);
        }
    }

    if stranded.is_empty() {
        if let Err(e) = fs::remove_dir(staging_dir) {
            warn!(path = %staging_dir.display(), error = %e, "Failed to remove staging directory");
        }
    }
    stranded
}

/// Move every file in `files` into `destination`, keeping basenames.
///
/// Returns the new paths in the order given. Either every member ends up in
/// `destination`, or (on `MissingMember`, `DestinationOccupied`, `Transfer`
/// and the other pre-move checks) every member is still at its origin. The
/// exceptions are `Stranded` and `PartialSet`, see `RelocateError::is_partial`.
pub fn move_set(files: &[PathBuf], destination: &Path) -> Result<Vec<PathBuf>, RelocateError> {
    let names = validate(files, destination)?;
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let staging_dir = destination.join(format!(".relocate-{}", Uuid::new_v4()));
    fs::create_dir(&staging_dir).map_err(|source| RelocateError::StagingDir {
        path: staging_dir.clone(),
        source,
    })?;

    for (index, (path, name)) in files.iter().zip(&names).enumerate() {
        if let Err(source) = transfer(path, &staging_dir.join(name)) {
            let stranded = roll_back(&files[..index], &names[..index], &staging_dir);
            if stranded.is_empty() {
                return Err(RelocateError::Transfer {
                    path: path.clone(),
                    source,
                });
            }
            return Err(RelocateError::Stranded {
                path: path.clone(),
                source,
                staging_dir,
                stranded,
            });
        }
        debug!(file = %path.display(), staging = %staging_dir.display(), "staged");
    }

    let mut moved = Vec::with_capacity(files.len());
    for name in &names {
        let target = destination.join(name);
        if let Err(source) = fs::rename(staging_dir.join(name), &target) {
            error!(
                destination = %destination.display(),
                staging = %staging_dir.display(),
                committed = moved.len(),
                total = files.len(),
                "File set split across locations"
            );
            return Err(RelocateError::PartialSet {
                destination: destination.to_path_buf(),
                staging_dir,
                committed: moved.len(),
                total: files.len(),
                source,
            });
        }
        moved.push(target);
    }

    if let Err(e) = fs::remove_dir(&staging_dir) {
        warn!(path = %staging_dir.display(), error = %e, "Failed to remove empty staging directory");
    }

    Ok(moved)
}

/// Remove every file in `files`. Failures are logged and reported, not fatal.
pub fn delete_set(files: &[PathBuf]) -> DeleteReport {
    let mut report = DeleteReport::default();

    for path in files {
        match fs::remove_file(path) {
            Ok(()) => report.removed.push(path.clone()),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to delete file");
                report.failed.push((path.clone(), e));
            }
        }
    }

    report
}

/// Moves and deletes file sets for the backup service.
pub trait Relocator: Send + Sync {
    fn move_set(&self, files: &[PathBuf], destination: &Path)
        -> Result<Vec<PathBuf>, RelocateError>;

    fn delete_set(&self, files: &[PathBuf]) -> DeleteReport;
}

/// Relocator over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRelocator;

impl Relocator for FsRelocator {
    fn move_set(
        &self,
        files: &[PathBuf],
        destination: &Path,
    ) -> Result<Vec<PathBuf>, RelocateError> {
        move_set(files, destination)
    }

    fn delete_set(&self, files: &[PathBuf]) -> DeleteReport {
        delete_set(files)
    }
}
