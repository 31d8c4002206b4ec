//! Backup service: one pass over the staging area.
//!
//! Takes a snapshot of staging, then drives every derivative source and every
//! direct copy to a terminal state, one file at a time. A file is deleted from
//! staging only after its derivative has been verified in the backup store;
//! anything that fails verification or faults is moved, with every artifact
//! it has so far, into quarantine.

use crate::classify::{classify, VideoStandard};
use crate::config::{Config, ConfigError, DirectoryLayout};
use crate::digest::{compute_digest, verify_digest_record, write_digest_record, ContentDigest};
use crate::encode::transcode;
use crate::lifecycle::{
    FileReport, FileState, PipelineFault, QuarantineReason, RoutingOutcome, Stage, Traversal,
};
use crate::manifest::{compare_manifests, generate_manifest, ManifestComparison};
use crate::media::{derivative_path, Location, MediaFile};
use crate::relocate::{existing_members, FsRelocator, RelocateError, Relocator};
use crate::scan::discover;
use crate::startup::{run_startup_checks, StartupError};
use crate::summary::RunSummary;
use crate::tools::{FfmpegTools, MediaTools};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Error type for service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// The staging area could not be listed
    #[error("Failed to scan staging area {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Behavior switches for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Keep a digest record that arrived with a direct copy instead of
    /// writing a fresh one.
    pub trust_existing_records: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            trust_existing_records: true,
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trust_existing_records: config.pipeline.trust_existing_records,
        }
    }
}

/// How a file's traversal ended, before quarantine handling.
enum Flow {
    /// Verified in the backup store; paths of the relocated artifacts.
    BackedUp(Vec<PathBuf>),
    Rejected(QuarantineReason),
}

/// The preservation pipeline over one staging/backup/quarantine layout.
pub struct BackupService<T: MediaTools, R: Relocator = FsRelocator> {
    layout: DirectoryLayout,
    options: ServiceOptions,
    tools: T,
    relocator: R,
}

impl BackupService<FfmpegTools> {
    /// Build a service from configuration, running startup checks first.
    pub fn new(config: &Config) -> Result<Self, ServiceError> {
        let layout = config.directory_layout()?;
        run_startup_checks(config, &layout)?;

        Ok(Self::new_without_checks(
            layout,
            ServiceOptions::from_config(config),
            FfmpegTools::from_config(config),
        ))
    }
}

impl<T: MediaTools> BackupService<T> {
    pub fn new_without_checks(layout: DirectoryLayout, options: ServiceOptions, tools: T) -> Self {
        Self {
            layout,
            options,
            tools,
            relocator: FsRelocator,
        }
    }
}

impl<T: MediaTools, R: Relocator> BackupService<T, R> {
    /// Replace the filesystem relocator.
    pub fn with_relocator<S: Relocator>(self, relocator: S) -> BackupService<T, S> {
        BackupService {
            layout: self.layout,
            options: self.options,
            tools: self.tools,
            relocator,
        }
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Process every file present in staging when the run starts.
    ///
    /// Derivative sources go first, then direct copies. Per-file failures end
    /// in quarantine and never abort the run.
    pub async fn run(&self) -> Result<RunSummary, ServiceError> {
        let started = Instant::now();

        let files = discover(&self.layout.staging).map_err(|source| ServiceError::Discovery {
            path: self.layout.staging.clone(),
            source,
        })?;
        info!(
            staging = %self.layout.staging.display(),
            derivative_sources = files.derivative_sources.len(),
            direct_copies = files.direct_copies.len(),
            "Staging snapshot taken"
        );

        let mut summary = RunSummary::new();
        for media in &files.derivative_sources {
            let report = self.process_derivative_source(media).await;
            summary.record(&report);
        }
        for media in &files.direct_copies {
            let report = self.process_direct_copy(media).await;
            summary.record(&report);
        }
        summary.elapsed = started.elapsed();

        info!(
            processed = summary.processed,
            backed_up = summary.backed_up,
            quarantined = summary.quarantined,
            elapsed_secs = summary.elapsed.as_secs(),
            "Run complete"
        );
        Ok(summary)
    }

    /// Transcode, verify, and back up one source container.
    pub async fn process_derivative_source(&self, media: &MediaFile) -> FileReport {
        info!(file = %media.file_name(), kind = %media.kind, "Processing");
        let mut traversal = Traversal::start();
        let result = self.derivative_flow(media, &mut traversal).await;
        self.finish(media, traversal, result)
    }

    /// Back up one file unchanged, with its digest record.
    pub async fn process_direct_copy(&self, media: &MediaFile) -> FileReport {
        info!(file = %media.file_name(), kind = %media.kind, "Processing");
        let mut traversal = Traversal::start();
        let result = self.direct_copy_flow(media, &mut traversal);
        self.finish(media, traversal, result)
    }

    async fn derivative_flow(
        &self,
        media: &MediaFile,
        traversal: &mut Traversal,
    ) -> Result<Flow, PipelineFault> {
        let source_manifest = generate_manifest(&self.tools, &media.path)
            .await
            .map_err(|e| PipelineFault::tool(Stage::Manifest, e))?;
        traversal.advance(FileState::ManifestGenerated);

        let classification = classify(&self.tools, &media.path)
            .await
            .map_err(|e| PipelineFault::tool(Stage::Classify, e))?;
        traversal.advance(FileState::Classified(classification.standard));
        debug!(
            file = %media.file_name(),
            geometry = %classification.geometry,
            standard = %classification.standard,
            "Classified"
        );

        if classification.standard == VideoStandard::Unclassified {
            return Ok(Flow::Rejected(QuarantineReason::UnclassifiedFormat(
                classification.geometry,
            )));
        }

        let derivative = transcode(&self.tools, &media.path, classification.standard).await?;
        traversal.advance(FileState::Transcoded);

        match compare_manifests(&source_manifest, &derivative.manifest) {
            ManifestComparison::Equivalent => {
                traversal.advance(FileState::ManifestVerified { passed: true });
            }
            ManifestComparison::Differs {
                first_difference,
                source_lines,
                derivative_lines,
            } => {
                traversal.advance(FileState::ManifestVerified { passed: false });
                return Ok(Flow::Rejected(QuarantineReason::ManifestMismatch {
                    first_difference,
                    source_lines,
                    derivative_lines,
                }));
            }
            ManifestComparison::Unreadable(reason) => {
                traversal.advance(FileState::ManifestVerified { passed: false });
                return Ok(Flow::Rejected(QuarantineReason::ManifestUnreadable(reason)));
            }
        }

        let digest = compute_digest(&derivative.path)
            .map_err(|e| PipelineFault::digest(Stage::Checksum, e))?;
        write_digest_record(&derivative.path, &digest)
            .map_err(|e| PipelineFault::digest(Stage::Checksum, e))?;
        traversal.advance(FileState::Checksummed);

        let moved = self
            .relocator
            .move_set(&media.derivative_set(), &self.layout.backup)?;
        traversal.record_relocation(moved.clone());
        traversal.advance(FileState::Relocated);

        let backed_up = derivative_path(&media.relocated(&self.layout.backup, Location::Backup).path);
        let passed = reverify(&backed_up, &digest)?;
        traversal.advance(FileState::ChecksumReverified { passed });
        if !passed {
            return Ok(Flow::Rejected(QuarantineReason::DigestMismatch { path: backed_up }));
        }

        // Failures are logged by delete_set; the derivative is already safe
        let report = self.relocator.delete_set(&media.source_set());
        if !report.is_complete() {
            warn!(
                file = %media.file_name(),
                leftover = report.failed.len(),
                "Source verified but not fully removed from staging"
            );
        }

        Ok(Flow::BackedUp(moved))
    }

    fn direct_copy_flow(
        &self,
        media: &MediaFile,
        traversal: &mut Traversal,
    ) -> Result<Flow, PipelineFault> {
        let digest =
            compute_digest(&media.path).map_err(|e| PipelineFault::digest(Stage::Checksum, e))?;

        let record_path = media.digest_record_path();
        let has_record = match fs::metadata(&record_path) {
            Ok(metadata) => metadata.is_file(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(source) => {
                return Err(PipelineFault::Io {
                    stage: Stage::Checksum,
                    path: record_path,
                    source,
                })
            }
        };

        if has_record && self.options.trust_existing_records {
            info!(file = %media.file_name(), "Keeping existing digest record");
        } else {
            write_digest_record(&media.path, &digest)
                .map_err(|e| PipelineFault::digest(Stage::Checksum, e))?;
        }
        traversal.advance(FileState::Checksummed);

        let moved = self
            .relocator
            .move_set(&media.direct_copy_set(), &self.layout.backup)?;
        traversal.record_relocation(moved.clone());
        traversal.advance(FileState::Relocated);

        let backed_up = media.relocated(&self.layout.backup, Location::Backup).path;
        let passed = reverify(&backed_up, &digest)?;
        traversal.advance(FileState::ChecksumReverified { passed });
        if !passed {
            return Ok(Flow::Rejected(QuarantineReason::DigestMismatch { path: backed_up }));
        }

        Ok(Flow::BackedUp(moved))
    }

    /// Log the outcome, quarantine on failure, and build the report.
    fn finish(
        &self,
        media: &MediaFile,
        mut traversal: Traversal,
        result: Result<Flow, PipelineFault>,
    ) -> FileReport {
        let file = media.file_name();
        let stage = traversal.current().as_str();

        let (reason, split) = match result {
            Ok(Flow::BackedUp(artifacts)) => {
                traversal.advance(FileState::Terminal(RoutingOutcome::BackedUp));
                info!(file = %file, outcome = "backed_up", "File backed up");
                return FileReport {
                    media: media.clone(),
                    outcome: RoutingOutcome::BackedUp,
                    reason: None,
                    trail: traversal.into_trail(),
                    location: Some(Location::Backup),
                    artifacts,
                };
            }
            Ok(Flow::Rejected(reason)) => {
                warn!(
                    file = %file,
                    stage,
                    outcome = "validation_failed",
                    reason = %reason,
                    "Verification failed, quarantining"
                );
                (reason, false)
            }
            Err(fault) => {
                error!(file = %file, stage, error = %fault, "Fault, quarantining");
                (QuarantineReason::from(&fault), fault.is_partial_set())
            }
        };

        let (location, artifacts) = if split {
            // Moving more pieces would only scatter the set further
            error!(
                file = %file,
                "File set is split across directories and needs operator attention"
            );
            (None, Vec::new())
        } else {
            match self.quarantine(media, &traversal) {
                Ok(moved) => (Some(Location::Quarantine), moved),
                Err(e) => {
                    error!(file = %file, error = %e, "Failed to move file set into quarantine");
                    let location = if traversal.relocated().is_empty() {
                        Location::Staging
                    } else {
                        Location::Backup
                    };
                    let left = self.leftovers(media, &traversal);
                    ((!e.is_partial()).then_some(location), left)
                }
            }
        };

        traversal.advance(FileState::Terminal(RoutingOutcome::Quarantined));
        FileReport {
            media: media.clone(),
            outcome: RoutingOutcome::Quarantined,
            reason: Some(reason),
            trail: traversal.into_trail(),
            location,
            artifacts,
        }
    }

    /// Every artifact of `media` still in staging, plus whatever already
    /// reached the backup store.
    fn leftovers(&self, media: &MediaFile, traversal: &Traversal) -> Vec<PathBuf> {
        let mut set = existing_members(&media.artifact_set());
        set.extend(existing_members(traversal.relocated()));
        set
    }

    /// Move everything left of `media` into quarantine.
    ///
    /// A name already taken in quarantine sends the whole set into its own
    /// `<name>-<uuid>` directory there instead.
    fn quarantine(
        &self,
        media: &MediaFile,
        traversal: &Traversal,
    ) -> Result<Vec<PathBuf>, RelocateError> {
        let set = self.leftovers(media, traversal);
        let moved = match self.relocator.move_set(&set, &self.layout.quarantine) {
            Err(RelocateError::DestinationOccupied(taken)) => {
                let dir = self
                    .layout
                    .quarantine
                    .join(format!("{}-{}", media.file_name(), Uuid::new_v4()));
                warn!(
                    file = %media.file_name(),
                    taken = %taken.display(),
                    dir = %dir.display(),
                    "Name already quarantined, using a separate directory"
                );
                fs::create_dir(&dir).map_err(|source| RelocateError::StagingDir {
                    path: dir.clone(),
                    source,
                })?;
                self.relocator.move_set(&set, &dir)?
            }
            result => result?,
        };
        info!(
            file = %media.file_name(),
            artifacts = moved.len(),
            quarantine = %self.layout.quarantine.display(),
            "Quarantined"
        );
        Ok(moved)
    }
}

/// Recompute the digest at `path` and check it against both its record and
/// the digest taken before the move.
fn reverify(path: &Path, expected: &ContentDigest) -> Result<bool, PipelineFault> {
    let fresh = compute_digest(path).map_err(|e| PipelineFault::digest(Stage::Reverify, e))?;
    Ok(verify_digest_record(path, &fresh) && &fresh == expected)
}
