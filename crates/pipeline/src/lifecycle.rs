//! Per-file lifecycle: states, faults, and quarantine reasons.
//!
//! Every file in a run's snapshot starts `Discovered` and ends in exactly one
//! terminal state. Verification failures are ordinary values
//! (`QuarantineReason`); IO and external-process failures are `PipelineFault`
//! errors. Both end in quarantine and neither is retried.

use crate::digest::DigestError;
use crate::encode::EncodeError;
use crate::media::{Location, MediaFile};
use crate::probe::FrameGeometry;
use crate::relocate::RelocateError;
use crate::tools::ToolError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a fault occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Manifest,
    Classify,
    Transcode,
    Checksum,
    Reverify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Manifest => "manifest",
            Stage::Classify => "classify",
            Stage::Transcode => "transcode",
            Stage::Checksum => "checksum",
            Stage::Reverify => "reverify",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingOutcome {
    BackedUp,
    Quarantined,
}

impl fmt::Display for RoutingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingOutcome::BackedUp => write!(f, "backed_up"),
            RoutingOutcome::Quarantined => write!(f, "quarantined"),
        }
    }
}

/// States a file passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Discovered,
    ManifestGenerated,
    Classified(crate::classify::VideoStandard),
    Transcoded,
    ManifestVerified { passed: bool },
    Checksummed,
    Relocated,
    ChecksumReverified { passed: bool },
    Terminal(RoutingOutcome),
}

impl FileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileState::Terminal(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Discovered => "discovered",
            FileState::ManifestGenerated => "manifest_generated",
            FileState::Classified(_) => "classified",
            FileState::Transcoded => "transcoded",
            FileState::ManifestVerified { passed: true } => "manifest_verified",
            FileState::ManifestVerified { passed: false } => "manifest_mismatch",
            FileState::Checksummed => "checksummed",
            FileState::Relocated => "relocated",
            FileState::ChecksumReverified { passed: true } => "checksum_reverified",
            FileState::ChecksumReverified { passed: false } => "checksum_mismatch",
            FileState::Terminal(RoutingOutcome::BackedUp) => "backed_up",
            FileState::Terminal(RoutingOutcome::Quarantined) => "quarantined",
        }
    }
}

/// IO or external-process failure that aborts a file's traversal.
#[derive(Debug, Error)]
pub enum PipelineFault {
    #[error("{stage}: IO error on {}: {source}", .path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage}: {source}")]
    ExternalProcess {
        stage: Stage,
        #[source]
        source: ToolError,
    },

    #[error("{stage}: {source}")]
    Digest {
        stage: Stage,
        #[source]
        source: DigestError,
    },

    #[error("transcode: {0}")]
    Transcode(#[from] EncodeError),

    #[error("relocate: {0}")]
    Relocation(#[from] RelocateError),
}

impl PipelineFault {
    pub fn tool(stage: Stage, source: ToolError) -> Self {
        PipelineFault::ExternalProcess { stage, source }
    }

    pub fn digest(stage: Stage, source: DigestError) -> Self {
        PipelineFault::Digest { stage, source }
    }

    /// The file set is split between directories.
    pub fn is_partial_set(&self) -> bool {
        matches!(self, PipelineFault::Relocation(e) if e.is_partial())
    }
}

/// Why a file ended up in quarantine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineReason {
    /// Geometry matched no known standard; transcode was skipped.
    UnclassifiedFormat(FrameGeometry),
    /// Source and derivative manifests differ.
    ManifestMismatch {
        first_difference: usize,
        source_lines: usize,
        derivative_lines: usize,
    },
    /// A manifest could not be read for comparison.
    ManifestUnreadable(String),
    /// The digest recomputed at the new location does not match the record.
    DigestMismatch { path: PathBuf },
    /// IO or external-process fault, rendered for the summary.
    Fault(String),
}

impl QuarantineReason {
    /// True for verification outcomes, false for faults.
    pub fn is_validation(&self) -> bool {
        !matches!(self, QuarantineReason::Fault(_))
    }
}

impl From<&PipelineFault> for QuarantineReason {
    fn from(fault: &PipelineFault) -> Self {
        QuarantineReason::Fault(fault.to_string())
    }
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarantineReason::UnclassifiedFormat(geometry) => {
                write!(f, "unclassified format ({})", geometry)
            }
            QuarantineReason::ManifestMismatch {
                first_difference,
                source_lines,
                derivative_lines,
            } => write!(
                f,
                "frame manifests differ at line {} ({} source lines, {} derivative lines)",
                first_difference, source_lines, derivative_lines
            ),
            QuarantineReason::ManifestUnreadable(reason) => {
                write!(f, "frame manifest unreadable: {}", reason)
            }
            QuarantineReason::DigestMismatch { path } => {
                write!(f, "digest mismatch after relocation: {}", path.display())
            }
            QuarantineReason::Fault(message) => write!(f, "{}", message),
        }
    }
}

/// Tracks one file's walk through the states and what has left staging.
#[derive(Debug)]
pub struct Traversal {
    trail: Vec<FileState>,
    /// Files moved out of staging so far, at their current paths
    relocated: Vec<PathBuf>,
}

impl Traversal {
    pub fn start() -> Self {
        Self {
            trail: vec![FileState::Discovered],
            relocated: Vec::new(),
        }
    }

    pub fn advance(&mut self, state: FileState) {
        debug_assert!(!self.current().is_terminal(), "terminal states are absorbing");
        self.trail.push(state);
    }

    pub fn current(&self) -> FileState {
        self.trail
            .last()
            .copied()
            .unwrap_or(FileState::Discovered)
    }

    pub fn record_relocation(&mut self, paths: Vec<PathBuf>) {
        self.relocated = paths;
    }

    pub fn relocated(&self) -> &[PathBuf] {
        &self.relocated
    }

    pub fn trail(&self) -> &[FileState] {
        &self.trail
    }

    pub fn into_trail(self) -> Vec<FileState> {
        self.trail
    }
}

/// Result of processing one file.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// The file as it was discovered in staging
    pub media: MediaFile,
    pub outcome: RoutingOutcome,
    /// Set when quarantined
    pub reason: Option<QuarantineReason>,
    /// Every state reached, in order, ending in the terminal state
    pub trail: Vec<FileState>,
    /// Where the file's artifacts ended up; `None` if the set is split
    pub location: Option<Location>,
    /// Paths of the artifacts at their final location
    pub artifacts: Vec<PathBuf>,
}

impl FileReport {
    pub fn is_backed_up(&self) -> bool {
        self.outcome == RoutingOutcome::BackedUp
    }

    /// Last state before the terminal one.
    pub fn last_stage_reached(&self) -> FileState {
        self.trail
            .iter()
            .rev()
            .find(|state| !state.is_terminal())
            .copied()
            .unwrap_or(FileState::Discovered)
    }
}
