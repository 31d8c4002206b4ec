//! vidarchive
//!
//! Preservation pipeline for archival video. Source containers are transcoded
//! to lossless FFV1 derivatives that must reproduce the source frame for frame
//! before they are moved into the backup store; other captures are backed up
//! unchanged under a digest record. Nothing leaves staging until its copy has
//! been re-verified at the destination, and anything that fails is quarantined.

pub mod classify;
pub mod digest;
pub mod encode;
pub mod lifecycle;
pub mod manifest;
pub mod media;
pub mod probe;
pub mod relocate;
pub mod scan;
pub mod service;
pub mod startup;
pub mod summary;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use vidarchive_config as config;
pub use vidarchive_config::{Config, DirectoryLayout};
pub use classify::{classify, classify_geometry, Classification, VideoStandard};
pub use digest::{
    compute_digest, read_digest_record, verify_digest_record, write_digest_record, ContentDigest,
    DigestError, DigestRecord,
};
pub use encode::{color_parameters, transcode, ColorParams, Derivative, EncodeError, Ffv1Options};
pub use lifecycle::{FileReport, FileState, PipelineFault, QuarantineReason, RoutingOutcome, Stage};
pub use manifest::{compare_manifests, generate_manifest, manifests_equivalent, ManifestComparison};
pub use media::{Location, MediaFile, MediaKind};
pub use probe::{parse_geometry, FrameGeometry};
pub use relocate::{delete_set, move_set, DeleteReport, FsRelocator, RelocateError, Relocator};
pub use scan::{discover, FileSet};
pub use service::{BackupService, ServiceError, ServiceOptions};
pub use startup::{check_directories, check_tool_available, run_startup_checks, StartupError};
pub use summary::{FailedFile, RunSummary};
pub use tools::{run_bounded, FfmpegTools, MediaTools, ToolError};
