//! Classifier module for mapping frame geometry onto video standards.
//!
//! Only the two standard-definition broadcast rasters the archive holds are
//! recognized. Anything else is `Unclassified`, which is a valid answer rather
//! than an error: the pipeline routes such files to quarantine instead of
//! guessing at their color metadata.

use crate::probe::FrameGeometry;
use crate::tools::{MediaTools, ToolError};
use std::path::Path;

/// Closed classification of frame geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoStandard {
    /// 720x576
    Pal,
    /// 720x486
    Ntsc,
    /// Geometry missing or not a known raster.
    Unclassified,
}

impl Default for VideoStandard {
    fn default() -> Self {
        Self::Unclassified
    }
}

impl std::fmt::Display for VideoStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoStandard::Pal => write!(f, "PAL"),
            VideoStandard::Ntsc => write!(f, "NTSC"),
            VideoStandard::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Outcome of probing and classifying one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub geometry: FrameGeometry,
    pub standard: VideoStandard,
}

/// Maps (height, width) to a standard. Pure.
pub fn classify_geometry(geometry: &FrameGeometry) -> VideoStandard {
    match (geometry.height, geometry.width) {
        (Some(576), Some(720)) => VideoStandard::Pal,
        (Some(486), Some(720)) => VideoStandard::Ntsc,
        _ => VideoStandard::Unclassified,
    }
}

/// Probes `path` and classifies its geometry.
///
/// Only a prober failure is an error; an unknown raster comes back as
/// `VideoStandard::Unclassified`.
pub async fn classify<T: MediaTools + ?Sized>(
    tools: &T,
    path: &Path,
) -> Result<Classification, ToolError> {
    let geometry = tools.probe_geometry(path).await?;
    Ok(Classification {
        geometry,
        standard: classify_geometry(&geometry),
    })
}
