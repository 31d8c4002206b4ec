//! Probe module for reading frame geometry from mediainfo output.
//!
//! mediainfo prints `Key : Value` lines grouped by stream. Only the `Height`
//! and `Width` fields are consumed; everything else is ignored.

use std::path::Path;
use std::process::Command;

/// Frame dimensions reported by the prober.
///
/// `None` means the field was absent or not a number. That is distinct from a
/// geometry that is present but matches no known standard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    /// Frame height in pixels.
    pub height: Option<u32>,
    /// Frame width in pixels.
    pub width: Option<u32>,
}

impl FrameGeometry {
    pub fn new(height: u32, width: u32) -> Self {
        Self {
            height: Some(height),
            width: Some(width),
        }
    }

    /// Neither dimension was reported.
    pub fn is_unset(&self) -> bool {
        self.height.is_none() && self.width.is_none()
    }
}

impl std::fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dim = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string());
        write!(f, "{}x{}", dim(self.width), dim(self.height))
    }
}

/// Builds `mediainfo <path>`.
pub fn build_probe_command(mediainfo: &str, path: &Path) -> Command {
    let mut cmd = Command::new(mediainfo);
    cmd.arg(path);
    cmd
}

/// Parses a pixel count such as `576 pixels` or `1 920 pixels`.
fn parse_pixels(value: &str) -> Option<u32> {
    let digits: String = value
        .trim()
        .trim_end_matches("pixels")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Extracts frame geometry from mediainfo text output.
///
/// The first `Height`/`Width` line wins, which is the first video stream in
/// mediainfo's ordering.
pub fn parse_geometry(output: &str) -> FrameGeometry {
    let mut geometry = FrameGeometry::default();

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        match key.trim() {
            "Height" if geometry.height.is_none() => geometry.height = parse_pixels(value),
            "Width" if geometry.width.is_none() => geometry.width = parse_pixels(value),
            _ => {}
        }
    }

    geometry
}
