//! Startup checks module for vidarchive
//!
//! Preflight checks run before a pass over the staging area:
//! - ffmpeg and mediainfo can be executed
//! - staging, backup and quarantine exist, are directories, and are distinct

use crate::config::{Config, DirectoryLayout};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::info;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{program} not available: {reason}")]
    ToolUnavailable { program: String, reason: String },

    #[error("{role} directory {} is unusable: {reason}", .path.display())]
    DirectoryUnusable {
        role: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error(
        "{first} and {second} directories resolve to the same location: {}",
        .path.display()
    )]
    OverlappingDirectories {
        first: &'static str,
        second: &'static str,
        path: PathBuf,
    },
}

/// First non-empty line of a tool's version output.
pub fn version_banner(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Check that `program` runs, by invoking it with `version_arg`
///
/// Returns the tool's version banner.
pub fn check_tool_available(program: &str, version_arg: &str) -> Result<String, StartupError> {
    let output = Command::new(program)
        .arg(version_arg)
        .output()
        .map_err(|e| StartupError::ToolUnavailable {
            program: program.to_string(),
            reason: format!("{} {} failed; is it installed and in PATH? Error: {}", program, version_arg, e),
        })?;

    if !output.status.success() {
        return Err(StartupError::ToolUnavailable {
            program: program.to_string(),
            reason: format!("{} {} exited with {}", program, version_arg, output.status),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(version_banner(&stdout).unwrap_or("(no version output)").to_string())
}

fn check_directory(role: &'static str, path: &Path) -> Result<PathBuf, StartupError> {
    let unusable = |reason: String| StartupError::DirectoryUnusable {
        role,
        path: path.to_path_buf(),
        reason,
    };

    let metadata = std::fs::metadata(path).map_err(|e| unusable(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(unusable("not a directory".to_string()));
    }
    path.canonicalize().map_err(|e| unusable(e.to_string()))
}

/// Check that the three directories exist, are directories, and are distinct
pub fn check_directories(layout: &DirectoryLayout) -> Result<(), StartupError> {
    let resolved = [
        ("staging", check_directory("staging", &layout.staging)?),
        ("backup", check_directory("backup", &layout.backup)?),
        ("quarantine", check_directory("quarantine", &layout.quarantine)?),
    ];

    for (i, (first, a)) in resolved.iter().enumerate() {
        for (second, b) in &resolved[i + 1..] {
            if a == b {
                return Err(StartupError::OverlappingDirectories {
                    first: *first,
                    second: *second,
                    path: a.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Run all startup checks in order
///
/// 1. ffmpeg availability
/// 2. mediainfo availability
/// 3. Directory layout
pub fn run_startup_checks(cfg: &Config, layout: &DirectoryLayout) -> Result<(), StartupError> {
    let ffmpeg = check_tool_available(&cfg.tools.ffmpeg, "-version")?;
    info!(tool = %cfg.tools.ffmpeg, version = %ffmpeg, "Found ffmpeg");

    let mediainfo = check_tool_available(&cfg.tools.mediainfo, "--Version")?;
    info!(tool = %cfg.tools.mediainfo, version = %mediainfo, "Found mediainfo");

    check_directories(layout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout_in(temp_dir: &TempDir) -> DirectoryLayout {
        let layout = DirectoryLayout {
            staging: temp_dir.path().join("staging"),
            backup: temp_dir.path().join("backup"),
            quarantine: temp_dir.path().join("quarantine"),
        };
        for dir in [&layout.staging, &layout.backup, &layout.quarantine] {
            fs::create_dir(dir).unwrap();
        }
        layout
    }

    #[test]
    fn test_version_banner() {
        let output = "\nffmpeg version 6.1.1 Copyright (c) 2000-2023\nbuilt with gcc 13\n";
        assert_eq!(
            version_banner(output),
            Some("ffmpeg version 6.1.1 Copyright (c) 2000-2023")
        );
        assert_eq!(
            version_banner("MediaInfo Command line,\nMediaInfoLib - v23.11\n"),
            Some("MediaInfo Command line,")
        );
        assert_eq!(version_banner("  \n"), None);
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let result = check_tool_available("vidarchive-no-such-tool-91c2", "-version");
        match result {
            Err(StartupError::ToolUnavailable { program, .. }) => {
                assert_eq!(program, "vidarchive-no-such-tool-91c2");
            }
            other => panic!("Expected ToolUnavailable, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_is_unavailable() {
        assert!(matches!(
            check_tool_available("false", "--version"),
            Err(StartupError::ToolUnavailable { .. })
        ));
    }

    #[test]
    fn test_valid_layout_passes() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout_in(&temp_dir);
        assert!(check_directories(&layout).is_ok());
    }

    #[test]
    fn test_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout_in(&temp_dir);
        fs::remove_dir(&layout.quarantine).unwrap();

        match check_directories(&layout) {
            Err(StartupError::DirectoryUnusable { role, .. }) => assert_eq!(role, "quarantine"),
            other => panic!("Expected DirectoryUnusable, got {:?}", other),
        }
    }

    #[test]
    fn test_file_instead_of_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut layout = layout_in(&temp_dir);
        let file = temp_dir.path().join("backup.txt");
        fs::write(&file, b"not a dir").unwrap();
        layout.backup = file;

        match check_directories(&layout) {
            Err(StartupError::DirectoryUnusable { role, reason, .. }) => {
                assert_eq!(role, "backup");
                assert_eq!(reason, "not a directory");
            }
            other => panic!("Expected DirectoryUnusable, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_directories_fail() {
        let temp_dir = TempDir::new().unwrap();
        let mut layout = layout_in(&temp_dir);
        // Same directory through a different spelling
        layout.quarantine = layout.staging.join("..").join("staging");

        match check_directories(&layout) {
            Err(StartupError::OverlappingDirectories { first, second, .. }) => {
                assert_eq!(first, "staging");
                assert_eq!(second, "quarantine");
            }
            other => panic!("Expected OverlappingDirectories, got {:?}", other),
        }
    }
}
