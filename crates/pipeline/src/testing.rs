//! Test doubles shared by the unit tests.

use crate::config::DirectoryLayout;
use crate::encode::ColorParams;
use crate::probe::FrameGeometry;
use crate::relocate::{delete_set, move_set, DeleteReport, RelocateError, Relocator};
use crate::tools::{MediaTools, ToolError};
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub(crate) const SOURCE_MANIFEST: &str = "\
#format: frame checksums
#version: 2
#hash: MD5
#tb 0: 1/25
#media_type 0: video
#codec_id 0: rawvideo
#dimensions 0: 720x576
#sar 0: 16/15
#stream#, dts,        pts, duration,     size, hash
0,          0,          0,        1,   829440, 6e5e3ef8a4e2c1e6dd6b27fbbb5dc0a6
0,          1,          1,        1,   829440, 0b9b6f5d7f6e0ab7d1ad2c0a9e3d96b1
";

/// In-process stand-in for ffmpeg and mediainfo.
///
/// Writes real files so the pipeline's on-disk checks see what a successful
/// tool run would leave behind.
pub(crate) struct FakeTools {
    geometry: FrameGeometry,
    derivative_manifest: Option<String>,
    fail_probe: bool,
    fail_manifest: bool,
    fail_transcode: bool,
    write_manifest: bool,
    write_transcode: bool,
    calls: Mutex<Vec<String>>,
    last_color: Mutex<Option<ColorParams>>,
}

impl FakeTools {
    pub(crate) fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            derivative_manifest: None,
            fail_probe: false,
            fail_manifest: false,
            fail_transcode: false,
            write_manifest: true,
            write_transcode: true,
            calls: Mutex::new(Vec::new()),
            last_color: Mutex::new(None),
        }
    }

    /// Derivative manifests get `content` instead of the source manifest.
    pub(crate) fn with_derivative_manifest(mut self, content: &str) -> Self {
        self.derivative_manifest = Some(content.to_string());
        self
    }

    pub(crate) fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    pub(crate) fn failing_manifest(mut self) -> Self {
        self.fail_manifest = true;
        self
    }

    pub(crate) fn failing_transcode(mut self) -> Self {
        self.fail_transcode = true;
        self
    }

    /// Manifest runs succeed without writing anything.
    pub(crate) fn silent_manifest(mut self) -> Self {
        self.write_manifest = false;
        self
    }

    /// Transcode runs succeed without writing anything.
    pub(crate) fn silent_transcode(mut self) -> Self {
        self.write_transcode = false;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn transcode_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("transcode"))
            .count()
    }

    pub(crate) fn last_color(&self) -> Option<ColorParams> {
        *self.last_color.lock().unwrap()
    }

    fn log(&self, op: &str, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(format!("{} {}", op, name));
    }

    fn exited(program: &str) -> ToolError {
        ToolError::Exited {
            program: program.to_string(),
            code: 1,
            stderr: "simulated failure".to_string(),
        }
    }
}

#[async_trait]
impl MediaTools for FakeTools {
    async fn generate_manifest(
        &self,
        source: &Path,
        manifest_out: &Path,
    ) -> Result<(), ToolError> {
        self.log("manifest", source);
        if self.fail_manifest {
            return Err(Self::exited("ffmpeg"));
        }
        if self.write_manifest {
            fs::write(manifest_out, SOURCE_MANIFEST).map_err(|source| ToolError::Wait {
                program: "ffmpeg".to_string(),
                source,
            })?;
        }
        Ok(())
    }

    async fn probe_geometry(&self, path: &Path) -> Result<FrameGeometry, ToolError> {
        self.log("probe", path);
        if self.fail_probe {
            return Err(Self::exited("mediainfo"));
        }
        Ok(self.geometry)
    }

    async fn transcode(
        &self,
        source: &Path,
        derivative_out: &Path,
        derivative_manifest_out: &Path,
        color: &ColorParams,
    ) -> Result<(), ToolError> {
        self.log("transcode", source);
        *self.last_color.lock().unwrap() = Some(*color);
        if self.fail_transcode {
            return Err(Self::exited("ffmpeg"));
        }
        if self.write_transcode {
            let io = |source| ToolError::Wait {
                program: "ffmpeg".to_string(),
                source,
            };
            let mut encoded = b"FFV1:".to_vec();
            encoded.extend(fs::read(source).map_err(io)?);
            fs::write(derivative_out, encoded).map_err(io)?;

            let manifest = self
                .derivative_manifest
                .as_deref()
                .unwrap_or(SOURCE_MANIFEST);
            fs::write(derivative_manifest_out, manifest).map_err(io)?;
        }
        Ok(())
    }
}

/// Filesystem relocator that damages the first file of every set it moves
/// into `target`, as a bad disk would.
pub(crate) struct CorruptingRelocator {
    target: PathBuf,
}

impl CorruptingRelocator {
    pub(crate) fn new(target: &Path) -> Self {
        Self {
            target: target.to_path_buf(),
        }
    }
}

impl Relocator for CorruptingRelocator {
    fn move_set(
        &self,
        files: &[PathBuf],
        destination: &Path,
    ) -> Result<Vec<PathBuf>, RelocateError> {
        let moved = move_set(files, destination)?;
        if destination == self.target {
            if let Some(first) = moved.first() {
                let mut file = OpenOptions::new().append(true).open(first).unwrap();
                file.write_all(b"bit rot").unwrap();
            }
        }
        Ok(moved)
    }

    fn delete_set(&self, files: &[PathBuf]) -> DeleteReport {
        delete_set(files)
    }
}

/// Staging, backup and quarantine directories under one temp root.
pub(crate) struct TestDirs {
    _temp: TempDir,
    pub(crate) layout: DirectoryLayout,
}

impl TestDirs {
    pub(crate) fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let layout = DirectoryLayout {
            staging: temp.path().join("staging"),
            backup: temp.path().join("backup"),
            quarantine: temp.path().join("quarantine"),
        };
        for dir in [&layout.staging, &layout.backup, &layout.quarantine] {
            fs::create_dir(dir).unwrap();
        }
        Self {
            _temp: temp,
            layout,
        }
    }

    /// Write `contents` to `<staging>/<name>`.
    pub(crate) fn stage(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.layout.staging.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    pub(crate) fn staging_entries(&self) -> Vec<String> {
        entries(&self.layout.staging)
    }

    pub(crate) fn backup_entries(&self) -> Vec<String> {
        entries(&self.layout.backup)
    }

    pub(crate) fn quarantine_entries(&self) -> Vec<String> {
        entries(&self.layout.quarantine)
    }
}

/// Sorted file names in `dir`.
pub(crate) fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
