//! External media tools.
//!
//! The pipeline reaches ffmpeg and mediainfo only through the `MediaTools`
//! trait so the orchestrator can be driven by a fake in tests. `FfmpegTools`
//! is the process-backed implementation; every invocation goes through
//! `run_bounded`, which kills the child if it outlives its timeout.

use crate::config::Config;
use crate::encode::{build_manifest_command, build_transcode_command, ColorParams, Ffv1Options};
use crate::probe::{build_probe_command, parse_geometry, FrameGeometry};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error type for external tool invocations
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed while waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}{}", format_stderr(.stderr))]
    Exited {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} was terminated by a signal")]
    Terminated { program: String },

    #[error("{program} did not finish within {}s and was killed", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    /// The tool reported success but an expected output file is absent.
    #[error("Expected output was not produced: {}", .0.display())]
    MissingOutput(PathBuf),
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Run `cmd` to completion, killing it if it exceeds `timeout`.
///
/// stdin is closed; stdout and stderr are captured. A non-zero exit or a
/// signal is an error.
pub async fn run_bounded(
    cmd: std::process::Command,
    timeout: Duration,
) -> Result<Output, ToolError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!(program = %program, args = ?cmd.get_args().collect::<Vec<_>>(), "spawning");

    let mut cmd = tokio::process::Command::from(cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Dropping the child on expiry kills it
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(ToolError::Wait { program, source }),
        Err(_) => return Err(ToolError::TimedOut { program, timeout }),
    };

    if output.status.success() {
        return Ok(output);
    }

    match output.status.code() {
        Some(code) => Err(ToolError::Exited {
            program,
            code,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        None => Err(ToolError::Terminated { program }),
    }
}

/// The external operations the pipeline depends on.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Write the frame manifest of `source` to `manifest_out`.
    async fn generate_manifest(&self, source: &Path, manifest_out: &Path)
        -> Result<(), ToolError>;

    /// Report the frame geometry of `path`.
    async fn probe_geometry(&self, path: &Path) -> Result<FrameGeometry, ToolError>;

    /// Encode `source` to an FFV1 derivative and write the derivative's frame
    /// manifest in the same pass.
    async fn transcode(
        &self,
        source: &Path,
        derivative_out: &Path,
        derivative_manifest_out: &Path,
        color: &ColorParams,
    ) -> Result<(), ToolError>;
}

/// ffmpeg and mediainfo, invoked as child processes.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: String,
    pub mediainfo: String,
    /// Bound on each mediainfo run
    pub probe_timeout: Duration,
    /// Bound on each ffmpeg run
    pub transcode_timeout: Duration,
    pub options: Ffv1Options,
}

impl FfmpegTools {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
            mediainfo: config.tools.mediainfo.clone(),
            probe_timeout: Duration::from_secs(config.tools.probe_timeout_secs),
            transcode_timeout: Duration::from_secs(config.tools.transcode_timeout_secs),
            options: Ffv1Options {
                slices: config.transcode.slices,
                manifest_audio: config.transcode.manifest_audio,
            },
        }
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn generate_manifest(
        &self,
        source: &Path,
        manifest_out: &Path,
    ) -> Result<(), ToolError> {
        let cmd = build_manifest_command(&self.ffmpeg, source, manifest_out, &self.options);
        run_bounded(cmd, self.transcode_timeout).await?;
        Ok(())
    }

    async fn probe_geometry(&self, path: &Path) -> Result<FrameGeometry, ToolError> {
        let cmd = build_probe_command(&self.mediainfo, path);
        let output = run_bounded(cmd, self.probe_timeout).await?;
        Ok(parse_geometry(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn transcode(
        &self,
        source: &Path,
        derivative_out: &Path,
        derivative_manifest_out: &Path,
        color: &ColorParams,
    ) -> Result<(), ToolError> {
        let cmd = build_transcode_command(
            &self.ffmpeg,
            source,
            derivative_out,
            derivative_manifest_out,
            color,
            &self.options,
        );
        run_bounded(cmd, self.transcode_timeout).await?;
        Ok(())
    }
}
