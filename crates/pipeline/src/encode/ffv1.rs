//! FFV1 transcode driver
//!
//! Builds the ffmpeg invocations that produce frame manifests and lossless
//! FFV1 derivatives, and drives a transcode through the `MediaTools` boundary.

use crate::classify::VideoStandard;
use crate::media::{derivative_path, manifest_path};
use crate::tools::{MediaTools, ToolError};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// FFV1 bitstream version
const FFV1_LEVEL: &str = "3";

/// Every frame is a keyframe
const GOP_SIZE: &str = "1";

/// Broadcast (limited) range
const COLOR_RANGE: &str = "1";

/// Error type for transcode operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// No color metadata is defined for the file's geometry.
    #[error("Refusing to transcode a file with unclassified geometry")]
    UnclassifiedFormat,

    /// The external engine failed or left no usable output.
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Color metadata tagged onto the derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorParams {
    /// `-color_primaries`
    pub primaries: &'static str,
    /// `-color_trc`
    pub transfer_characteristics: &'static str,
    /// `-colorspace`
    pub matrix: &'static str,
}

/// Color metadata for a classified standard; `None` for `Unclassified`.
pub fn color_parameters(standard: VideoStandard) -> Option<ColorParams> {
    match standard {
        VideoStandard::Pal => Some(ColorParams {
            primaries: "bt470bg",
            transfer_characteristics: "bt709",
            matrix: "bt470bg",
        }),
        VideoStandard::Ntsc => Some(ColorParams {
            primaries: "smpte170m",
            transfer_characteristics: "bt709",
            matrix: "smpte170m",
        }),
        VideoStandard::Unclassified => None,
    }
}

/// Tunables for manifest generation and the FFV1 encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ffv1Options {
    /// Slices per frame
    pub slices: u32,
    /// Checksum audio packets as well as video frames
    pub manifest_audio: bool,
}

impl Default for Ffv1Options {
    fn default() -> Self {
        Self {
            slices: 24,
            manifest_audio: true,
        }
    }
}

/// An archival derivative and its frame manifest, both on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivative {
    pub path: PathBuf,
    pub manifest: PathBuf,
}

fn push_manifest_output(cmd: &mut Command, manifest: &Path, options: &Ffv1Options) {
    cmd.arg("-f").arg("framemd5");
    if !options.manifest_audio {
        cmd.arg("-an");
    }
    cmd.arg("-y").arg(manifest);
}

/// Build the manifest-only invocation
///
/// `ffmpeg -hide_banner -loglevel fatal -i <source> -f framemd5 [-an] -y <manifest>`
pub fn build_manifest_command(
    ffmpeg: &str,
    source: &Path,
    manifest: &Path,
    options: &Ffv1Options,
) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "fatal"]);
    cmd.arg("-i").arg(source);
    push_manifest_output(&mut cmd, manifest, options);
    cmd
}

/// Build the FFV1 transcode invocation
///
/// One pass writes both outputs: the derivative (all streams mapped, data
/// streams dropped, audio copied) and the derivative's frame manifest.
pub fn build_transcode_command(
    ffmpeg: &str,
    source: &Path,
    derivative: &Path,
    derivative_manifest: &Path,
    color: &ColorParams,
    options: &Ffv1Options,
) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "fatal"]);
    cmd.arg("-i").arg(source);

    cmd.args(["-map", "0", "-dn"]);

    // Lossless intra-only video with per-slice CRCs
    cmd.args(["-c:v", "ffv1", "-level", FFV1_LEVEL, "-g", GOP_SIZE]);
    cmd.arg("-color_primaries").arg(color.primaries);
    cmd.arg("-color_trc").arg(color.transfer_characteristics);
    cmd.arg("-colorspace").arg(color.matrix);
    cmd.args(["-color_range", COLOR_RANGE]);
    cmd.args(["-slicecrc", "1"]);
    cmd.arg("-slices").arg(options.slices.to_string());

    cmd.args(["-c:a", "copy"]);
    cmd.arg("-y").arg(derivative);

    // Second output: the derivative's frame manifest
    cmd.arg("-f").arg("framemd5");
    if !options.manifest_audio {
        cmd.arg("-an");
    }
    cmd.arg(derivative_manifest);

    cmd
}

/// Transcode `source` into its archival derivative.
///
/// Refuses `Unclassified` input. Fails if the engine fails or if either the
/// derivative or its manifest is missing afterwards.
pub async fn transcode<T: MediaTools + ?Sized>(
    tools: &T,
    source: &Path,
    standard: VideoStandard,
) -> Result<Derivative, EncodeError> {
    let color = color_parameters(standard).ok_or(EncodeError::UnclassifiedFormat)?;

    let derivative = Derivative {
        path: derivative_path(source),
        manifest: manifest_path(&derivative_path(source)),
    };

    tools
        .transcode(source, &derivative.path, &derivative.manifest, &color)
        .await?;

    for output in [&derivative.path, &derivative.manifest] {
        if !output.is_file() {
            return Err(ToolError::MissingOutput(output.clone()).into());
        }
    }

    Ok(derivative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FrameGeometry;
    use crate::testing::FakeTools;
    use proptest::prelude::*;
    use std::ffi::OsStr;
    use std::fs;
    use tempfile::TempDir;

    /// Helper to convert Command args to a Vec of strings for easier testing
    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    /// Helper to check if args contain a flag with a specific value
    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|arg| arg == flag)
    }

    #[test]
    fn test_color_parameters_table() {
        assert_eq!(
            color_parameters(VideoStandard::Pal),
            Some(ColorParams {
                primaries: "bt470bg",
                transfer_characteristics: "bt709",
                matrix: "bt470bg",
            })
        );
        assert_eq!(
            color_parameters(VideoStandard::Ntsc),
            Some(ColorParams {
                primaries: "smpte170m",
                transfer_characteristics: "bt709",
                matrix: "smpte170m",
            })
        );
        assert_eq!(color_parameters(VideoStandard::Unclassified), None);
    }

    #[test]
    fn test_manifest_command() {
        let cmd = build_manifest_command(
            "ffmpeg",
            Path::new("/staging/clip.mov"),
            Path::new("/staging/clip.mov.framemd5"),
            &Ffv1Options::default(),
        );
        let args = get_command_args(&cmd);

        assert_eq!(cmd.get_program(), OsStr::new("ffmpeg"));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-loglevel",
                "fatal",
                "-i",
                "/staging/clip.mov",
                "-f",
                "framemd5",
                "-y",
                "/staging/clip.mov.framemd5",
            ]
        );
    }

    #[test]
    fn test_manifest_command_without_audio() {
        let options = Ffv1Options {
            manifest_audio: false,
            ..Default::default()
        };
        let cmd = build_manifest_command(
            "ffmpeg",
            Path::new("/s/a.mov"),
            Path::new("/s/a.mov.framemd5"),
            &options,
        );
        let args = get_command_args(&cmd);
        let an = args.iter().position(|a| a == "-an").expect("-an present");
        let out = args.iter().position(|a| a == "/s/a.mov.framemd5").unwrap();
        assert!(an < out);
    }

    // The transcode invocation carries every lossless and metadata switch, and
    // the manifest output comes after the derivative output
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_transcode_command_completeness(
            stem in "[a-zA-Z0-9_-]{1,20}",
            slices in 1u32..64,
            manifest_audio in proptest::bool::ANY,
            standard in prop_oneof![Just(VideoStandard::Pal), Just(VideoStandard::Ntsc)],
        ) {
            let source = PathBuf::from(format!("/staging/{}.mov", stem));
            let derivative = derivative_path(&source);
            let derivative_manifest = manifest_path(&derivative);
            let color = color_parameters(standard).unwrap();
            let options = Ffv1Options { slices, manifest_audio };

            let cmd = build_transcode_command(
                "ffmpeg", &source, &derivative, &derivative_manifest, &color, &options,
            );
            let args = get_command_args(&cmd);
            let derivative_str = derivative.to_string_lossy().into_owned();
            let manifest_str = derivative_manifest.to_string_lossy().into_owned();

            prop_assert!(has_flag_with_value(&args, "-i", &source.to_string_lossy()));
            prop_assert!(has_flag_with_value(&args, "-map", "0"));
            prop_assert!(has_flag(&args, "-dn"));
            prop_assert!(has_flag_with_value(&args, "-c:v", "ffv1"));
            prop_assert!(has_flag_with_value(&args, "-level", "3"));
            prop_assert!(has_flag_with_value(&args, "-g", "1"));
            prop_assert!(has_flag_with_value(&args, "-color_primaries", color.primaries));
            prop_assert!(has_flag_with_value(&args, "-color_trc", color.transfer_characteristics));
            prop_assert!(has_flag_with_value(&args, "-colorspace", color.matrix));
            prop_assert!(has_flag_with_value(&args, "-color_range", "1"));
            prop_assert!(has_flag_with_value(&args, "-slicecrc", "1"));
            prop_assert!(has_flag_with_value(&args, "-slices", &slices.to_string()));
            prop_assert!(has_flag_with_value(&args, "-c:a", "copy"));
            prop_assert!(has_flag_with_value(&args, "-y", &derivative_str));
            prop_assert_eq!(has_flag(&args, "-an"), !manifest_audio);

            let derivative_at = args.iter().position(|a| a == &derivative_str).unwrap();
            let framemd5_at = args.iter().rposition(|a| a == "framemd5").unwrap();
            prop_assert!(derivative_at < framemd5_at);
            prop_assert_eq!(args.last(), Some(&manifest_str));
        }
    }

    #[tokio::test]
    async fn test_transcode_refuses_unclassified() {
        let tools = FakeTools::new(FrameGeometry::default());
        let result = transcode(&tools, Path::new("/staging/clip.mov"), VideoStandard::Unclassified).await;
        assert!(matches!(result, Err(EncodeError::UnclassifiedFormat)));
        assert_eq!(tools.transcode_calls(), 0);
    }

    #[tokio::test]
    async fn test_transcode_writes_derivative_and_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("clip.mov");
        fs::write(&source, b"dv frames").unwrap();

        let tools = FakeTools::new(FrameGeometry::new(576, 720));
        let derivative = transcode(&tools, &source, VideoStandard::Pal).await.unwrap();

        assert_eq!(derivative.path, temp_dir.path().join("clip.mkv"));
        assert_eq!(derivative.manifest, temp_dir.path().join("clip.mkv.framemd5"));
        assert!(derivative.path.is_file());
        assert!(derivative.manifest.is_file());
        assert_eq!(tools.last_color(), color_parameters(VideoStandard::Pal));
    }

    #[tokio::test]
    async fn test_transcode_missing_output_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("clip.mov");
        fs::write(&source, b"dv frames").unwrap();

        let tools = FakeTools::new(FrameGeometry::new(576, 720)).silent_transcode();
        let result = transcode(&tools, &source, VideoStandard::Pal).await;

        match result {
            Err(EncodeError::Tool(ToolError::MissingOutput(path))) => {
                assert_eq!(path, temp_dir.path().join("clip.mkv"));
            }
            other => panic!("Expected MissingOutput, got {:?}", other),
        }
    }
}
