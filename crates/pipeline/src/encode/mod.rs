//! Transcoding modules for vidarchive

pub mod ffv1;

pub use ffv1::{
    build_manifest_command, build_transcode_command, color_parameters, transcode, ColorParams,
    Derivative, EncodeError, Ffv1Options,
};
