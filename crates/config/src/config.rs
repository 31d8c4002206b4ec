//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A required directory was not configured
    MissingPath(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::MissingPath(name) => write!(
                f,
                "No {} directory configured (set paths.{} or the matching environment variable)",
                name, name
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PathsConfig {
    /// Directory files are picked up from
    pub staging: Option<PathBuf>,
    /// Directory verified files are delivered to
    pub backup: Option<PathBuf>,
    /// Directory failed files are pulled aside into
    pub quarantine: Option<PathBuf>,
    /// Directory for the per-run log file (stderr only if unset)
    pub logs: Option<PathBuf>,
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// ffmpeg executable used for manifests and transcodes
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    /// mediainfo executable used for geometry probing
    #[serde(default = "default_mediainfo")]
    pub mediainfo: String,
    /// Upper bound on a single mediainfo run
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Upper bound on a single ffmpeg run (manifest or transcode)
    #[serde(default = "default_transcode_timeout_secs")]
    pub transcode_timeout_secs: u64,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_mediainfo() -> String {
    "mediainfo".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    300
}

fn default_transcode_timeout_secs() -> u64 {
    12 * 60 * 60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            mediainfo: default_mediainfo(),
            probe_timeout_secs: default_probe_timeout_secs(),
            transcode_timeout_secs: default_transcode_timeout_secs(),
        }
    }
}

/// FFV1 transcode configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeConfig {
    /// Number of FFV1 slices per frame
    #[serde(default = "default_slices")]
    pub slices: u32,
    /// Include audio streams in frame manifests (false passes `-an`)
    #[serde(default = "default_manifest_audio")]
    pub manifest_audio: bool,
}

fn default_slices() -> u32 {
    24
}

fn default_manifest_audio() -> bool {
    true
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            slices: default_slices(),
            manifest_audio: default_manifest_audio(),
        }
    }
}

/// Pipeline policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Keep a digest record that already sits next to a direct-copy file in
    /// staging and verify the moved file against it
    #[serde(default = "default_trust_existing_records")]
    pub trust_existing_records: bool,
}

fn default_trust_existing_records() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            trust_existing_records: default_trust_existing_records(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// The three directories a run moves files between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub staging: PathBuf,
    pub backup: PathBuf,
    pub quarantine: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - STAGING_AREA -> paths.staging
    /// - BACKUP_STORE -> paths.backup
    /// - QUARANTINE -> paths.quarantine
    /// - LOGS -> paths.logs
    /// - FFMPEG_PATH -> tools.ffmpeg
    /// - MEDIAINFO_PATH -> tools.mediainfo
    /// - PROBE_TIMEOUT_SECS -> tools.probe_timeout_secs
    /// - TRANSCODE_TIMEOUT_SECS -> tools.transcode_timeout_secs
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = non_empty_var("STAGING_AREA") {
            self.paths.staging = Some(PathBuf::from(dir));
        }

        if let Some(dir) = non_empty_var("BACKUP_STORE") {
            self.paths.backup = Some(PathBuf::from(dir));
        }

        if let Some(dir) = non_empty_var("QUARANTINE") {
            self.paths.quarantine = Some(PathBuf::from(dir));
        }

        if let Some(dir) = non_empty_var("LOGS") {
            self.paths.logs = Some(PathBuf::from(dir));
        }

        if let Some(program) = non_empty_var("FFMPEG_PATH") {
            self.tools.ffmpeg = program;
        }

        if let Some(program) = non_empty_var("MEDIAINFO_PATH") {
            self.tools.mediainfo = program;
        }

        // Unparsable values keep the existing setting
        if let Some(val) = non_empty_var("PROBE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.tools.probe_timeout_secs = secs;
            }
        }

        if let Some(val) = non_empty_var("TRANSCODE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.tools.transcode_timeout_secs = secs;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build configuration from defaults and environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Resolve the staging, backup and quarantine directories.
    ///
    /// Fails with `ConfigError::MissingPath` naming the first directory that
    /// is not configured.
    pub fn directory_layout(&self) -> Result<DirectoryLayout, ConfigError> {
        let staging = self
            .paths
            .staging
            .clone()
            .ok_or(ConfigError::MissingPath("staging"))?;
        let backup = self
            .paths
            .backup
            .clone()
            .ok_or(ConfigError::MissingPath("backup"))?;
        let quarantine = self
            .paths
            .quarantine
            .clone()
            .ok_or(ConfigError::MissingPath("quarantine"))?;

        Ok(DirectoryLayout {
            staging,
            backup,
            quarantine,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
