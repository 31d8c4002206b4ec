//! Digest engine: content fingerprints and their sidecar records.
//!
//! Files are fingerprinted with a 128-bit MD5 digest so the sidecars can be
//! checked with stock tools (`md5sum -c`). A record is a single line in the
//! conventional binary-mode format `<digest> *<basename>`.

use crate::media::digest_record_path;
use md5::{Digest, Md5};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Read size used while streaming a file into the digest.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Length of a digest in bytes.
pub const DIGEST_LEN: usize = 16;

/// Errors from computing, writing or reading digests.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Open, read or write failure on a primary file or record.
    #[error("IO error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// The record exists but is not in `<digest> *<basename>` form.
    #[error("Malformed digest record {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// A fixed-length content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self)
    }
}

impl FromStr for ContentDigest {
    type Err = String;

    /// Parses exactly 32 lowercase hex characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(format!("expected {} hex characters, got {}", DIGEST_LEN * 2, s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(format!("not a lowercase hex digest: {:?}", s));
        }

        let mut bytes = [0u8; DIGEST_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|e| e.to_string())?;
        }
        Ok(Self(bytes))
    }
}

/// Parsed contents of a digest-record sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestRecord {
    pub digest: ContentDigest,
    /// Basename of the fingerprinted file.
    pub file_name: String,
}

impl DigestRecord {
    pub fn new(digest: &ContentDigest, file_name: impl Into<String>) -> Self {
        Self {
            digest: *digest,
            file_name: file_name.into(),
        }
    }

    /// Record line in `<digest> *<basename>` form, without a trailing newline.
    pub fn to_line(&self) -> String {
        format!("{} *{}", self.digest, self.file_name)
    }

    /// Parses a record line. Both binary (`<digest> *<name>`) and text
    /// (`<digest>  <name>`) forms are accepted; a trailing newline is ignored.
    /// The digest must be lowercase hex.
    pub fn parse(text: &str) -> Result<Self, String> {
        let line = text.lines().next().unwrap_or("").trim_end();
        let (digest, rest) = line
            .split_once(' ')
            .ok_or_else(|| "missing separator between digest and file name".to_string())?;

        let digest: ContentDigest = digest.parse()?;

        let file_name = rest
            .strip_prefix('*')
            .or_else(|| rest.strip_prefix(' '))
            .unwrap_or(rest);
        if file_name.is_empty() {
            return Err("missing file name".to_string());
        }

        Ok(Self {
            digest,
            file_name: file_name.to_string(),
        })
    }

    pub fn matches(&self, expected: &ContentDigest) -> bool {
        self.digest == *expected
    }
}

/// Streams `path` through the digest in bounded chunks.
pub fn compute_digest(path: &Path) -> Result<ContentDigest, DigestError> {
    let io_err = |source| DigestError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(e)),
        };
        hasher.update(&buffer[..read]);
        total += read as u64;
    }

    let digest = ContentDigest::from_bytes(hasher.finalize().into());
    debug!(file = %path.display(), bytes = total, digest = %digest, "Computed digest");
    Ok(digest)
}

/// Writes `<path>.md5` for `path` and returns the record's location.
pub fn write_digest_record(path: &Path, digest: &ContentDigest) -> Result<PathBuf, DigestError> {
    let record_path = digest_record_path(path);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let record = DigestRecord::new(digest, file_name);
    fs::write(&record_path, record.to_line()).map_err(|source| DigestError::Io {
        path: record_path.clone(),
        source,
    })?;

    Ok(record_path)
}

/// Reads and parses the `<path>.md5` record belonging to `path`.
pub fn read_digest_record(path: &Path) -> Result<DigestRecord, DigestError> {
    let record_path = digest_record_path(path);
    let text = fs::read_to_string(&record_path).map_err(|source| DigestError::Io {
        path: record_path.clone(),
        source,
    })?;

    DigestRecord::parse(&text).map_err(|reason| DigestError::Malformed {
        path: record_path,
        reason,
    })
}

/// Checks the record stored next to `path` against `expected`.
///
/// A missing, unreadable or malformed record fails verification exactly like
/// a mismatch does.
pub fn verify_digest_record(path: &Path, expected: &ContentDigest) -> bool {
    match read_digest_record(path) {
        Ok(record) => record.matches(expected),
        Err(e) => {
            debug!(file = %path.display(), error = %e, "Digest record unusable");
            false
        }
    }
}
