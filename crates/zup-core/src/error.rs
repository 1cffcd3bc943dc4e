//! Error taxonomy for a zup run.
//!
//! Every failure surfaces to the caller unrecovered; the only outcomes that
//! are converted into ordinary values are "executable not found" (see
//! [`crate::gate`]) and best-effort cleanup failures, which are logged and
//! dropped where they happen.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zup_schema::CodecError;
use zup_schema::types::DescriptorError;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("malformed index: {0}")]
    MalformedIndex(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("archive format: {0}")]
    Codec(#[from] CodecError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("{context} {}: {source}", .path.display())]
    Filesystem {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run {}: {source}", .path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn network(url: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn filesystem(context: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Filesystem {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short label naming the failure kind, for terminal messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::MalformedIndex(_) => "malformed-index",
            Self::Lookup(_) => "lookup",
            Self::Codec(_) => "codec",
            Self::Extraction(_) => "extraction",
            Self::Filesystem { .. } => "filesystem",
            Self::Probe { .. } => "probe",
            Self::Integrity { .. } => "integrity",
            Self::Config(_) => "config",
        }
    }
}

impl From<DescriptorError> for Error {
    fn from(err: DescriptorError) -> Self {
        Self::MalformedIndex(err.to_string())
    }
}

/// The requested version or platform is absent from the index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("version '{0}' not found in index")]
    Version(String),

    #[error("platform '{platform}' not available for version '{version}'")]
    Platform { version: String, platform: String },
}

/// Why unpacking an archive did not produce a usable toolchain tree.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Some tar entries could not be materialized; the rest were.
    #[error("{} archive entries failed: {}", .0.len(), join_failures(.0))]
    Entries(Vec<EntryFailure>),

    /// The byte stream could not be decoded at all.
    #[error("archive stream unreadable: {0}")]
    Stream(#[source] io::Error),

    #[error("zip archive unreadable: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive did not produce directory {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("extracted tree has no compiler at {}", .0.display())]
    MissingEntryPoint(PathBuf),
}

fn join_failures(failures: &[EntryFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One tar entry that was skipped during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub path: String,
    pub kind: EntryFailureKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFailureKind {
    CreateFile,
    CreateSymlink,
    UnsupportedType,
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            EntryFailureKind::CreateFile => "unable to create file",
            EntryFailureKind::CreateSymlink => "unable to create symlink",
            EntryFailureKind::UnsupportedType => "unsupported entry type",
        };
        write!(f, "{}: {what} ({})", self.path, self.detail)
    }
}
