//! Index value types: release archives and resolved targets.

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::codec::split_archive_suffix;
use crate::platform::ENTRY_POINT_NAMES;

/// A downloadable release archive as published in the remote index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    archive_url: Url,
    checksum_hex: String,
    declared_size: u64,
    target: ExtractionTarget,
}

/// Errors that can occur when building a [`ResourceDescriptor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// The archive URL does not parse.
    #[error("invalid archive URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending value.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The archive URL has no usable file name to derive a directory from.
    #[error("archive URL '{0}' does not name a file")]
    NoFileName(String),

    /// The archive would extract over the entry-point link.
    #[error("archive URL '{0}' extracts to a reserved name")]
    ReservedName(String),

    /// The size field is not a decimal unsigned integer.
    #[error("invalid archive size '{0}'")]
    InvalidSize(String),
}

impl ResourceDescriptor {
    /// Build a descriptor from the string fields of an index entry.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::InvalidUrl`] if `tarball` is not a URL,
    /// [`DescriptorError::NoFileName`] if its path has no usable last segment,
    /// [`DescriptorError::ReservedName`] if it would extract to `zig`/`zig.exe`,
    /// or [`DescriptorError::InvalidSize`] if `size` is not an unsigned integer.
    pub fn from_index_fields(
        tarball: &str,
        shasum: &str,
        size: &str,
    ) -> Result<Self, DescriptorError> {
        let archive_url = Url::parse(tarball).map_err(|e| DescriptorError::InvalidUrl {
            url: tarball.to_string(),
            reason: e.to_string(),
        })?;
        let declared_size = size
            .trim()
            .parse::<u64>()
            .map_err(|_| DescriptorError::InvalidSize(size.to_string()))?;
        let target = ExtractionTarget::from_url(&archive_url).ok_or_else(|| {
            let reserved = archive_url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .is_some_and(|name| is_entry_point(archive_stem(name)));
            if reserved {
                DescriptorError::ReservedName(tarball.to_string())
            } else {
                DescriptorError::NoFileName(tarball.to_string())
            }
        })?;

        Ok(Self {
            archive_url,
            checksum_hex: shasum.trim().to_string(),
            declared_size,
            target,
        })
    }

    /// Where the archive is downloaded from.
    pub fn archive_url(&self) -> &Url {
        &self.archive_url
    }

    /// Published SHA-256 digest, hex encoded.
    pub fn checksum_hex(&self) -> &str {
        &self.checksum_hex
    }

    /// Published archive size in bytes.
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Directory name the archive unpacks to.
    pub fn extraction_target(&self) -> &ExtractionTarget {
        &self.target
    }
}

/// A version alias resolved against the index for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Authoritative version string, never empty.
    pub canonical_version: String,
    /// The archive to install.
    pub resource: ResourceDescriptor,
}

/// Directory name an archive extracts to: its file name minus the archive suffix.
///
/// `zig-linux-x86_64-0.14.1.tar.xz` extracts to `zig-linux-x86_64-0.14.1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractionTarget(String);

impl ExtractionTarget {
    /// Derive the target from the last path segment of an archive URL.
    ///
    /// Returns `None` when the URL has no file name or the derived name is
    /// not a plain directory name.
    pub fn from_url(url: &Url) -> Option<Self> {
        let file_name = url.path_segments()?.next_back()?;
        Self::from_file_name(file_name)
    }

    /// Derive the target from an archive file name.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = archive_stem(file_name);
        let usable = !stem.is_empty()
            && stem != "."
            && stem != ".."
            && !stem.contains(['/', '\\'])
            && !is_entry_point(stem);
        usable.then(|| Self(stem.to_string()))
    }

    /// The directory name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn archive_stem(file_name: &str) -> &str {
    split_archive_suffix(file_name).map_or(file_name, |(stem, _)| stem)
}

// The entry-point link lives beside the extraction directories.
fn is_entry_point(stem: &str) -> bool {
    ENTRY_POINT_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(stem))
}

impl fmt::Display for ExtractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<std::path::Path> for ExtractionTarget {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}
