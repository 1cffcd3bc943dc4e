//! Archive codec classification.
//!
//! A release archive's codec is inferred from whatever the server tells us,
//! which is not always consistent. The signals are tried in a fixed order:
//!
//! 1. The MIME type of `Content-Type` (parameters stripped).
//! 2. For generic MIME types, the file name in `Content-Disposition`.
//! 3. The suffix of the request path.
//!
//! The lookup tables are plain data so each source can be tested on its own.

use std::fmt;

use thiserror::Error;

/// Compression/container format of a release archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveCodec {
    /// Uncompressed tar archive (`.tar`).
    Tar,
    /// Gzip-compressed tar archive (`.tar.gz` / `.tgz`).
    TarGz,
    /// XZ-compressed tar archive (`.tar.xz` / `.txz`).
    TarXz,
    /// Zstandard-compressed tar archive (`.tar.zst` / `.tzst`).
    TarZst,
    /// Zip archive (`.zip` / `.jar`).
    Zip,
}

/// MIME types that identify a codec outright.
const MIME_TABLE: &[(&str, ArchiveCodec)] = &[
    ("application/x-tar", ArchiveCodec::Tar),
    ("application/gzip", ArchiveCodec::TarGz),
    ("application/x-gzip", ArchiveCodec::TarGz),
    ("application/tar+gzip", ArchiveCodec::TarGz),
    ("application/x-tar-gz", ArchiveCodec::TarGz),
    ("application/x-gtar-compressed", ArchiveCodec::TarGz),
    ("application/x-xz", ArchiveCodec::TarXz),
    ("application/zstd", ArchiveCodec::TarZst),
    ("application/zip", ArchiveCodec::Zip),
    ("application/x-zip-compressed", ArchiveCodec::Zip),
    ("application/java-archive", ArchiveCodec::Zip),
];

/// MIME types that say nothing about the payload and defer to file names.
const GENERIC_MIME_TYPES: &[&str] = &["application/octet-stream", "application/x-compressed"];

/// File name suffixes, canonical suffix first for each codec.
const SUFFIX_TABLE: &[(&str, ArchiveCodec)] = &[
    (".tar", ArchiveCodec::Tar),
    (".tar.gz", ArchiveCodec::TarGz),
    (".tgz", ArchiveCodec::TarGz),
    (".tar.xz", ArchiveCodec::TarXz),
    (".txz", ArchiveCodec::TarXz),
    (".tar.zst", ArchiveCodec::TarZst),
    (".tzst", ArchiveCodec::TarZst),
    (".zip", ArchiveCodec::Zip),
    (".jar", ArchiveCodec::Zip),
];

/// Failure to settle on a codec for a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The server sent a specific MIME type we cannot unpack.
    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    /// No header or path suffix identified the archive format.
    #[error("cannot determine archive format of '{path}' (content type: {content_type})")]
    Undetermined {
        /// MIME type the server sent, or `none`.
        content_type: String,
        /// Request path that was inspected last.
        path: String,
    },
}

impl ArchiveCodec {
    /// All codecs, in table order.
    pub const ALL: [ArchiveCodec; 5] = [
        ArchiveCodec::Tar,
        ArchiveCodec::TarGz,
        ArchiveCodec::TarXz,
        ArchiveCodec::TarZst,
        ArchiveCodec::Zip,
    ];

    /// Canonical file extension, including the leading dot.
    pub fn extension(self) -> &'static str {
        self.suffixes().next().unwrap_or_default()
    }

    /// Every suffix that maps to this codec, canonical first.
    pub fn suffixes(self) -> impl Iterator<Item = &'static str> {
        SUFFIX_TABLE
            .iter()
            .filter(move |(_, codec)| *codec == self)
            .map(|(suffix, _)| *suffix)
    }

    /// Whether the codec is a tar container (streamable).
    pub fn is_tar(self) -> bool {
        !matches!(self, ArchiveCodec::Zip)
    }

    /// Look up an exact MIME type (no parameters).
    pub fn from_mime(mime: &str) -> Option<Self> {
        MIME_TABLE
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(mime))
            .map(|(_, codec)| *codec)
    }

    /// Classify a file name or path by its suffix.
    pub fn from_file_name(name: &str) -> Option<Self> {
        split_archive_suffix(name).map(|(_, codec)| codec)
    }
}

impl fmt::Display for ArchiveCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension().trim_start_matches('.'))
    }
}

/// Split a file name into its stem and the codec its suffix denotes.
///
/// ```
/// use zup_schema::codec::{split_archive_suffix, ArchiveCodec};
///
/// assert_eq!(
///     split_archive_suffix("zig-linux-x86_64-0.14.1.tar.xz"),
///     Some(("zig-linux-x86_64-0.14.1", ArchiveCodec::TarXz))
/// );
/// assert_eq!(split_archive_suffix("README"), None);
/// ```
pub fn split_archive_suffix(name: &str) -> Option<(&str, ArchiveCodec)> {
    SUFFIX_TABLE.iter().find_map(|(suffix, codec)| {
        let cut = name.len().checked_sub(suffix.len())?;
        let tail = name.get(cut..)?;
        tail.eq_ignore_ascii_case(suffix)
            .then(|| (&name[..cut], *codec))
    })
}

/// The MIME type portion of a `Content-Type` value.
pub fn mime_essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// Extract the file name from a `Content-Disposition` value.
///
/// Accepts both `filename=` and `filename*=`, quoted or bare. For the
/// extended form the `charset'lang'` prefix is dropped.
pub fn content_disposition_filename(value: &str) -> Option<&str> {
    split_params(value).into_iter().skip(1).find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        let key = key.trim();
        let extended = key.ends_with('*');
        if !key.trim_end_matches('*').trim_end().eq_ignore_ascii_case("filename") {
            return None;
        }

        let mut name = raw.trim();
        if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
            name = &name[1..name.len() - 1];
        }
        if extended {
            if let Some((_, rest)) = name.split_once("''") {
                name = rest;
            }
        }
        (!name.is_empty()).then_some(name)
    })
}

/// Split a header value on `;`, leaving quoted strings intact.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

/// Decide the codec of a response from its headers and request path.
pub fn detect(
    content_type: Option<&str>,
    content_disposition: Option<&str>,
    request_path: &str,
) -> Result<ArchiveCodec, CodecError> {
    let mime = content_type.map(mime_essence).filter(|m| !m.is_empty());

    if let Some(mime) = mime {
        if let Some(codec) = ArchiveCodec::from_mime(mime) {
            return Ok(codec);
        }
        if !GENERIC_MIME_TYPES
            .iter()
            .any(|generic| generic.eq_ignore_ascii_case(mime))
        {
            return Err(CodecError::UnsupportedContentType(mime.to_string()));
        }
    }

    content_disposition
        .and_then(content_disposition_filename)
        .and_then(ArchiveCodec::from_file_name)
        .or_else(|| ArchiveCodec::from_file_name(request_path))
        .ok_or_else(|| CodecError::Undetermined {
            content_type: mime.unwrap_or("none").to_string(),
            path: request_path.to_string(),
        })
}
