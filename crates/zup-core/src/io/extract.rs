//! Archive extraction module
//!
//! Tar-based codecs are decoded straight off the network body: the body is
//! bridged into a blocking task and fed through the decompressor into
//! [`tar::Archive`], so nothing is buffered beyond the decoder's window.
//!
//! Zip needs random access to its central directory, so it is spooled to a
//! temporary file next to the destination first and extracted from there.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use tar::EntryType;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};
use zip::ZipArchive;
use zup_schema::{ArchiveCodec, ResourceDescriptor};

use crate::config::ChecksumPolicy;
use crate::error::{EntryFailure, EntryFailureKind, Error, ExtractionError, Result};
use crate::http::ByteStream;
use crate::io::digest::{DigestReader, DigestSummary};
use crate::io::fetch::ArtifactStream;

/// Largest zstd window accepted, as a power of two (8 MiB).
pub const ZSTD_WINDOW_LOG_MAX: u32 = 23;

/// A toolchain directory produced by extraction (or found from an earlier one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDir {
    path: PathBuf,
}

impl ExtractedDir {
    /// Wrap `path` if it is an existing directory.
    pub fn locate(path: PathBuf) -> Result<Self> {
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(Self { path }),
            Ok(_) => Err(ExtractionError::MissingDirectory(path).into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ExtractionError::MissingDirectory(path).into())
            }
            Err(e) => Err(Error::filesystem("failed to inspect", &path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// Unpack `stream` under `dest` and return the directory named by the
/// resource's extraction target.
pub async fn extract(
    stream: ArtifactStream,
    resource: &ResourceDescriptor,
    dest: &Path,
    checksum: ChecksumPolicy,
) -> Result<ExtractedDir> {
    fs::create_dir_all(dest).map_err(|e| Error::filesystem("failed to create", dest, e))?;
    info!("Extracting {} archive into {}", stream.codec, dest.display());

    let summary = match stream.codec {
        ArchiveCodec::Zip => extract_zip(stream.body, resource, dest, checksum).await?,
        codec => extract_tar_stream(codec, stream.body, resource, dest, checksum).await?,
    };
    debug!("Consumed {} archive bytes", summary.bytes);

    ExtractedDir::locate(dest.join(resource.extraction_target()))
}

async fn extract_tar_stream(
    codec: ArchiveCodec,
    body: ByteStream,
    resource: &ResourceDescriptor,
    dest: &Path,
    checksum: ChecksumPolicy,
) -> Result<DigestSummary> {
    let bridge = SyncIoBridge::new(body);
    let resource = resource.clone();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<DigestSummary> {
        let mut digest = DigestReader::new(bridge, checksum);
        let mut failures = Vec::new();
        decode_tar(codec, BufReader::new(&mut digest), &dest, &mut failures)?;

        // The tar end marker can precede trailing padding; hash that too.
        io::copy(&mut digest, &mut io::sink())
            .map_err(|e| Error::network(resource.archive_url(), e))?;
        let summary = digest.finish();
        summary.verify(&resource)?;

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(ExtractionError::Entries(failures).into())
        }
    })
    .await
    .map_err(|e| ExtractionError::Stream(io::Error::other(e)))?
}

/// Run the decompressor matching `codec` and unpack the tar inside.
fn decode_tar<R: io::BufRead>(
    codec: ArchiveCodec,
    reader: R,
    dest: &Path,
    failures: &mut Vec<EntryFailure>,
) -> Result<(), ExtractionError> {
    match codec {
        ArchiveCodec::Tar => unpack_tar(reader, dest, failures),
        ArchiveCodec::TarGz => unpack_tar(flate2::bufread::GzDecoder::new(reader), dest, failures),
        ArchiveCodec::TarXz => unpack_tar(xz2::bufread::XzDecoder::new(reader), dest, failures),
        ArchiveCodec::TarZst => {
            let mut decoder =
                zstd::stream::read::Decoder::with_buffer(reader).map_err(ExtractionError::Stream)?;
            decoder
                .window_log_max(ZSTD_WINDOW_LOG_MAX)
                .map_err(ExtractionError::Stream)?;
            unpack_tar(decoder, dest, failures)
        }
        ArchiveCodec::Zip => Err(ExtractionError::Stream(io::Error::new(
            io::ErrorKind::InvalidInput,
            "zip archives cannot be streamed",
        ))),
    }
}

/// Walk a tar stream, unpacking what can be unpacked.
///
/// Entries that fail are appended to `failures` and the walk goes on. An
/// error reading the stream itself ends the walk with [`ExtractionError::Stream`].
pub fn unpack_tar<R: Read>(
    reader: R,
    dest: &Path,
    failures: &mut Vec<EntryFailure>,
) -> Result<(), ExtractionError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);

    for entry in archive.entries().map_err(ExtractionError::Stream)? {
        let mut entry = entry.map_err(ExtractionError::Stream)?;
        let entry_type = entry.header().entry_type();
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let kind = match entry_type {
            // Global pax headers carry archive metadata, not a file.
            EntryType::Directory | EntryType::XGlobalHeader => continue,
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                EntryFailureKind::CreateFile
            }
            EntryType::Symlink => EntryFailureKind::CreateSymlink,
            other => {
                failures.push(EntryFailure {
                    path,
                    kind: EntryFailureKind::UnsupportedType,
                    detail: format!("{other:?}"),
                });
                continue;
            }
        };

        match entry.unpack_in(dest) {
            Ok(true) => {}
            Ok(false) => failures.push(EntryFailure {
                path,
                kind: EntryFailureKind::CreateFile,
                detail: "path escapes the destination".into(),
            }),
            Err(e) => failures.push(EntryFailure {
                path,
                kind,
                detail: e.to_string(),
            }),
        }
    }

    if !failures.is_empty() {
        debug!("{} tar entries failed", failures.len());
    }
    Ok(())
}

async fn extract_zip(
    body: ByteStream,
    resource: &ResourceDescriptor,
    dest: &Path,
    checksum: ChecksumPolicy,
) -> Result<DigestSummary> {
    let bridge = SyncIoBridge::new(body);
    let resource = resource.clone();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<DigestSummary> {
        let spool = TempSpool::create(&dest);
        debug!("Spooling zip archive to {}", spool.path().display());

        let mut digest = DigestReader::new(bridge, checksum);
        let file = spool_body(&mut digest, spool.path(), &resource)?;
        let summary = digest.finish();
        summary.verify(&resource)?;

        let mut archive = ZipArchive::new(file).map_err(ExtractionError::Zip)?;
        archive.extract(&dest).map_err(ExtractionError::Zip)?;
        drop(archive);

        spool.remove();
        Ok(summary)
    })
    .await
    .map_err(|e| ExtractionError::Stream(io::Error::other(e)))?
}

/// Copy the whole body into a fresh file at `path` and reopen it for reading.
fn spool_body<R: Read>(reader: &mut R, path: &Path, resource: &ResourceDescriptor) -> Result<File> {
    let mut out = File::create(path).map_err(|e| Error::filesystem("failed to create", path, e))?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::network(resource.archive_url(), e)),
        };
        out.write_all(&buf[..n])
            .map_err(|e| Error::filesystem("failed to write", path, e))?;
    }
    out.sync_all()
        .map_err(|e| Error::filesystem("failed to write", path, e))?;
    drop(out);

    File::open(path).map_err(|e| Error::filesystem("failed to reopen", path, e))
}

/// Temporary zip spool, removed when dropped.
#[derive(Debug)]
struct TempSpool {
    path: PathBuf,
    armed: bool,
}

impl TempSpool {
    fn create(dir: &Path) -> Self {
        let mut token = [0u8; 20];
        rand::rng().fill(&mut token);
        Self {
            path: dir.join(format!("tmp_{}.zip", URL_SAFE_NO_PAD.encode(token))),
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn remove(mut self) {
        self.armed = false;
        discard(&self.path);
    }
}

impl Drop for TempSpool {
    fn drop(&mut self) {
        if self.armed {
            discard(&self.path);
        }
    }
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    const ROOT: &str = "zig-x86_64-linux-0.14.1";

    fn tar_bytes() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        builder
            .append_data(&mut dir, format!("{ROOT}/"), io::empty())
            .unwrap();

        for (name, body, mode) in [
            ("zig", &b"#!/bin/sh\necho 0.14.1\n"[..], 0o755),
            ("lib/std/std.zig", &b"pub const x = 1;\n"[..], 0o644),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(mode);
            builder
                .append_data(&mut header, format!("{ROOT}/{name}"), body)
                .unwrap();
        }

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        builder
            .append_link(&mut link, format!("{ROOT}/lib/std.zig"), "std/std.zig")
            .unwrap();

        builder.into_inner().unwrap()
    }

    fn encode(codec: ArchiveCodec, tar: &[u8]) -> Vec<u8> {
        match codec {
            ArchiveCodec::Tar => tar.to_vec(),
            ArchiveCodec::TarGz => {
                let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(tar).unwrap();
                enc.finish().unwrap()
            }
            ArchiveCodec::TarXz => {
                let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
                enc.write_all(tar).unwrap();
                enc.finish().unwrap()
            }
            ArchiveCodec::TarZst => zstd::encode_all(tar, 3).unwrap(),
            ArchiveCodec::Zip => {
                let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
                let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
                zip.add_directory(format!("{ROOT}/"), options).unwrap();
                zip.start_file(format!("{ROOT}/zig"), options).unwrap();
                zip.write_all(b"#!/bin/sh\necho 0.14.1\n").unwrap();
                zip.start_file(format!("{ROOT}/lib/std/std.zig"), options)
                    .unwrap();
                zip.write_all(b"pub const x = 1;\n").unwrap();
                zip.finish().unwrap().into_inner()
            }
        }
    }

    fn resource_for(codec: ArchiveCodec, payload: &[u8]) -> ResourceDescriptor {
        let url = format!("https://ziglang.org/download/0.14.1/{ROOT}{}", codec.extension());
        let digest = {
            use sha2::Digest;
            hex::encode(sha2::Sha256::digest(payload))
        };
        ResourceDescriptor::from_index_fields(&url, &digest, &payload.len().to_string()).unwrap()
    }

    fn stream(codec: ArchiveCodec, payload: Vec<u8>) -> ArtifactStream {
        ArtifactStream {
            codec,
            body: Box::new(Cursor::new(payload)),
        }
    }

    fn spool_leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("tmp_"))
            .collect()
    }

    #[tokio::test]
    async fn test_every_codec_produces_the_target_directory() {
        let tar = tar_bytes();
        for codec in ArchiveCodec::ALL {
            let dest = TempDir::new().unwrap();
            let payload = encode(codec, &tar);
            let resource = resource_for(codec, &payload);

            let dir = extract(stream(codec, payload), &resource, dest.path(), ChecksumPolicy::Verify)
                .await
                .unwrap_or_else(|e| panic!("{codec}: {e}"));

            assert_eq!(dir.path(), dest.path().join(ROOT));
            assert!(dir.path().join("zig").is_file(), "{codec}");
            let std = fs::read_to_string(dir.path().join("lib/std/std.zig")).unwrap();
            assert_eq!(std, "pub const x = 1;\n");
            assert!(spool_leftovers(dest.path()).is_empty(), "{codec}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tar_keeps_modes_and_symlinks() {
        use std::os::unix::fs::PermissionsExt;

        let dest = TempDir::new().unwrap();
        let payload = encode(ArchiveCodec::TarXz, &tar_bytes());
        let resource = resource_for(ArchiveCodec::TarXz, &payload);
        let dir = extract(stream(ArchiveCodec::TarXz, payload), &resource, dest.path(), ChecksumPolicy::Skip)
            .await
            .unwrap();

        let mode = fs::metadata(dir.path().join("zig")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        let link = dir.path().join("lib/std.zig");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("std/std.zig"));
    }

    #[test]
    fn test_unsupported_entries_are_collected() {
        let mut builder = tar::Builder::new(Vec::new());
        for i in 0..3 {
            let body = format!("file {i}");
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, format!("{ROOT}/f{i}.txt"), body.as_bytes())
                .unwrap();
        }
        for i in 0..2 {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(EntryType::Char);
            header.set_size(0);
            header.set_mode(0o600);
            header.set_device_major(1).unwrap();
            header.set_device_minor(3).unwrap();
            builder
                .append_data(&mut header, format!("{ROOT}/dev{i}"), io::empty())
                .unwrap();
        }
        let tar = builder.into_inner().unwrap();

        let dest = TempDir::new().unwrap();
        let mut failures = Vec::new();
        unpack_tar(&tar[..], dest.path(), &mut failures).unwrap();

        for i in 0..3 {
            assert!(dest.path().join(format!("{ROOT}/f{i}.txt")).is_file());
        }
        assert_eq!(failures.len(), 2);
        assert!(
            failures
                .iter()
                .all(|f| f.kind == EntryFailureKind::UnsupportedType && f.detail == "Char")
        );
        assert_eq!(failures[0].path, format!("{ROOT}/dev0"));
    }

    #[test]
    fn test_pax_global_header_is_not_a_failure() {
        let mut builder = tar::Builder::new(Vec::new());

        let records = b"52 comment=0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c\n";
        let mut global = tar::Header::new_ustar();
        global.set_entry_type(EntryType::XGlobalHeader);
        global.set_size(records.len() as u64);
        global.set_mode(0o644);
        builder
            .append_data(&mut global, "pax_global_header", &records[..])
            .unwrap();

        let mut header = tar::Header::new_ustar();
        header.set_size(3);
        header.set_mode(0o755);
        builder
            .append_data(&mut header, format!("{ROOT}/zig"), &b"zig"[..])
            .unwrap();
        let tar = builder.into_inner().unwrap();

        let dest = TempDir::new().unwrap();
        let mut failures = Vec::new();
        unpack_tar(&tar[..], dest.path(), &mut failures).unwrap();

        assert!(failures.is_empty(), "{failures:?}");
        assert!(dest.path().join(ROOT).join("zig").is_file());
        assert!(!dest.path().join("pax_global_header").exists());
    }

    #[test]
    fn test_symlink_and_escape_failures_are_collected() {
        let mut builder = tar::Builder::new(Vec::new());

        let mut file = tar::Header::new_gnu();
        file.set_size(2);
        file.set_mode(0o644);
        builder
            .append_data(&mut file, format!("{ROOT}/lib"), &b"ok"[..])
            .unwrap();

        // Parent of the link is a regular file, so the link cannot be created.
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        builder
            .append_link(&mut link, format!("{ROOT}/lib/std"), "../std")
            .unwrap();

        // `append_data` refuses `..`, so the name is written by hand.
        let name = b"../outside.txt";
        let mut escape = tar::Header::new_gnu();
        escape.as_old_mut().name[..name.len()].copy_from_slice(name);
        escape.set_size(4);
        escape.set_mode(0o644);
        escape.set_cksum();
        builder.append(&escape, &b"evil"[..]).unwrap();

        let tar = builder.into_inner().unwrap();

        let dest = TempDir::new().unwrap();
        let root = dest.path().join("root");
        fs::create_dir(&root).unwrap();
        let mut failures = Vec::new();
        unpack_tar(&tar[..], &root, &mut failures).unwrap();

        assert_eq!(failures.len(), 2, "{failures:?}");
        assert_eq!(failures[0].path, format!("{ROOT}/lib/std"));
        assert_eq!(failures[0].kind, EntryFailureKind::CreateSymlink);
        assert_eq!(failures[1].path, "../outside.txt");
        assert_eq!(failures[1].kind, EntryFailureKind::CreateFile);
        assert_eq!(failures[1].detail, "path escapes the destination");

        assert!(root.join(ROOT).join("lib").is_file());
        assert!(!dest.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn test_entry_failures_surface_as_one_error() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("{ROOT}/ok"), &b"ok"[..])
            .unwrap();
        let mut fifo = tar::Header::new_gnu();
        fifo.set_entry_type(EntryType::Fifo);
        fifo.set_size(0);
        builder
            .append_data(&mut fifo, format!("{ROOT}/pipe"), io::empty())
            .unwrap();
        let payload = builder.into_inner().unwrap();
        let resource = resource_for(ArchiveCodec::Tar, &payload);

        let dest = TempDir::new().unwrap();
        let err = extract(stream(ArchiveCodec::Tar, payload), &resource, dest.path(), ChecksumPolicy::Skip)
            .await
            .unwrap_err();
        match err {
            Error::Extraction(ExtractionError::Entries(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].path, format!("{ROOT}/pipe"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(dest.path().join(ROOT).join("ok").is_file());
    }

    #[tokio::test]
    async fn test_corrupt_stream_aborts() {
        for codec in [ArchiveCodec::Tar, ArchiveCodec::TarXz, ArchiveCodec::TarZst] {
            let payload = vec![0xA5; 2048];
            let resource = resource_for(codec, &payload);

            let dest = TempDir::new().unwrap();
            let err = extract(stream(codec, payload), &resource, dest.path(), ChecksumPolicy::Skip)
                .await
                .unwrap_err();
            assert!(
                matches!(err, Error::Extraction(ExtractionError::Stream(_))),
                "{codec}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_rejected() {
        let payload = encode(ArchiveCodec::TarZst, &tar_bytes());
        let url = format!("https://ziglang.org/download/0.14.1/{ROOT}.tar.zst");
        let resource =
            ResourceDescriptor::from_index_fields(&url, "00ff", &payload.len().to_string()).unwrap();

        let dest = TempDir::new().unwrap();
        let err = extract(stream(ArchiveCodec::TarZst, payload), &resource, dest.path(), ChecksumPolicy::Verify)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "integrity");
    }

    #[tokio::test]
    async fn test_zip_spool_removed_after_failure() {
        let payload = b"definitely not a zip archive".to_vec();
        let resource = resource_for(ArchiveCodec::Zip, &payload);

        let dest = TempDir::new().unwrap();
        let err = extract(stream(ArchiveCodec::Zip, payload), &resource, dest.path(), ChecksumPolicy::Skip)
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Extraction(ExtractionError::Zip(_))),
            "{err}"
        );
        assert!(spool_leftovers(dest.path()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_directory() {
        let payload = encode(ArchiveCodec::Tar, &tar_bytes());
        let resource = ResourceDescriptor::from_index_fields(
            "https://ziglang.org/download/0.14.1/zig-renamed.tar",
            "00",
            &payload.len().to_string(),
        )
        .unwrap();

        let dest = TempDir::new().unwrap();
        let err = extract(stream(ArchiveCodec::Tar, payload), &resource, dest.path(), ChecksumPolicy::Skip)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Extraction(ExtractionError::MissingDirectory(ref p)) if p.ends_with("zig-renamed")
        ));
    }

    #[test]
    fn test_spool_names_are_unique_and_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let a = TempSpool::create(dir.path());
        let b = TempSpool::create(dir.path());
        assert_ne!(a.path(), b.path());

        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tmp_") && name.ends_with(".zip"));
        assert_eq!(name.len(), "tmp_".len() + 27 + ".zip".len());

        fs::write(a.path(), b"x").unwrap();
        fs::write(b.path(), b"y").unwrap();
        a.remove();
        drop(b);
        assert!(spool_leftovers(dir.path()).is_empty());
    }
}
