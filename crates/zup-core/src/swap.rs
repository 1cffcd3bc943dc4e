//! Installs a resolved toolchain and points the entry-point link at it.
//!
//! An extraction directory whose compiler already reports the wanted version
//! is reused without touching the network. Anything else found under that
//! name is thrown away and replaced by a fresh download.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zup_schema::{Platform, ResolvedTarget};

use crate::config::ChecksumPolicy;
use crate::context::Context;
use crate::error::{Error, ExtractionError, Result};
use crate::gate;
use crate::http::HttpClient;
use crate::io::extract::{self, ExtractedDir};
use crate::io::fetch;

pub struct InstallSwapper<'a> {
    client: &'a dyn HttpClient,
    platform: &'a Platform,
    checksum: ChecksumPolicy,
}

impl<'a> InstallSwapper<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            client: ctx.client.as_ref(),
            platform: &ctx.platform,
            checksum: ctx.config.checksum,
        }
    }

    /// Make `target` the active toolchain under `dest`.
    ///
    /// Returns the directory that now backs `dest/<entry point>`.
    pub async fn reconcile(&self, target: &ResolvedTarget, dest: &Path) -> Result<ExtractedDir> {
        let candidate = dest.join(target.resource.extraction_target());

        let dir = match self.reusable(&candidate, &target.canonical_version).await {
            Some(dir) => {
                info!("Reusing {}", dir.path().display());
                dir
            }
            None => {
                discard_stale(&candidate);
                let stream = fetch::open_artifact_stream(self.client, &target.resource).await?;
                extract::extract(stream, &target.resource, dest, self.checksum).await?
            }
        };

        let exe = dir.path().join(self.platform.entry_point_name());
        if !exe.is_file() {
            return Err(ExtractionError::MissingEntryPoint(exe).into());
        }
        self.link_entry_point(&exe, dest)?;
        Ok(dir)
    }

    async fn reusable(&self, candidate: &Path, version: &str) -> Option<ExtractedDir> {
        if !candidate.is_dir() {
            return None;
        }
        let exe = candidate.join(self.platform.entry_point_name());
        match gate::needs_update(&exe, version).await {
            Ok(false) => ExtractedDir::locate(candidate.to_path_buf()).ok(),
            Ok(true) => {
                debug!("{} is stale", candidate.display());
                None
            }
            Err(e) => {
                debug!("Cannot probe {}: {e}", exe.display());
                None
            }
        }
    }

    /// Replace `dest/<entry point>` with a symlink to the real path of `exe`.
    ///
    /// The old link is deleted before the new one is created, so a concurrent
    /// reader can briefly see no entry point.
    pub fn link_entry_point(&self, exe: &Path, dest: &Path) -> Result<PathBuf> {
        let real = fs::canonicalize(exe).map_err(|e| Error::filesystem("failed to resolve", exe, e))?;
        let link = dest.join(self.platform.entry_point_name());

        match fs::remove_file(&link) {
            Ok(()) => debug!("Removed previous {}", link.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::filesystem("failed to remove", &link, e)),
        }
        symlink(&real, &link).map_err(|e| Error::filesystem("failed to link", &link, e))?;

        info!("Linked {} -> {}", link.display(), real.display());
        Ok(link)
    }
}

fn discard_stale(dir: &Path) {
    if fs::symlink_metadata(dir).is_err() {
        return;
    }
    debug!("Removing stale {}", dir.display());
    if let Err(e) = fs::remove_dir_all(dir) {
        warn!("Failed to remove {}: {e}", dir.display());
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}
