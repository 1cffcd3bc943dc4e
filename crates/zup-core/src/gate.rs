//! Decides whether an installed compiler already reports the wanted version.

use std::io;
use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Argument that makes the compiler print its version and exit.
const VERSION_QUERY: &str = "version";

/// Returns `true` when `exe` must be replaced to reach `resolved_version`.
///
/// A missing executable is not an error: it simply needs installing. Any
/// other spawn failure is returned as [`Error::Probe`].
pub async fn needs_update(exe: &Path, resolved_version: &str) -> Result<bool> {
    let output = match Command::new(exe).arg(VERSION_QUERY).output().await {
        Ok(output) => output,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} not found, update needed", exe.display());
            return Ok(true);
        }
        Err(source) => {
            return Err(Error::Probe {
                path: exe.to_path_buf(),
                source,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let reported = stdout.trim();
    let wanted = resolved_version.trim();
    let stale = !reported.eq_ignore_ascii_case(wanted);
    debug!(
        "{} reports '{reported}', want '{wanted}': {}",
        exe.display(),
        if stale { "stale" } else { "current" }
    );
    Ok(stale)
}
