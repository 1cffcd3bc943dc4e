//! Run configuration resolved from the environment.
//!
//! - `ZUP_INDEX_URL`: remote version index (default: [`DEFAULT_INDEX_URL`])
//! - `ZUP_INSTALL_DIR`: where toolchains are unpacked and the entry point is
//!   linked (default: the directory holding the running executable)
//! - `ZUP_VERIFY_CHECKSUM`: `1` or `true` to verify downloaded archives

use std::path::PathBuf;

use url::Url;

use crate::error::{Error, Result};

/// The official Zig download index.
pub const DEFAULT_INDEX_URL: &str = "https://ziglang.org/download/index.json";

/// Whether downloaded archives are checked against the index's shasum and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Trust the transport; the published digest is parsed but unused.
    #[default]
    Skip,
    /// Hash and count every received byte and reject mismatches.
    Verify,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub index_url: Url,
    pub install_dir: PathBuf,
    pub checksum: ChecksumPolicy,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw_url = lookup("ZUP_INDEX_URL").unwrap_or_else(|| DEFAULT_INDEX_URL.to_string());
        let index_url = Url::parse(&raw_url)
            .map_err(|e| Error::Config(format!("ZUP_INDEX_URL '{raw_url}': {e}")))?;

        let install_dir = match lookup("ZUP_INSTALL_DIR").filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => executable_dir()?,
        };

        let checksum = match lookup("ZUP_VERIFY_CHECKSUM") {
            Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => ChecksumPolicy::Verify,
            _ => ChecksumPolicy::Skip,
        };

        Ok(Self {
            index_url,
            install_dir,
            checksum,
        })
    }
}

fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| Error::Config(format!("cannot locate running executable: {e}")))?;
    exe.parent()
        .map(std::path::Path::to_path_buf)
        .ok_or_else(|| Error::Config(format!("{} has no parent directory", exe.display())))
}
