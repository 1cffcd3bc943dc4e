//! Per-run context.
//!
//! Groups the state every pipeline stage needs so it is built once at startup
//! and dropped in one step when the run ends. Open files, directory handles
//! and response bodies are not held here; each stage releases its own.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use zup_schema::Platform;

use crate::config::Config;
use crate::http::HttpClient;

#[derive(Clone)]
pub struct Context {
    pub client: Arc<dyn HttpClient>,
    pub config: Config,
    pub platform: Platform,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(client: Arc<dyn HttpClient>, config: Config, platform: Platform) -> Self {
        Self {
            client,
            config,
            platform,
        }
    }

    /// Directory holding extracted toolchains and the entry-point link.
    pub fn install_dir(&self) -> &Path {
        &self.config.install_dir
    }

    /// Path of the active entry point, e.g. `<install_dir>/zig`.
    pub fn entry_point(&self) -> std::path::PathBuf {
        self.install_dir().join(self.platform.entry_point_name())
    }
}
