//! zup - keeps a Zig toolchain current
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Resolves a version alias against the official download index, installs
//! the matching release next to the running executable (or under
//! `ZUP_INSTALL_DIR`) and points the `zig` entry point at it.
//!
//! # Directory Layout
//!
//! ```text
//! <install dir>/
//! ├── zig                          # Symlink to the active compiler
//! ├── zig-x86_64-linux-0.14.1/     # One directory per extracted release
//! └── zig-x86_64-linux-0.15.0-dev…/
//! ```

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::info;
use zup_core::index::NIGHTLY_ALIAS;
use zup_core::{Config, Context, ReqwestClient, UpdateOutcome};
use zup_schema::Platform;

#[derive(Debug, Parser)]
#[command(name = "zup")]
#[command(about = "Install or update the Zig compiler", disable_version_flag = true)]
pub struct Cli {
    /// Version alias from the index, e.g. `master` or `0.14.1`
    #[arg(short = 'v', long = "version", default_value = NIGHTLY_ALIAS)]
    pub version: String,

    /// Platform key from the index, e.g. `x86_64-linux`
    #[arg(short = 't', long = "target", default_value_t = Platform::host().to_string())]
    pub target: String,
}

/// Parse `args`, returning `None` when the process should just exit cleanly.
///
/// `--help` goes to stdout. Anything clap rejects prints the error and the
/// help text to stderr.
pub fn parse_args<I, T>(args: I) -> Option<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Some(cli),
        Err(e) if e.kind() == ErrorKind::DisplayHelp => {
            let _ = e.print();
            None
        }
        Err(e) => {
            let _ = e.print();
            eprintln!("{}", Cli::command().render_help());
            None
        }
    }
}

/// Run one update from parsed arguments and the process environment.
pub async fn run(cli: Cli) -> Result<UpdateOutcome> {
    let config = Config::from_env().context("failed to load configuration")?;
    let client = ReqwestClient::new().context("failed to set up HTTP client")?;
    let ctx = Context::new(Arc::new(client), config, Platform::new(cli.target));
    info!("Install dir: {}", ctx.install_dir().display());

    zup_core::update(&ctx, &cli.version).await.map_err(|e| {
        let kind = e.kind();
        anyhow::Error::new(e).context(format!("update failed ({kind})"))
    })
}

/// One-line summary for the terminal.
pub fn describe(outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::UpToDate { version } => format!("zig {version} is up to date"),
        UpdateOutcome::Installed { version, dir } => {
            format!("zig {version} installed in {}", dir.display())
        }
    }
}
