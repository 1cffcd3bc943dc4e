//! The whole run: resolve, gate, install.

use std::path::PathBuf;

use tracing::info;

use crate::context::Context;
use crate::error::Result;
use crate::gate;
use crate::index::IndexResolver;
use crate::swap::InstallSwapper;

/// What a run ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The active entry point already reports this version.
    UpToDate { version: String },
    /// `dir` now backs the entry point.
    Installed { version: String, dir: PathBuf },
}

/// Bring the toolchain under `ctx.install_dir()` to `alias`.
pub async fn update(ctx: &Context, alias: &str) -> Result<UpdateOutcome> {
    let target = IndexResolver::new(ctx.client.as_ref(), &ctx.config.index_url)
        .resolve(alias, ctx.platform.as_str())
        .await?;

    let entry_point = ctx.entry_point();
    if !gate::needs_update(&entry_point, &target.canonical_version).await? {
        info!("{} is already at {}", entry_point.display(), target.canonical_version);
        return Ok(UpdateOutcome::UpToDate {
            version: target.canonical_version,
        });
    }

    let dir = InstallSwapper::new(ctx)
        .reconcile(&target, ctx.install_dir())
        .await?;
    Ok(UpdateOutcome::Installed {
        version: target.canonical_version,
        dir: dir.into_path(),
    })
}
