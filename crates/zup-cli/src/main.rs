//! zup - Zig toolchain updater CLI

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(cli) = zup_cli::parse_args(std::env::args_os()) else {
        return Ok(());
    };

    let outcome = zup_cli::run(cli).await?;
    println!("{}", zup_cli::describe(&outcome));
    Ok(())
}
