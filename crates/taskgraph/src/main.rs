//! Taskgraph CLI binary.

use anyhow::Result;
use taskgraph::cli::Cli;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Main entry point for the taskgraph CLI.
///
/// Uses tokio's current_thread runtime; long scans run on the blocking pool
/// so that Ctrl-C can cancel them.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Example: RUST_LOG=taskgraph=debug taskgraph plan
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskgraph=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting taskgraph CLI");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let cli = Cli::parse_args();
    cli.execute(cancel).await?;

    tracing::debug!("Taskgraph CLI completed successfully");
    Ok(())
}
