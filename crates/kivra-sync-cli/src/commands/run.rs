//! One-shot sync.

use anyhow::{bail, Result};

use kivra_sync_core::hub::StatusHub;
use kivra_sync_core::orchestrator::KivraOrchestrator;

use super::RunArgs;

/// Run the run command.
pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = super::load_config();
    args.sync.apply(&mut config);

    let orchestrator = KivraOrchestrator::from_config(&config, StatusHub::default(), true)?;

    println!();
    println!("kivra-sync v{}", kivra_sync_core::VERSION);
    println!("{}", "-".repeat(37));
    println!("Storing documents in {}", config.storage.resolved_base_dir().display());
    if config.storage.dry_run {
        println!("Dry run: nothing will be written");
    }

    let shutdown = super::shutdown_token();
    let result = tokio::select! {
        result = orchestrator.run(orchestrator.default_options()) => result?,
        () = shutdown.cancelled() => bail!("Interrupted"),
    };

    if !result.success {
        bail!("Sync did not complete");
    }
    Ok(())
}
