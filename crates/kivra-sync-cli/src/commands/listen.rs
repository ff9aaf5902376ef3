//! ntfy listening mode.

use anyhow::{Context, Result};

use kivra_sync_core::config::NotifyProvider;
use kivra_sync_core::hub::StatusHub;
use kivra_sync_core::orchestrator::KivraOrchestrator;

use super::ListenArgs;

/// Run the listen command.
pub async fn run(args: ListenArgs) -> Result<()> {
    let mut config = super::load_config();
    config.notify.provider = NotifyProvider::Ntfy;
    args.sync.apply(&mut config);

    let orchestrator = KivraOrchestrator::from_config(&config, StatusHub::default(), false)
        .context("listening needs an ntfy topic (--ntfy-topic or [notify].ntfy_topic)")?;
    let ntfy = orchestrator
        .notifier()
        .as_ntfy()
        .context("the ntfy notifier is not configured")?;

    println!(
        "Listening for '{}' on {}",
        config.notify.trigger_message,
        ntfy.topic_url()
    );
    println!("Press Ctrl+C to stop");

    ntfy.listen(&orchestrator, super::shutdown_token()).await?;
    Ok(())
}
