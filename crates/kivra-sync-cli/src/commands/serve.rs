//! Web bridge with trigger endpoint.

use std::sync::Arc;

use anyhow::Result;

use kivra_sync_core::hub::StatusHub;
use kivra_sync_core::orchestrator::KivraOrchestrator;
use kivra_sync_core::web::{self, AppState, WebServerConfig};

use super::ServeArgs;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = super::load_config();
    args.sync.apply(&mut config);
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if args.localhost_only {
        config.web.localhost_only = true;
    }

    let hub = StatusHub::default();
    let orchestrator = KivraOrchestrator::from_config(&config, hub.clone(), false)?;
    let state = AppState::new(hub, Arc::new(orchestrator));
    let server_config = WebServerConfig::from(&config.web);

    println!();
    println!("kivra-sync v{}", kivra_sync_core::VERSION);
    println!("{}", "-".repeat(37));
    println!("Web interface: http://localhost:{}", server_config.port);
    println!("Press Ctrl+C to stop");
    println!();

    web::serve(&server_config, state, super::shutdown_token()).await?;
    Ok(())
}
