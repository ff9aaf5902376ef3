//! Terminal notifier.

use super::Notify;
use crate::error::Result;
use crate::orchestrator::RunResult;
use crate::qr;

/// Prints challenges and results to the terminal.
///
/// When not interactive (a web front-end shows the QR code), it only logs.
#[derive(Debug, Clone, Copy)]
pub struct LocalNotifier {
    interactive: bool,
}

impl LocalNotifier {
    /// Create a local notifier.
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl Notify for LocalNotifier {
    async fn present_challenge(&self, qr_payload: &str) -> Result<()> {
        if !self.interactive {
            tracing::info!("BankID challenge ready; waiting for the QR code to be scanned");
            return Ok(());
        }

        let art = qr::generate_ascii(qr_payload)?;
        println!();
        println!("{art}");
        println!("Scan the QR code with the BankID app");
        println!();
        Ok(())
    }

    async fn report_authenticated(&self) -> Result<()> {
        if self.interactive {
            println!("BankID authentication successful! Starting data sync...");
        } else {
            tracing::info!("BankID authentication successful, starting data sync");
        }
        Ok(())
    }

    async fn report_result(&self, result: &RunResult) -> Result<()> {
        if !self.interactive {
            tracing::info!("Sync finished: {}", result.message);
            return Ok(());
        }

        println!();
        if result.success {
            println!("All done!");
        } else {
            println!("Sync failed:");
        }
        println!("{}", result.message);
        if result.failed_items > 0 {
            println!("{} items could not be fetched, see the log", result.failed_items);
        }
        Ok(())
    }
}
