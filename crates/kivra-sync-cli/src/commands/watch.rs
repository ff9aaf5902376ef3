//! Terminal consumer of a running server's event stream.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use kivra_sync_core::client::{Control, EventConsumer, ReconnectPolicy, Update};

use super::WatchArgs;

/// Run the watch command.
pub async fn run(args: WatchArgs) -> Result<()> {
    let config = super::load_config();
    let mut policy = ReconnectPolicy::from(&config.client);
    if let Some(max) = args.max_retries {
        policy.max_retries = max;
    }

    let url = EventConsumer::events_url(&args.url);
    let consumer = EventConsumer::new(url.clone(), policy)?;

    let (control_tx, control_rx) = mpsc::channel(8);
    let (update_tx, mut update_rx) = mpsc::channel(32);
    let driver = tokio::spawn(consumer.run(control_rx, update_tx));

    println!("Watching {url}");
    println!("Type 'r' + Enter to reconnect, Ctrl+C to quit");
    println!();

    let shutdown = super::shutdown_token();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = control_tx.send(Control::Teardown).await;
                break;
            }
            update = update_rx.recv() => match update {
                Some(update) => print_update(&update),
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("r") => {
                    let _ = control_tx.send(Control::Reset).await;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }

    drop(update_rx);
    driver.await??;
    Ok(())
}

fn print_update(update: &Update) {
    match update {
        Update::Connected => println!("[connected]"),
        Update::View(view) => {
            println!("{view}");
            println!();
        }
        Update::Reconnecting { attempt, delay } => {
            println!("[connection failed (attempt {attempt}), retrying in {delay:?}]");
        }
        Update::ConnectionLost => {
            println!("[connection lost - type 'r' + Enter to try again]");
        }
    }
}
