//! kivra-sync CLI - keep a local archive of your Kivra mailbox
//!
//! Receipts and letters are fetched after a BankID sign-in and stored as
//! files; documents already on disk are skipped.
//!
//! ## Quick Start
//!
//! ```bash
//! # One-shot sync, QR code in the terminal
//! kivra-sync run
//!
//! # Web page with a sync button and live progress
//! kivra-sync serve --port 8080
//!
//! # Sync whenever "run now" is posted to an ntfy topic
//! kivra-sync listen --ntfy-topic my-kivra
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]
#![allow(clippy::struct_excessive_bools)]

use anyhow::Result;
use clap::Parser;

mod commands;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => commands::run::run(args).await,
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Listen(args) => commands::listen::run(args).await,
        Command::Watch(args) => commands::watch::run(args).await,
        Command::Config(args) => commands::config::run(args),
        Command::Completions(args) => commands::completions::run(args.shell),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,kivra_sync=debug,kivra_sync_core=debug"
    } else {
        "warn,kivra_sync=info,kivra_sync_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
