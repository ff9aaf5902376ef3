//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use kivra_sync_core::config::{Config, NotifyProvider};

pub mod completions;
pub mod config;
pub mod listen;
pub mod run;
pub mod serve;
pub mod watch;

/// Load configuration with graceful fallback to defaults.
///
/// A missing file yields the defaults; an unreadable one is reported and
/// the defaults are used.
pub fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load configuration, using defaults: {}", e);
        Config::default()
    })
}

/// A token cancelled on Ctrl+C or SIGTERM.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested");
        cancel.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut term) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// kivra-sync - Fetch receipts and letters from Kivra and store them locally
#[derive(Parser)]
#[command(name = "kivra-sync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Detailed logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Sync once, showing the BankID QR code in the terminal
    Run(RunArgs),

    /// Serve a web page with a sync button and live progress
    Serve(ServeArgs),

    /// Sync whenever the trigger message arrives on an ntfy topic
    Listen(ListenArgs),

    /// Follow the progress of a running server in the terminal
    Watch(WatchArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Notification channel selectable on the command line
#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum NotifyChoice {
    /// Terminal output
    Local,
    /// ntfy push notifications
    Ntfy,
}

impl From<NotifyChoice> for NotifyProvider {
    fn from(choice: NotifyChoice) -> Self {
        match choice {
            NotifyChoice::Local => Self::Local,
            NotifyChoice::Ntfy => Self::Ntfy,
        }
    }
}

/// Options shared by every command that syncs
#[derive(Parser, Debug, Default)]
pub struct SyncArgs {
    /// Skip receipts
    #[arg(long)]
    pub no_receipts: bool,

    /// Skip letters
    #[arg(long)]
    pub no_letters: bool,

    /// Process at most this many receipts (0 = all)
    #[arg(long, value_name = "N")]
    pub max_receipts: Option<usize>,

    /// Process at most this many letters (0 = all)
    #[arg(long, value_name = "N")]
    pub max_letters: Option<usize>,

    /// Directory documents are stored under
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Show what would be stored without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Notification channel
    #[arg(long, value_enum)]
    pub notify: Option<NotifyChoice>,

    /// ntfy topic
    #[arg(long, value_name = "TOPIC")]
    pub ntfy_topic: Option<String>,

    /// ntfy server URL
    #[arg(long, value_name = "URL")]
    pub ntfy_server: Option<String>,

    /// Message that starts a sync in listening mode
    #[arg(long, value_name = "TEXT")]
    pub trigger_message: Option<String>,
}

impl SyncArgs {
    /// Override configuration values with the flags that were given.
    pub fn apply(&self, config: &mut Config) {
        if self.no_receipts {
            config.sync.fetch_receipts = false;
        }
        if self.no_letters {
            config.sync.fetch_letters = false;
        }
        if let Some(n) = self.max_receipts {
            config.sync.max_receipts = n;
        }
        if let Some(n) = self.max_letters {
            config.sync.max_letters = n;
        }
        if let Some(dir) = &self.base_dir {
            config.storage.base_dir = Some(dir.clone());
        }
        if self.dry_run {
            config.storage.dry_run = true;
        }
        if let Some(choice) = self.notify {
            config.notify.provider = choice.into();
        }
        if let Some(topic) = &self.ntfy_topic {
            config.notify.ntfy_topic = Some(topic.clone());
        }
        if let Some(server) = &self.ntfy_server {
            config.notify.ntfy_server.clone_from(server);
        }
        if let Some(message) = &self.trigger_message {
            config.notify.trigger_message.clone_from(message);
        }
    }
}

/// Arguments for the run command
#[derive(Parser)]
pub struct RunArgs {
    /// Sync options
    #[command(flatten)]
    pub sync: SyncArgs,
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Sync options
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Only accept connections from this machine
    #[arg(long)]
    pub localhost_only: bool,
}

/// Arguments for the listen command
#[derive(Parser)]
pub struct ListenArgs {
    /// Sync options
    #[command(flatten)]
    pub sync: SyncArgs,
}

/// Arguments for the watch command
#[derive(Parser)]
pub struct WatchArgs {
    /// Server to follow
    #[arg(default_value = "http://localhost:8080")]
    pub url: String,

    /// Give up after this many consecutive connection failures
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the configuration file location
    Path,

    /// Print the effective configuration
    Show,

    /// Write the default configuration file if none exists
    Init,
}

/// Arguments for the completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,
}

/// Supported shell types for completions
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "kivra-sync",
            "run",
            "--no-letters",
            "--max-receipts",
            "5",
            "--dry-run",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.sync.no_letters);
        assert_eq!(args.sync.max_receipts, Some(5));
    }

    #[test]
    fn test_apply_overrides_config() {
        let args = SyncArgs {
            no_receipts: true,
            max_letters: Some(3),
            base_dir: Some(PathBuf::from("/tmp/kivra")),
            notify: Some(NotifyChoice::Ntfy),
            ntfy_topic: Some("mine".into()),
            trigger_message: Some("go".into()),
            ..Default::default()
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert!(!config.sync.fetch_receipts);
        assert!(config.sync.fetch_letters);
        assert_eq!(config.sync.max_letters, 3);
        assert_eq!(config.storage.base_dir, Some(PathBuf::from("/tmp/kivra")));
        assert_eq!(config.notify.provider, NotifyProvider::Ntfy);
        assert_eq!(config.notify.ntfy_topic.as_deref(), Some("mine"));
        assert_eq!(config.notify.trigger_message, "go");
        assert!(!config.storage.dry_run);
    }

    #[test]
    fn test_apply_without_flags_keeps_config() {
        let mut config = Config::default();
        config.sync.max_receipts = 7;
        SyncArgs::default().apply(&mut config);
        assert_eq!(config.sync.max_receipts, 7);
        assert!(config.sync.fetch_receipts);
    }
}
