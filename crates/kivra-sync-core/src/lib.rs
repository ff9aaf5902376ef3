//! # Kivra Sync Core Library
//!
//! `kivra-sync-core` fetches receipts and letters from the Kivra digital
//! mailbox behind a BankID QR challenge and archives them locally, while
//! broadcasting progress to any number of connected front-ends.
//!
//! ## Features
//!
//! - **BankID sign-in**: OAuth2 + PKCE challenge with QR presentation
//! - **Single-flight runs**: a second trigger while busy is rejected, never queued
//! - **Live progress**: snapshot + broadcast hub behind a Server-Sent Events bridge
//! - **Resumable archive**: already stored documents are skipped
//!
//! ## Modules
//!
//! - [`auth`] - BankID challenge and session handling
//! - [`client`] - Reconnecting event-stream consumer
//! - [`config`] - Configuration management
//! - [`hub`] - Process-wide status snapshot and broadcast
//! - [`notify`] - Progress notifiers (terminal, ntfy)
//! - [`orchestrator`] - Sync run coordination
//! - [`qr`] - QR rendering
//! - [`remote`] - Kivra API client
//! - [`storage`] - Document storage backends
//! - [`web`] - Embedded web bridge
//!
//! ## Example
//!
//! ```rust,ignore
//! use kivra_sync_core::{config::Config, hub::StatusHub, orchestrator::KivraOrchestrator};
//!
//! let config = Config::load()?;
//! let orchestrator = KivraOrchestrator::from_config(&config, StatusHub::default(), true)?;
//! let result = orchestrator.run(orchestrator.default_options()).await?;
//! println!("{}", result.message);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_self)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
mod lines;
pub mod notify;
pub mod orchestrator;
pub mod qr;
pub mod remote;
pub mod retry;
pub mod status;
pub mod storage;

#[cfg(feature = "web")]
pub mod web;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
