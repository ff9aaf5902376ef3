//! Kivra remote service.
//!
//! Two capabilities are consumed by the rest of the crate:
//!
//! - [`AuthApi`]: start a BankID challenge, poll it, exchange the code
//! - [`Mailbox`]: list documents and fetch their content for a [`Session`]
//!
//! [`KivraClient`] implements both against the real service.

pub mod client;
pub mod queries;
pub mod types;

use std::future::Future;

use serde_json::Value;

pub use client::{Endpoints, KivraClient};
pub use types::{
    AuthStart, LetterContent, LetterListing, LetterPart, LetterSummary, PollState,
    ReceiptListing, ReceiptSummary, TokenGrant,
};

use crate::auth::Session;
use crate::error::Result;

/// The challenge/response half of the remote service.
pub trait AuthApi: Send + Sync {
    /// Start a challenge for the given PKCE code challenge.
    fn authorize(&self, code_challenge: &str) -> impl Future<Output = Result<AuthStart>> + Send;

    /// Poll the challenge once.
    fn poll(&self, poll_url: &str) -> impl Future<Output = Result<PollState>> + Send;

    /// Exchange a resolved authorization code for tokens.
    fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> impl Future<Output = Result<TokenGrant>> + Send;
}

/// The document half of the remote service.
pub trait Mailbox: Send + Sync {
    /// List every receipt.
    fn list_receipts(&self, session: &Session)
        -> impl Future<Output = Result<ReceiptListing>> + Send;

    /// Full receipt details, archived as JSON.
    fn receipt_details(
        &self,
        session: &Session,
        key: &str,
    ) -> impl Future<Output = Result<Value>> + Send;

    /// The receipt rendered as PDF.
    fn receipt_pdf(
        &self,
        session: &Session,
        key: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// List every letter in the inbox, across pages.
    fn list_letters(&self, session: &Session)
        -> impl Future<Output = Result<LetterListing>> + Send;

    /// Letter details and parts.
    fn letter_content(
        &self,
        session: &Session,
        key: &str,
    ) -> impl Future<Output = Result<LetterContent>> + Send;

    /// Raw bytes of a file attached to a letter.
    fn letter_file(
        &self,
        session: &Session,
        key: &str,
        file_key: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}
