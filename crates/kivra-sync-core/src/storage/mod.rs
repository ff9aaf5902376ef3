//! Document storage.
//!
//! The orchestrator only needs four operations from a backend, captured by
//! [`DocumentStore`]: archive a listing, check whether a document is already
//! present, write its JSON metadata, and persist its content. Persisting a
//! document that is already present reports [`PersistOutcome::Duplicate`]
//! instead of failing.

pub mod filesystem;

use std::future::Future;

use serde_json::Value;

pub use filesystem::{clean_filename, FileSystemStore};

use crate::error::Result;

/// Kind of mailbox document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Digital purchase receipt
    Receipt,
    /// Inbox letter
    Letter,
}

impl DocumentKind {
    /// Lowercase name, as used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::Letter => "letter",
        }
    }
}

/// Format of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    /// Metadata
    Json,
    /// PDF document
    Pdf,
    /// Plain text letter part
    Text,
    /// HTML letter part
    Html,
}

impl ContentFormat {
    /// File extension, without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Text => "txt",
            Self::Html => "html",
        }
    }

    /// MIME type.
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Pdf => "application/pdf",
            Self::Text => "text/plain",
            Self::Html => "text/html",
        }
    }
}

/// Identifies one stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    /// Receipt or letter
    pub kind: DocumentKind,
    /// Remote key
    pub key: String,
    /// `YYYY-MM-DD` or `unknown_date`
    pub date: String,
    /// Store name for receipts, sender name for letters
    pub owner: String,
    /// Part number within a multi-part letter
    pub part_index: Option<usize>,
    /// Format of this particular file
    pub format: ContentFormat,
}

impl DocumentMeta {
    /// Metadata entry of a receipt.
    pub fn receipt(key: &str, date: &str, store_name: &str) -> Self {
        Self::new(DocumentKind::Receipt, key, date, store_name)
    }

    /// Metadata entry of a letter.
    pub fn letter(key: &str, date: &str, sender_name: &str) -> Self {
        Self::new(DocumentKind::Letter, key, date, sender_name)
    }

    fn new(kind: DocumentKind, key: &str, date: &str, owner: &str) -> Self {
        Self {
            kind,
            key: key.to_string(),
            date: date.to_string(),
            owner: owner.to_string(),
            part_index: None,
            format: ContentFormat::Json,
        }
    }

    /// The same document in another format.
    #[must_use]
    pub fn with_format(&self, format: ContentFormat) -> Self {
        Self {
            format,
            ..self.clone()
        }
    }

    /// Mark as one part of a multi-part document.
    #[must_use]
    pub fn with_part(mut self, part_index: usize) -> Self {
        self.part_index = Some(part_index);
        self
    }
}

/// Result of a persist call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Newly written
    Stored,
    /// Already present; nothing written
    Duplicate,
}

/// A place to archive documents.
pub trait DocumentStore: Send + Sync {
    /// Archive a full listing as returned by the remote service.
    fn report_listing(
        &self,
        kind: DocumentKind,
        listing: &Value,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Whether the document described by `meta` is already stored.
    fn exists(&self, meta: &DocumentMeta) -> impl Future<Output = Result<bool>> + Send;

    /// Write the JSON metadata of a document, replacing any previous copy.
    fn report_metadata(
        &self,
        data: &Value,
        meta: &DocumentMeta,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Store document content unless it is already present.
    fn persist(
        &self,
        data: &[u8],
        meta: &DocumentMeta,
    ) -> impl Future<Output = Result<PersistOutcome>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_builders() {
        let meta = DocumentMeta::letter("c1", "2024-01-02", "Skatteverket");
        assert_eq!(meta.format, ContentFormat::Json);

        let part = meta.with_format(ContentFormat::Pdf).with_part(1);
        assert_eq!(part.format, ContentFormat::Pdf);
        assert_eq!(part.part_index, Some(1));
        assert_eq!(meta.part_index, None);
    }

    #[test]
    fn test_format_extensions() {
        assert_eq!(ContentFormat::Text.extension(), "txt");
        assert_eq!(ContentFormat::Html.mime(), "text/html");
        assert_eq!(DocumentKind::Receipt.as_str(), "receipt");
    }
}
