//! Plain directory tree storage.
//!
//! ```text
//! <base>/Receipts/<Store>/<date>_<Store>_<key>.pdf
//! <base>/Receipts/json/<Store>/<date>_<Store>_<key>.json
//! <base>/Receipts/json/receipts.json
//! <base>/Letters/<Sender>/<date>_<Sender>_<key>[_part<n>].<ext>
//! <base>/Letters/json/<Sender>/<date>_<Sender>_<key>.json
//! <base>/Letters/json/letters.json
//! ```

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use unicode_normalization::UnicodeNormalization;

use super::{ContentFormat, DocumentKind, DocumentMeta, DocumentStore, PersistOutcome};
use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// Longest file or directory name, in bytes.
const MAX_NAME_LEN: usize = 255;

/// Bytes added around a file name while it is being written (`.<name>.part`).
const PART_OVERHEAD: usize = ".".len() + ".part".len();

/// Stands in for names that would be empty or refer to a directory itself.
const UNKNOWN_NAME: &str = "unknown";

/// Reduce a name to `[A-Za-z0-9-_.() ]`, spaces turned into underscores.
///
/// Accented letters are decomposed (NFKD) and keep their base letter;
/// whatever is not ASCII after that is dropped. Names that end up empty or
/// made only of dots become `unknown`. The result is at most 255 bytes.
///
/// ```
/// use kivra_sync_core::storage::clean_filename;
///
/// assert_eq!(clean_filename("ICA Nära Ängby"), "ICA_Nara_Angby");
/// assert_eq!(clean_filename("a/b:c"), "abc");
/// assert_eq!(clean_filename(".."), "unknown");
/// ```
pub fn clean_filename(name: &str) -> String {
    let cleaned: String = name
        .nfkd()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')') => Some(c),
            _ => None,
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        return UNKNOWN_NAME.to_string();
    }
    truncate_bytes(cleaned, MAX_NAME_LEN)
}

/// Cut `name` to at most `max` bytes on a character boundary.
fn truncate_bytes(mut name: String, max: usize) -> String {
    if name.len() > max {
        tracing::warn!(
            "File name truncated to {} bytes; names may no longer be unique",
            max
        );
        let mut end = max;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Stores documents as files under a base directory.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    base_dir: PathBuf,
    dry_run: bool,
}

impl FileSystemStore {
    /// Create a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            dry_run,
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.resolved_base_dir(), config.dry_run)
    }

    /// Root directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn kind_dir(&self, kind: DocumentKind) -> PathBuf {
        self.base_dir.join(match kind {
            DocumentKind::Receipt => "Receipts",
            DocumentKind::Letter => "Letters",
        })
    }

    /// Where the document described by `meta` lives.
    pub fn path_for(&self, meta: &DocumentMeta) -> PathBuf {
        let owner = clean_filename(&meta.owner);
        let mut name = format!("{}_{}_{}", meta.date, owner, meta.key);
        if let Some(part) = meta.part_index {
            name.push_str(&format!("_part{part}"));
        }
        let extension = meta.format.extension();
        let stem = truncate_bytes(
            clean_filename(&name),
            MAX_NAME_LEN - PART_OVERHEAD - extension.len() - 1,
        );
        let file_name = format!("{stem}.{extension}");

        let kind_dir = self.kind_dir(meta.kind);
        match meta.format {
            ContentFormat::Json => kind_dir.join("json").join(owner).join(file_name),
            _ => kind_dir.join(owner).join(file_name),
        }
    }

    /// Where a full listing is archived.
    pub fn listing_path(&self, kind: DocumentKind) -> PathBuf {
        let file_name = match kind {
            DocumentKind::Receipt => "receipts.json",
            DocumentKind::Letter => "letters.json",
        };
        self.kind_dir(kind).join("json").join(file_name)
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let storage_err = |e: std::io::Error| Error::Storage(format!("{}: {e}", path.display()));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(storage_err)?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Storage(format!("{}: no file name", path.display())))?;
        let part_path = path.with_file_name(format!(".{file_name}.part"));

        fs::write(&part_path, data).await.map_err(storage_err)?;
        if let Err(e) = fs::rename(&part_path, path).await {
            let _ = fs::remove_file(&part_path).await;
            return Err(storage_err(e));
        }
        Ok(())
    }

    async fn write_json(&self, path: &Path, data: &Value, what: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("DRY RUN: Would store {} to {}", what, path.display());
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(data)?;
        self.write_atomic(path, &bytes).await
    }
}

impl DocumentStore for FileSystemStore {
    async fn report_listing(&self, kind: DocumentKind, listing: &Value) -> Result<()> {
        let path = self.listing_path(kind);
        self.write_json(&path, listing, "listing").await
    }

    async fn exists(&self, meta: &DocumentMeta) -> Result<bool> {
        let path = self.path_for(meta);
        fs::try_exists(&path)
            .await
            .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))
    }

    async fn report_metadata(&self, data: &Value, meta: &DocumentMeta) -> Result<()> {
        let path = self.path_for(&meta.with_format(ContentFormat::Json));
        self.write_json(&path, data, "metadata").await
    }

    async fn persist(&self, data: &[u8], meta: &DocumentMeta) -> Result<PersistOutcome> {
        let path = self.path_for(meta);

        if self.exists(meta).await? {
            tracing::debug!("{} already stored", path.display());
            return Ok(PersistOutcome::Duplicate);
        }

        if self.dry_run {
            tracing::info!(
                "DRY RUN: Would store {} {} to {}",
                meta.kind.as_str(),
                meta.format.mime(),
                path.display()
            );
            return Ok(PersistOutcome::Stored);
        }

        self.write_atomic(&path, data).await?;
        tracing::debug!("Stored {}", path.display());
        Ok(PersistOutcome::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_clean_filename_whitelist() {
        assert_eq!(clean_filename("Coop Forum (Solna)"), "Coop_Forum_(Solna)");
        assert_eq!(clean_filename("Åhléns"), "Ahlens");
        assert_eq!(clean_filename("<>|?*"), "unknown");
        assert_eq!(clean_filename(&"x".repeat(300)).len(), 255);
    }

    #[test]
    fn test_clean_filename_folds_accents() {
        assert_eq!(clean_filename("Café Crème"), "Cafe_Creme");
        assert_eq!(clean_filename("Łódź Žabka Šťastný"), "odz_Zabka_Stastny");
        assert_eq!(clean_filename("Ångström Ñandú"), "Angstrom_Nandu");
        // Compatibility forms decompose too.
        assert_eq!(clean_filename("ﬁka №1"), "fika_No1");
    }

    #[test]
    fn test_dot_names_stay_inside_kind_dir() {
        let store = FileSystemStore::new("/data", false);
        for owner in [".", "..", "...", "/.."] {
            let path = store.path_for(
                &DocumentMeta::receipt("r1", "2024-05-01", owner).with_format(ContentFormat::Pdf),
            );
            assert_eq!(
                path,
                PathBuf::from("/data/Receipts/unknown/2024-05-01_unknown_r1.pdf"),
                "{owner}"
            );
        }
    }

    #[test]
    fn test_long_names_leave_room_for_extension() {
        let store = FileSystemStore::new("/data", false);
        let owner = "Ö".repeat(400);
        let meta = DocumentMeta::letter("c1", "2024-01-02", &owner)
            .with_format(ContentFormat::Html)
            .with_part(3);

        let path = store.path_for(&meta);
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.ends_with(".html"));
        assert!(file_name.len() + PART_OVERHEAD <= MAX_NAME_LEN);
        let dir = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert_eq!(dir.len(), MAX_NAME_LEN);

        assert_eq!(truncate_bytes("aé".to_string(), 2), "a");
    }

    #[test]
    fn test_paths() {
        let store = FileSystemStore::new("/data", false);
        let meta = DocumentMeta::receipt("r1", "2024-05-01", "ICA Maxi");

        assert_eq!(
            store.path_for(&meta),
            PathBuf::from("/data/Receipts/json/ICA_Maxi/2024-05-01_ICA_Maxi_r1.json")
        );
        assert_eq!(
            store.path_for(&meta.with_format(ContentFormat::Pdf)),
            PathBuf::from("/data/Receipts/ICA_Maxi/2024-05-01_ICA_Maxi_r1.pdf")
        );

        let letter = DocumentMeta::letter("c1", "2024-01-02", "Skatteverket")
            .with_format(ContentFormat::Html)
            .with_part(2);
        assert_eq!(
            store.path_for(&letter),
            PathBuf::from("/data/Letters/Skatteverket/2024-01-02_Skatteverket_c1_part2.html")
        );
        assert_eq!(
            store.listing_path(DocumentKind::Letter),
            PathBuf::from("/data/Letters/json/letters.json")
        );
    }

    #[tokio::test]
    async fn test_persist_then_duplicate() {
        let temp = TempDir::new().unwrap();
        let store = FileSystemStore::new(temp.path(), false);
        let meta = DocumentMeta::receipt("r1", "2024-05-01", "ICA").with_format(ContentFormat::Pdf);

        assert!(!store.exists(&meta).await.unwrap());
        assert_eq!(
            store.persist(b"%PDF-1.7", &meta).await.unwrap(),
            PersistOutcome::Stored
        );
        assert!(store.exists(&meta).await.unwrap());
        assert_eq!(
            store.persist(b"%PDF-1.7 other", &meta).await.unwrap(),
            PersistOutcome::Duplicate
        );

        let written = std::fs::read(store.path_for(&meta)).unwrap();
        assert_eq!(written, b"%PDF-1.7");

        let leftovers: Vec<_> = std::fs::read_dir(store.path_for(&meta).parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_and_listing() {
        let temp = TempDir::new().unwrap();
        let store = FileSystemStore::new(temp.path(), false);
        let meta = DocumentMeta::letter("c1", "2024-01-02", "Skatteverket");

        store
            .report_metadata(&json!({"key": "c1"}), &meta.with_format(ContentFormat::Pdf))
            .await
            .unwrap();
        assert!(store.exists(&meta).await.unwrap());

        store
            .report_listing(DocumentKind::Letter, &json!([{"key": "c1"}]))
            .await
            .unwrap();
        let listing: Value = serde_json::from_slice(
            &std::fs::read(store.listing_path(DocumentKind::Letter)).unwrap(),
        )
        .unwrap();
        assert_eq!(listing[0]["key"], "c1");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = FileSystemStore::new(temp.path().join("docs"), true);
        let meta = DocumentMeta::receipt("r1", "2024-05-01", "ICA");

        store.report_metadata(&json!({}), &meta).await.unwrap();
        let outcome = store
            .persist(b"pdf", &meta.with_format(ContentFormat::Pdf))
            .await
            .unwrap();

        assert_eq!(outcome, PersistOutcome::Stored);
        assert!(!temp.path().join("docs").exists());
    }
}
