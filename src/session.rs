//! Session ingestion pipeline and per-owner session state.
//!
//! `ingest_file` runs the whole upload path: persist the raw file,
//! guard the quota, extract, chunk, embed, and update the owner's index
//! and metadata. Only two failures are surfaced to the caller: the raw
//! file not persisting, and the quota check. Everything downstream
//! degrades instead: the upload is kept, a warning is logged, and the
//! receipt reports `indexed = false` so retrieval falls back to the
//! global index until the file is re-ingested.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

use crate::chunk::split_records;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::extract::{self, DocumentFormat};
use crate::index::VectorIndex;
use crate::models::{validate_owner_id, Chunk, IngestReceipt};
use crate::ocr::OcrEngine;
use crate::quota;

pub const DEFAULT_TITLE: &str = "Untitled Chat";

/// Filenames that hold session state and can never be uploaded over.
const RESERVED_FILENAMES: [&str; 2] = ["meta.json", "history.json"];

/// Per-owner session metadata, stored as `meta.json` in the upload
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub files: Vec<String>,
    pub last_used: Option<String>,
    pub title: String,
}

impl Default for SessionMeta {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            last_used: None,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

/// Validate an uploaded filename before it is joined onto the owner's
/// upload directory.
pub fn validate_filename(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("filename must not be empty");
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        bail!("filename must be a bare name without path separators: {:?}", name);
    }
    if RESERVED_FILENAMES.contains(&name) {
        bail!("filename {:?} is reserved for session state", name);
    }
    Ok(())
}

/// Ingest one uploaded file for `owner`.
///
/// Hard failures: persisting the raw file, and [`quota::check`]. All
/// other failures are logged and reported through the receipt.
pub async fn ingest_file(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    ocr: &dyn OcrEngine,
    owner: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<IngestReceipt> {
    validate_owner_id(owner)?;
    validate_filename(filename)?;

    // Persist the raw upload first. It is kept even when later steps
    // degrade, so the owner's file list always reflects what arrived.
    let upload_dir = config.upload_dir(owner);
    std::fs::create_dir_all(&upload_dir)
        .with_context(|| format!("Failed to create upload directory: {}", upload_dir.display()))?;
    let file_path = upload_dir.join(filename);
    std::fs::write(&file_path, bytes)
        .with_context(|| format!("Failed to persist upload: {}", file_path.display()))?;

    let content_hash = hash_bytes(bytes);

    // Quota guard runs before the index is touched.
    quota::check(config, owner)?;

    let records = match DocumentFormat::from_path(Path::new(filename)) {
        Some(format) => match extract::extract_bytes(format, bytes, filename, ocr).await {
            Ok(records) => records,
            Err(e) => {
                warn!(owner, filename, error = %e, "extraction failed, upload kept without index");
                Vec::new()
            }
        },
        None => {
            warn!(owner, filename, "unsupported file format, upload kept without index");
            Vec::new()
        }
    };

    let chunks = split_records(&records, &config.chunking);

    let mut indexed = false;
    if !chunks.is_empty() {
        match index_chunks(config, embedder, owner, filename, &chunks).await {
            Ok(()) => indexed = true,
            Err(e) => {
                warn!(owner, filename, error = %e, "index update failed, retrieval will fall back");
            }
        }
    }

    if let Err(e) = touch_meta(config, owner, filename) {
        warn!(owner, filename, error = %e, "failed to update session metadata");
    }

    info!(
        owner,
        filename,
        records = records.len(),
        chunks = chunks.len(),
        indexed,
        "ingested upload"
    );

    Ok(IngestReceipt {
        owner: owner.to_string(),
        filename: filename.to_string(),
        content_hash,
        records: records.len(),
        chunks: chunks.len(),
        indexed,
    })
}

async fn index_chunks(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    owner: &str,
    filename: &str,
    chunks: &[Chunk],
) -> Result<()> {
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors =
        embedding::embed_in_batches(embedder, config.embedding.batch_size, &texts).await?;

    let index = VectorIndex::open_or_create(&config.owner_index_dir(owner)).await?;
    let result = index.replace_file(filename, chunks, &vectors).await;
    index.close().await;
    result?;
    Ok(())
}

/// Read the owner's session metadata, defaults when absent.
pub fn read_meta(config: &Config, owner: &str) -> Result<SessionMeta> {
    let path = config.meta_path(owner);
    if !path.is_file() {
        return Ok(SessionMeta::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Malformed metadata: {}", path.display()))
}

fn touch_meta(config: &Config, owner: &str, filename: &str) -> Result<()> {
    let mut meta = read_meta(config, owner)?;
    if !meta.files.iter().any(|f| f == filename) {
        meta.files.push(filename.to_string());
    }
    meta.last_used = Some(chrono::Utc::now().to_rfc3339());

    let path = config.meta_path(owner);
    let json = serde_json::to_string_pretty(&meta)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write metadata: {}", path.display()))?;
    Ok(())
}

/// Supported files in the owner's upload directory, sorted by name.
/// Session state files and anything unsupported are skipped.
pub fn list_files(config: &Config, owner: &str) -> Result<Vec<String>> {
    validate_owner_id(owner)?;
    let dir = config.upload_dir(owner);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if extract::is_supported(Path::new(&name)) {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// Delete the owner's conversation log, index directory, and upload
/// directory. Idempotent: absent pieces are skipped without error.
pub fn clear_owner(config: &Config, owner: &str) -> Result<()> {
    validate_owner_id(owner)?;

    let history = config.history_path(owner);
    if history.is_file() {
        std::fs::remove_file(&history)
            .with_context(|| format!("Failed to remove {}", history.display()))?;
    }

    let index_dir = config.owner_index_dir(owner);
    if index_dir.is_dir() {
        std::fs::remove_dir_all(&index_dir)
            .with_context(|| format!("Failed to remove {}", index_dir.display()))?;
    }

    let upload_dir = config.upload_dir(owner);
    if upload_dir.is_dir() {
        std::fs::remove_dir_all(&upload_dir)
            .with_context(|| format!("Failed to remove {}", upload_dir.display()))?;
    }

    Ok(())
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddings;
    use crate::ocr::DisabledOcr;
    use crate::quota::QuotaExceeded;

    fn test_config(data_dir: &Path) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn ingest_text_file_builds_index_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let embedder = HashEmbeddings::new(16);

        let receipt = ingest_file(
            &config,
            &embedder,
            &DisabledOcr,
            "alice",
            "notes.txt",
            b"invoice total: 42 dollars",
        )
        .await
        .unwrap();

        assert!(receipt.indexed);
        assert_eq!(receipt.records, 1);
        assert_eq!(receipt.chunks, 1);
        assert!(config.upload_dir("alice").join("notes.txt").is_file());

        let meta = read_meta(&config, "alice").unwrap();
        assert_eq!(meta.files, vec!["notes.txt".to_string()]);
        assert_eq!(meta.title, "Untitled Chat");
        assert!(meta.last_used.is_some());

        let index = VectorIndex::open(&config.owner_index_dir("alice"))
            .await
            .unwrap();
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reingest_replaces_instead_of_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let embedder = HashEmbeddings::new(16);

        ingest_file(&config, &embedder, &DisabledOcr, "alice", "a.txt", b"first version")
            .await
            .unwrap();
        ingest_file(&config, &embedder, &DisabledOcr, "alice", "a.txt", b"second version")
            .await
            .unwrap();
        ingest_file(&config, &embedder, &DisabledOcr, "alice", "b.txt", b"another file")
            .await
            .unwrap();

        let index = VectorIndex::open(&config.owner_index_dir("alice"))
            .await
            .unwrap();
        assert_eq!(index.len().await.unwrap(), 2);

        let manifest = index.manifest().await.unwrap();
        assert_eq!(manifest.len(), 2);

        let meta = read_meta(&config, "alice").unwrap();
        assert_eq!(meta.files, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn quota_exceeded_keeps_upload_but_blocks_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.quota.max_index_bytes = 64;

        let index_dir = config.owner_index_dir("bob");
        std::fs::create_dir_all(&index_dir).unwrap();
        std::fs::write(index_dir.join("filler.bin"), [0u8; 64]).unwrap();

        let embedder = HashEmbeddings::new(16);
        let err = ingest_file(&config, &embedder, &DisabledOcr, "bob", "late.txt", b"too late")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<QuotaExceeded>().is_some());

        // Raw file persisted, index contents untouched.
        assert!(config.upload_dir("bob").join("late.txt").is_file());
        let leftover: Vec<_> = std::fs::read_dir(&index_dir).unwrap().collect();
        assert_eq!(leftover.len(), 1);
    }

    #[tokio::test]
    async fn unsupported_format_degrades_to_unindexed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let embedder = HashEmbeddings::new(16);

        let receipt = ingest_file(
            &config,
            &embedder,
            &DisabledOcr,
            "alice",
            "blob.bin",
            &[0u8, 1, 2, 3],
        )
        .await
        .unwrap();

        assert!(!receipt.indexed);
        assert_eq!(receipt.records, 0);
        assert!(config.upload_dir("alice").join("blob.bin").is_file());
    }

    #[tokio::test]
    async fn whitespace_only_file_yields_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let embedder = HashEmbeddings::new(16);

        let receipt =
            ingest_file(&config, &embedder, &DisabledOcr, "alice", "blank.txt", b"   \n  \n")
                .await
                .unwrap();

        assert!(!receipt.indexed);
        assert_eq!(receipt.chunks, 0);
    }

    #[tokio::test]
    async fn clear_owner_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let embedder = HashEmbeddings::new(16);

        ingest_file(&config, &embedder, &DisabledOcr, "alice", "a.txt", b"some text")
            .await
            .unwrap();
        crate::chatlog::append_message(&config, "alice", "user", "hello").unwrap();

        clear_owner(&config, "alice").unwrap();
        assert!(!config.upload_dir("alice").exists());
        assert_eq!(quota::usage(&config, "alice").unwrap(), 0);

        // Second clear finds nothing to do.
        clear_owner(&config, "alice").unwrap();
    }

    #[test]
    fn reserved_and_traversal_filenames_rejected() {
        assert!(validate_filename("meta.json").is_err());
        assert!(validate_filename("history.json").is_err());
        assert!(validate_filename("../escape.txt").is_err());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("report.pdf").is_ok());
    }

    #[tokio::test]
    async fn list_files_skips_session_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let embedder = HashEmbeddings::new(16);

        ingest_file(&config, &embedder, &DisabledOcr, "alice", "b.txt", b"bbb")
            .await
            .unwrap();
        ingest_file(&config, &embedder, &DisabledOcr, "alice", "a.md", b"aaa")
            .await
            .unwrap();

        let files = list_files(&config, "alice").unwrap();
        assert_eq!(files, vec!["a.md".to_string(), "b.txt".to_string()]);
    }
}
