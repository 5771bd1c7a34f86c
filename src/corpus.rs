//! Global index lifecycle.
//!
//! The global index is built from a shared corpus directory and serves
//! as the fallback knowledge base for every owner. It is constructed
//! once at startup (or on demand via `rebuild-global`) and handed by
//! reference to the retrieval router; nothing in the query path mutates
//! it.
//!
//! Corpus files are processed independently: one unreadable file is
//! logged and skipped, never aborting the build.

use anyhow::Result;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunk::split_records;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::extract;
use crate::index::{IndexError, VectorIndex};
use crate::ocr::OcrEngine;

#[derive(Debug, Default)]
pub struct BuildReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks: usize,
}

/// Open the global index, building it from the corpus directory when it
/// does not exist yet. A corrupt global index is a hard error; it is
/// only ever rebuilt by explicit request.
pub async fn open_or_build(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    ocr: &dyn OcrEngine,
) -> Result<VectorIndex> {
    let dir = config.global_index_dir();
    match VectorIndex::open(&dir).await {
        Ok(index) => Ok(index),
        Err(IndexError::NotFound { .. }) => {
            info!(corpus = %config.corpus.root.display(), "global index missing, building from corpus");
            let (index, report) = rebuild(config, embedder, ocr).await?;
            info!(
                files = report.files_indexed,
                skipped = report.files_skipped,
                chunks = report.chunks,
                "global index built"
            );
            Ok(index)
        }
        Err(e @ IndexError::Corrupt { .. }) => Err(anyhow::Error::from(e)
            .context("global index is unusable; run `carrel rebuild-global` to rebuild it")),
        Err(e) => Err(e.into()),
    }
}

/// Rebuild the global index from scratch out of the corpus directory.
pub async fn rebuild(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    ocr: &dyn OcrEngine,
) -> Result<(VectorIndex, BuildReport)> {
    let index = VectorIndex::open_or_create(&config.global_index_dir()).await?;
    index.clear_all().await?;

    let root = config.corpus.root.clone();
    let mut report = BuildReport::default();

    if !root.is_dir() {
        warn!(root = %root.display(), "corpus directory missing, global index left empty");
        return Ok((index, report));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && extract::is_supported(entry.path()) {
            paths.push(entry.path().to_path_buf());
        }
    }

    for path in paths {
        let label = path
            .strip_prefix(&root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        let records = match extract::extract_file(&path, &label, ocr).await {
            Ok(records) => records,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping corpus file");
                report.files_skipped += 1;
                continue;
            }
        };
        if records.is_empty() {
            debug!(file = %path.display(), "corpus file has no text, skipping");
            report.files_skipped += 1;
            continue;
        }

        let chunks = split_records(&records, &config.chunking);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

        let vectors =
            match embedding::embed_in_batches(embedder, config.embedding.batch_size, &texts).await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "embedding failed, skipping corpus file");
                    report.files_skipped += 1;
                    continue;
                }
            };

        if let Err(e) = index.replace_file(&label, &chunks, &vectors).await {
            warn!(file = %path.display(), error = %e, "indexing failed, skipping corpus file");
            report.files_skipped += 1;
            continue;
        }

        report.files_indexed += 1;
        report.chunks += chunks.len();
    }

    Ok((index, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddings;
    use crate::ocr::DisabledOcr;
    use std::path::Path;

    fn test_config(data_dir: &Path, corpus_dir: &Path) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.to_path_buf();
        config.corpus.root = corpus_dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn rebuild_indexes_supported_corpus_files() {
        let data = tempfile::tempdir().unwrap();
        let corpus = tempfile::tempdir().unwrap();
        std::fs::write(corpus.path().join("policy.txt"), "refunds are processed in 5 days")
            .unwrap();
        std::fs::write(corpus.path().join("faq.md"), "# FAQ\n\nshipping is free").unwrap();
        std::fs::write(corpus.path().join("blank.txt"), "   ").unwrap();
        std::fs::write(corpus.path().join("raw.bin"), [0u8; 8]).unwrap();

        let config = test_config(data.path(), corpus.path());
        let embedder = HashEmbeddings::new(16);

        let (index, report) = rebuild(&config, &embedder, &DisabledOcr).await.unwrap();
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.chunks, 2);

        let query = crate::embedding::embed_one(&embedder, "refunds").await.unwrap();
        let hits = index.search(&query, Some(1)).await.unwrap();
        assert_eq!(hits[0].chunk.source_path, "policy.txt");
    }

    #[tokio::test]
    async fn open_or_build_does_not_rebuild_an_existing_index() {
        let data = tempfile::tempdir().unwrap();
        let corpus = tempfile::tempdir().unwrap();
        std::fs::write(corpus.path().join("one.txt"), "first document").unwrap();

        let config = test_config(data.path(), corpus.path());
        let embedder = HashEmbeddings::new(16);

        let index = open_or_build(&config, &embedder, &DisabledOcr).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 1);
        index.close().await;

        // New corpus content must not appear until an explicit rebuild.
        std::fs::write(corpus.path().join("two.txt"), "second document").unwrap();
        let index = open_or_build(&config, &embedder, &DisabledOcr).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 1);
        index.close().await;

        let (index, report) = rebuild(&config, &embedder, &DisabledOcr).await.unwrap();
        assert_eq!(report.files_indexed, 2);
        assert_eq!(index.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn corrupt_global_index_is_a_hard_error() {
        let data = tempfile::tempdir().unwrap();
        let corpus = tempfile::tempdir().unwrap();
        let config = test_config(data.path(), corpus.path());

        let dir = config.global_index_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.sqlite"), b"garbage").unwrap();

        let embedder = HashEmbeddings::new(16);
        let err = open_or_build(&config, &embedder, &DisabledOcr).await.unwrap_err();
        assert!(format!("{:#}", err).contains("rebuild-global"));
    }

    #[tokio::test]
    async fn missing_corpus_builds_an_empty_index() {
        let data = tempfile::tempdir().unwrap();
        let config = test_config(data.path(), Path::new("/nonexistent/corpus"));
        let embedder = HashEmbeddings::new(16);

        let index = open_or_build(&config, &embedder, &DisabledOcr).await.unwrap();
        assert!(index.is_empty().await.unwrap());
    }
}
