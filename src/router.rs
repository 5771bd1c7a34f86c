//! Two-tier retrieval router.
//!
//! A query first runs against the owner's index with a small `k`; the
//! global index answers instead when the owner path cannot. Each
//! fallback condition is an explicit result inspection, so the decision
//! log reads exactly like the policy:
//!
//! - owner index missing or corrupt
//! - owner search failed
//! - owner search matched zero chunks
//! - completion over the owner's chunks failed
//! - the owner answer came back empty or whitespace
//!
//! The query is embedded once and the same vector serves both tiers.
//! Failures on the global tier are real errors; there is nothing left
//! to fall back to.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::completion::CompletionProvider;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::index::{IndexError, VectorIndex};
use crate::models::validate_owner_id;

#[derive(Debug)]
pub struct RoutedAnswer {
    pub text: String,
    pub used_fallback: bool,
    /// Source paths of the chunks behind the answer, best match first.
    pub sources: Vec<String>,
}

/// Answer `query` for `owner`, falling back to the global index when
/// the owner-scoped path yields nothing usable.
pub async fn answer(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    completer: &dyn CompletionProvider,
    global: &VectorIndex,
    owner: &str,
    query: &str,
) -> Result<RoutedAnswer> {
    validate_owner_id(owner)?;

    let query_vec = embedding::embed_one(embedder, query)
        .await
        .context("Failed to embed query")?;

    if let Some((text, sources)) =
        owner_answer(config, completer, owner, query, &query_vec).await
    {
        return Ok(RoutedAnswer {
            text,
            used_fallback: false,
            sources,
        });
    }

    let hits = global
        .search(&query_vec, None)
        .await
        .context("Global index search failed")?;
    let context: Vec<String> = hits.iter().map(|h| h.chunk.content.clone()).collect();
    let sources = source_paths(&hits);

    let text = completer
        .complete(query, &context)
        .await
        .context("Completion over the global index failed")?;

    Ok(RoutedAnswer {
        text,
        used_fallback: true,
        sources,
    })
}

/// The owner-scoped attempt. Every `None` is a deliberate fallback.
async fn owner_answer(
    config: &Config,
    completer: &dyn CompletionProvider,
    owner: &str,
    query: &str,
    query_vec: &[f32],
) -> Option<(String, Vec<String>)> {
    let index = match VectorIndex::open(&config.owner_index_dir(owner)).await {
        Ok(index) => index,
        Err(IndexError::NotFound { .. }) => {
            debug!(owner, "no owner index, answering from global");
            return None;
        }
        Err(e) => {
            warn!(owner, error = %e, "owner index unusable, answering from global");
            return None;
        }
    };

    let hits = match index.search(query_vec, Some(config.retrieval.session_k)).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(owner, error = %e, "owner search failed, answering from global");
            index.close().await;
            return None;
        }
    };
    index.close().await;

    if hits.is_empty() {
        debug!(owner, "owner search matched nothing, answering from global");
        return None;
    }

    let context: Vec<String> = hits.iter().map(|h| h.chunk.content.clone()).collect();
    let sources = source_paths(&hits);

    let text = match completer.complete(query, &context).await {
        Ok(text) => text,
        Err(e) => {
            warn!(owner, error = %e, "owner completion failed, answering from global");
            return None;
        }
    };

    if text.trim().is_empty() {
        debug!(owner, "owner answer was empty, answering from global");
        return None;
    }

    Some((text, sources))
}

fn source_paths(hits: &[crate::models::ScoredChunk]) -> Vec<String> {
    let mut sources = Vec::new();
    for hit in hits {
        if !sources.contains(&hit.chunk.source_path) {
            sources.push(hit.chunk.source_path.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ExtractiveCompletion;
    use crate::corpus;
    use crate::embedding::HashEmbeddings;
    use crate::ocr::DisabledOcr;
    use crate::session;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config(data_dir: &Path, corpus_dir: &Path) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.to_path_buf();
        config.corpus.root = corpus_dir.to_path_buf();
        config
    }

    async fn global_with_policy(
        config: &Config,
        embedder: &dyn EmbeddingProvider,
    ) -> VectorIndex {
        std::fs::create_dir_all(&config.corpus.root).unwrap();
        std::fs::write(
            config.corpus.root.join("policy.txt"),
            "refunds are processed in 5 days",
        )
        .unwrap();
        let (index, _) = corpus::rebuild(config, embedder, &DisabledOcr).await.unwrap();
        index
    }

    #[tokio::test]
    async fn fresh_owner_answers_from_global() {
        let data = tempfile::tempdir().unwrap();
        let config = test_config(data.path(), &data.path().join("corpus"));
        let embedder = HashEmbeddings::new(32);
        let global = global_with_policy(&config, &embedder).await;

        let routed = answer(
            &config,
            &embedder,
            &ExtractiveCompletion,
            &global,
            "newcomer",
            "how long do refunds take",
        )
        .await
        .unwrap();

        assert!(routed.used_fallback);
        assert!(routed.text.contains("refunds are processed in 5 days"));
        assert_eq!(routed.sources, vec!["policy.txt".to_string()]);
    }

    #[tokio::test]
    async fn owner_with_matching_upload_answers_locally() {
        let data = tempfile::tempdir().unwrap();
        let config = test_config(data.path(), &data.path().join("corpus"));
        let embedder = HashEmbeddings::new(32);
        let global = global_with_policy(&config, &embedder).await;

        session::ingest_file(
            &config,
            &embedder,
            &DisabledOcr,
            "u1",
            "invoice.txt",
            b"invoice total: 42 dollars",
        )
        .await
        .unwrap();

        let routed = answer(
            &config,
            &embedder,
            &ExtractiveCompletion,
            &global,
            "u1",
            "what is the invoice total",
        )
        .await
        .unwrap();

        assert!(!routed.used_fallback);
        assert!(routed.text.contains("invoice total: 42 dollars"));
        assert_eq!(routed.sources, vec!["invoice.txt".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_owner_index_falls_back() {
        let data = tempfile::tempdir().unwrap();
        let config = test_config(data.path(), &data.path().join("corpus"));
        let embedder = HashEmbeddings::new(32);
        let global = global_with_policy(&config, &embedder).await;

        let owner_dir = config.owner_index_dir("u1");
        std::fs::create_dir_all(&owner_dir).unwrap();
        std::fs::write(owner_dir.join("index.sqlite"), b"scrambled").unwrap();

        let routed = answer(
            &config,
            &embedder,
            &ExtractiveCompletion,
            &global,
            "u1",
            "how long do refunds take",
        )
        .await
        .unwrap();

        assert!(routed.used_fallback);
        assert!(!routed.text.trim().is_empty());
    }

    #[tokio::test]
    async fn empty_owner_index_falls_back_without_completion_error() {
        let data = tempfile::tempdir().unwrap();
        let config = test_config(data.path(), &data.path().join("corpus"));
        let embedder = HashEmbeddings::new(32);
        let global = global_with_policy(&config, &embedder).await;

        // An index exists but holds no chunks, so the owner search
        // legitimately returns zero results.
        let index = VectorIndex::create(&config.owner_index_dir("u1")).await.unwrap();
        index.close().await;

        let routed = answer(
            &config,
            &embedder,
            &ExtractiveCompletion,
            &global,
            "u1",
            "how long do refunds take",
        )
        .await
        .unwrap();

        assert!(routed.used_fallback);
        assert!(routed.text.contains("refunds"));
    }

    struct BlankCompletion;

    #[async_trait]
    impl CompletionProvider for BlankCompletion {
        fn model_name(&self) -> &str {
            "blank"
        }

        async fn complete(&self, _query: &str, _context: &[String]) -> Result<String> {
            Ok("   ".to_string())
        }
    }

    #[tokio::test]
    async fn whitespace_owner_answer_falls_back() {
        let data = tempfile::tempdir().unwrap();
        let config = test_config(data.path(), &data.path().join("corpus"));
        let embedder = HashEmbeddings::new(32);
        let global = global_with_policy(&config, &embedder).await;

        session::ingest_file(&config, &embedder, &DisabledOcr, "u1", "a.txt", b"some words")
            .await
            .unwrap();

        let routed = answer(&config, &embedder, &BlankCompletion, &global, "u1", "some words")
            .await
            .unwrap();

        assert!(routed.used_fallback);
    }

    struct FlakyCompletion(AtomicUsize);

    #[async_trait]
    impl CompletionProvider for FlakyCompletion {
        fn model_name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _query: &str, _context: &[String]) -> Result<String> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("transient completion outage");
            }
            Ok("recovered".to_string())
        }
    }

    #[tokio::test]
    async fn owner_completion_error_falls_back() {
        let data = tempfile::tempdir().unwrap();
        let config = test_config(data.path(), &data.path().join("corpus"));
        let embedder = HashEmbeddings::new(32);
        let global = global_with_policy(&config, &embedder).await;

        session::ingest_file(&config, &embedder, &DisabledOcr, "u1", "a.txt", b"some words")
            .await
            .unwrap();

        let completer = FlakyCompletion(AtomicUsize::new(0));
        let routed = answer(&config, &embedder, &completer, &global, "u1", "some words")
            .await
            .unwrap();

        assert!(routed.used_fallback);
        assert_eq!(routed.text, "recovered");
    }
}
