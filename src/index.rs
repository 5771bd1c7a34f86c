//! Persistent vector index backed by SQLite.
//!
//! Each index lives in its own directory as a single `index.sqlite`
//! database (WAL mode) with three tables:
//!
//! - `chunks` — chunk text plus provenance (source path, page, position)
//! - `chunk_vectors` — embedding per chunk, little-endian f32 BLOB
//! - `manifest` — one row per indexed file, used for incremental updates
//!
//! Re-indexing a file replaces its chunks transactionally via
//! [`VectorIndex::replace_file`], so an index never has to be rebuilt
//! from scratch just because one more file arrived. Search is
//! brute-force cosine similarity over all stored vectors, which is the
//! right trade-off at per-owner scale.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ScoredChunk, StoredChunk};

const INDEX_FILE: &str = "index.sqlite";

#[derive(Debug, Error)]
pub enum IndexError {
    /// The index directory has no database. Callers decide whether this
    /// means "build one" or "fall back".
    #[error("no index found at {}", path.display())]
    NotFound { path: PathBuf },

    /// The database exists but cannot be opened or is missing its
    /// schema. Never auto-repaired.
    #[error("index at {} is corrupt or unreadable: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One row of the index manifest: a file the index currently covers.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub source_path: String,
    pub chunk_count: i64,
    pub indexed_at: i64,
}

pub struct VectorIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl VectorIndex {
    /// Whether `dir` holds an index database.
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    /// Create a fresh index under `dir`, creating the directory if needed.
    pub async fn create(dir: &Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_FILE);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                page INTEGER,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS manifest (
                source_path TEXT PRIMARY KEY,
                chunk_count INTEGER NOT NULL,
                indexed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_path ON chunks(source_path)")
            .execute(&pool)
            .await?;

        Ok(Self { pool, path })
    }

    /// Open an existing index. Fails with [`IndexError::NotFound`] when
    /// the database file is absent and [`IndexError::Corrupt`] when it
    /// exists but cannot be used.
    pub async fn open(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(INDEX_FILE);
        if !path.is_file() {
            return Err(IndexError::NotFound { path });
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(false)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::Corrupt {
                path: path.clone(),
                source: Box::new(e),
            })?;

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('chunks', 'chunk_vectors', 'manifest')",
        )
        .fetch_one(&pool)
        .await
        .map_err(|e| IndexError::Corrupt {
            path: path.clone(),
            source: Box::new(e),
        })?;

        if tables != 3 {
            pool.close().await;
            return Err(IndexError::Corrupt {
                path,
                source: anyhow::anyhow!("expected tables are missing").into(),
            });
        }

        Ok(Self { pool, path })
    }

    /// Open the index under `dir`, creating it when absent.
    pub async fn open_or_create(dir: &Path) -> Result<Self, IndexError> {
        if Self::exists(dir) {
            Self::open(dir).await
        } else {
            Self::create(dir).await
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace all chunks for `source_path` with `chunks` in a single
    /// transaction. Re-uploading a file swaps its old chunks for the
    /// new ones; every other file's rows are untouched.
    pub async fn replace_file(
        &self,
        source_path: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::Other(anyhow::anyhow!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM chunk_vectors WHERE chunk_id IN \
             (SELECT id FROM chunks WHERE source_path = ?)",
        )
        .bind(source_path)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE source_path = ?")
            .bind(source_path)
            .execute(&mut *tx)
            .await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let id = uuid::Uuid::new_v4().to_string();

            sqlx::query(
                "INSERT INTO chunks (id, source_path, page, chunk_index, content) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(source_path)
            .bind(chunk.page.map(|p| p as i64))
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;

            let blob = vec_to_blob(vector);
            sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
                .bind(&id)
                .bind(&blob)
                .execute(&mut *tx)
                .await?;
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO manifest (source_path, chunk_count, indexed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(source_path) DO UPDATE SET
                chunk_count = excluded.chunk_count,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(source_path)
        .bind(chunks.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Drop one file's chunks, vectors, and manifest row. No-op if the
    /// file was never indexed.
    pub async fn remove_file(&self, source_path: &str) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM chunk_vectors WHERE chunk_id IN \
             (SELECT id FROM chunks WHERE source_path = ?)",
        )
        .bind(source_path)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE source_path = ?")
            .bind(source_path)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM manifest WHERE source_path = ?")
            .bind(source_path)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete every chunk, vector, and manifest row. Used by the global
    /// rebuild before files are re-added one by one.
    pub async fn clear_all(&self) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM manifest").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rank all stored chunks by cosine similarity to `query_vec`,
    /// highest first. `k = None` returns the full ranking; ties break
    /// by source path, then chunk position, so results are stable.
    pub async fn search(
        &self,
        query_vec: &[f32],
        k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source_path, c.page, c.chunk_index, c.content, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                let score = cosine_similarity(query_vec, &vec);
                ScoredChunk {
                    chunk: StoredChunk {
                        id: row.get("id"),
                        source_path: row.get("source_path"),
                        page: row.get("page"),
                        chunk_index: row.get("chunk_index"),
                        content: row.get("content"),
                    },
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.source_path.cmp(&b.chunk.source_path))
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });

        if let Some(k) = k {
            scored.truncate(k);
        }

        Ok(scored)
    }

    /// Files this index currently covers, ordered by path.
    pub async fn manifest(&self) -> Result<Vec<ManifestEntry>, IndexError> {
        let rows = sqlx::query(
            "SELECT source_path, chunk_count, indexed_at FROM manifest ORDER BY source_path",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ManifestEntry {
                source_path: row.get("source_path"),
                chunk_count: row.get("chunk_count"),
                indexed_at: row.get("indexed_at"),
            })
            .collect())
    }

    /// Number of chunks stored across all files.
    pub async fn len(&self) -> Result<i64, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
