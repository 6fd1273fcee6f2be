//! Persistent chunk + vector store with exhaustive cosine search.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use docqa_llm::Embedder;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::document::{Chunk, Fingerprint};
use crate::error::IndexError;

/// Database file created inside the vector store directory.
pub const INDEX_FILE: &str = "index.db";

const META_MODEL: &str = "embedding_model";
const META_DIMENSION: &str = "dimension";
const META_FINGERPRINT: &str = "fingerprint";
const META_COUNT: &str = "chunk_count";
const META_BUILT_AT: &str = "built_at";

type ChunkRow = (i64, i64, i64, i64, i64, Option<i64>, String, Vec<u8>);

const SELECT_CHUNKS: &str = "SELECT id, page, token_start, token_end, token_count, prev_id, text, vector \
     FROM chunks";

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub embedding_model: String,
    pub dimension: usize,
    pub fingerprint: Option<Fingerprint>,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub entries: usize,
    pub dimension: usize,
    pub elapsed_ms: u64,
}

/// Chunks paired with their vectors, ready for [`VectorIndex::replace`].
#[derive(Debug, Clone)]
pub struct EmbeddedChunks<'a> {
    chunks: &'a [Chunk],
    vectors: Vec<Vec<f32>>,
    model: String,
    dimension: usize,
    started: Instant,
}

impl<'a> EmbeddedChunks<'a> {
    const BATCH: usize = 32;

    /// Embed `chunks` in order, in batches.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Empty`] for no chunks, the first embedding error, or
    /// [`IndexError::MalformedEmbedding`] if the vectors disagree on dimensionality.
    pub async fn embed<E: Embedder>(
        chunks: &'a [Chunk],
        embedder: &E,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }
        let started = Instant::now();
        tracing::info!(chunks = chunks.len(), model = embedder.model_id(), "embedding chunks");

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(Self::BATCH) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            vectors.extend(embedder.embed_batch(&texts).await?);
            tracing::debug!(done = vectors.len(), total = chunks.len(), "embedding progress");
        }
        if vectors.len() != chunks.len() {
            return Err(IndexError::MalformedEmbedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let dimension = validate_vectors(&vectors)?;

        Ok(Self {
            chunks,
            vectors,
            model: embedder.model_id().to_owned(),
            dimension,
            started,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl VectorIndex {
    /// Open (or create) `index.db` under `dir` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub async fn open(dir: &Path) -> Result<Self, IndexError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(INDEX_FILE);

        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;

        tracing::debug!(path = %path.display(), "vector index opened");
        Ok(Self {
            pool,
            path: Some(path),
        })
    }

    /// Non-persistent index, for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn in_memory() -> Result<Self, IndexError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        Ok(Self { pool, path: None })
    }

    /// Whether an index database was ever created under `dir`.
    #[must_use]
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Embed every chunk, then replace the whole index in one transaction.
    ///
    /// Nothing is written unless all embeddings succeed and agree on dimensionality,
    /// so a failed build leaves the previous index intact.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails, the vectors are inconsistent, or the write
    /// fails.
    pub async fn build<E: Embedder>(
        &self,
        chunks: &[Chunk],
        embedder: &E,
        fingerprint: Option<&Fingerprint>,
    ) -> Result<IndexStats, IndexError> {
        let batch = EmbeddedChunks::embed(chunks, embedder).await?;
        self.replace(&batch, fingerprint).await
    }

    /// Replace the whole index with `batch` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the previous contents are then kept.
    pub async fn replace(
        &self,
        batch: &EmbeddedChunks<'_>,
        fingerprint: Option<&Fingerprint>,
    ) -> Result<IndexStats, IndexError> {
        let EmbeddedChunks {
            chunks,
            vectors,
            model,
            dimension,
            started,
        } = batch;
        let dimension = *dimension;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                "INSERT INTO chunks (id, page, token_start, token_end, token_count, prev_id, text, vector) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(i64::try_from(chunk.id)?)
            .bind(i64::try_from(chunk.page)?)
            .bind(i64::try_from(chunk.token_start)?)
            .bind(i64::try_from(chunk.token_end)?)
            .bind(i64::try_from(chunk.token_count)?)
            .bind(chunk.prev_id.map(i64::try_from).transpose()?)
            .bind(&chunk.text)
            .bind(encode_vector(vector))
            .execute(&mut *tx)
            .await?;
        }

        let meta = [
            (META_MODEL, model.clone()),
            (META_DIMENSION, dimension.to_string()),
            (META_COUNT, chunks.len().to_string()),
            (META_BUILT_AT, Utc::now().to_rfc3339()),
        ];
        for (key, value) in meta
            .into_iter()
            .chain(fingerprint.map(|fp| (META_FINGERPRINT, fp.to_string())))
        {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let stats = IndexStats {
            entries: chunks.len(),
            dimension,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        tracing::info!(
            entries = stats.entries,
            dimension,
            elapsed_ms = stats.elapsed_ms,
            "vector index built"
        );
        Ok(stats)
    }

    /// Embed `text` with `embedder` and return the `k` most similar chunks.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Empty`] for an empty index, [`IndexError::DimensionMismatch`]
    /// when the embedder disagrees with the stored vectors, or an embedding error.
    pub async fn query<E: Embedder>(
        &self,
        embedder: &E,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let meta = self.metadata().await?.ok_or(IndexError::Empty)?;
        if meta.embedding_model != embedder.model_id() {
            tracing::warn!(
                stored = %meta.embedding_model,
                current = embedder.model_id(),
                "query embedder differs from the model the index was built with"
            );
        }
        let vector = embedder.embed(text).await?;
        self.search_vector(&vector, k).await
    }

    /// Top-`k` chunks by cosine similarity, descending. Ties keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Empty`] or [`IndexError::DimensionMismatch`].
    pub async fn search_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let meta = self.metadata().await?.ok_or(IndexError::Empty)?;
        if vector.len() != meta.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: meta.dimension,
                actual: vector.len(),
            });
        }

        let rows: Vec<ChunkRow> = sqlx::query_as(&format!("{SELECT_CHUNKS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Err(IndexError::Empty);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let (chunk, stored) = row_to_chunk(row)?;
            if stored.len() != vector.len() {
                return Err(IndexError::Corrupt(format!(
                    "chunk {} has {} dimensions, expected {}",
                    chunk.id,
                    stored.len(),
                    vector.len()
                )));
            }
            let score = cosine_similarity(vector, &stored);
            scored.push(ScoredChunk { chunk, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: usize) -> Result<Option<Chunk>, IndexError> {
        let row: Option<ChunkRow> = sqlx::query_as(&format!("{SELECT_CHUNKS} WHERE id = ?"))
            .bind(i64::try_from(id)?)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_chunk(r).map(|(chunk, _)| chunk))
            .transpose()
    }

    /// Remove one entry. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn delete(&self, id: usize) -> Result<bool, IndexError> {
        let id = i64::try_from(id)?;
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        if removed {
            sqlx::query("UPDATE chunks SET prev_id = NULL WHERE prev_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE index_meta SET value = (SELECT COUNT(*) FROM chunks) WHERE key = ?",
            )
            .bind(META_COUNT)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn len(&self) -> Result<usize, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count)?)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }

    /// Build metadata, or `None` if the index was never built.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or stored values are unparsable.
    pub async fn metadata(&self) -> Result<Option<IndexMetadata>, IndexError> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut map: HashMap<String, String> = rows.into_iter().collect();

        let mut take = |key: &str| {
            map.remove(key)
                .ok_or_else(|| IndexError::Corrupt(format!("missing index metadata `{key}`")))
        };
        let embedding_model = take(META_MODEL)?;
        let dimension = parse_meta(META_DIMENSION, &take(META_DIMENSION)?)?;
        let chunk_count = parse_meta(META_COUNT, &take(META_COUNT)?)?;
        let built_at = DateTime::parse_from_rfc3339(&take(META_BUILT_AT)?)
            .map_err(|e| IndexError::Corrupt(format!("invalid `{META_BUILT_AT}`: {e}")))?
            .with_timezone(&Utc);
        let fingerprint = take(META_FINGERPRINT).ok().map(Fingerprint::from);

        Ok(Some(IndexMetadata {
            embedding_model,
            dimension,
            fingerprint,
            chunk_count,
            built_at,
        }))
    }
}

fn parse_meta(key: &str, value: &str) -> Result<usize, IndexError> {
    value
        .parse()
        .map_err(|e| IndexError::Corrupt(format!("invalid `{key}` = {value:?}: {e}")))
}

/// All vectors must be non-empty, finite, and of equal length. Returns that length.
fn validate_vectors(vectors: &[Vec<f32>]) -> Result<usize, IndexError> {
    let dimension = vectors.first().map_or(0, Vec::len);
    if dimension == 0 {
        return Err(IndexError::MalformedEmbedding("zero-length vector".into()));
    }
    for (i, v) in vectors.iter().enumerate() {
        if v.len() != dimension {
            return Err(IndexError::MalformedEmbedding(format!(
                "vector {i} has {} dimensions, expected {dimension}",
                v.len()
            )));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::MalformedEmbedding(format!(
                "vector {i} contains non-finite values"
            )));
        }
    }
    Ok(dimension)
}

fn row_to_chunk(row: ChunkRow) -> Result<(Chunk, Vec<f32>), IndexError> {
    let (id, page, token_start, token_end, token_count, prev_id, text, blob) = row;
    let chunk = Chunk {
        id: usize::try_from(id)?,
        page: usize::try_from(page)?,
        text,
        token_count: usize::try_from(token_count)?,
        token_start: usize::try_from(token_start)?,
        token_end: usize::try_from(token_end)?,
        prev_id: prev_id.map(usize::try_from).transpose()?,
    };
    Ok((chunk, decode_vector(&blob)?))
}

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, IndexError> {
    if bytes.len() % 4 != 0 {
        return Err(IndexError::Corrupt(format!(
            "vector blob of {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
