use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use docqa_llm::{Embedder, Generator, LlmError};
use docqa_memory::document::{self, DocumentError, SplitterConfig, TokenSplitter};
use docqa_memory::{
    BuildSettings, Checkpoint, EmbeddedChunks, IndexMetadata, IndexStats, Retriever,
    ScoredChunk, Tokenize, VectorIndex,
};
use tokio::sync::{OnceCell, RwLock};

use crate::config::Config;
use crate::error::{PipelineError, QueryCause, QueryError};
use crate::instrument::{timed, with_timeout};
use crate::prompt;

/// Lifecycle of a single question.
///
/// `Idle → EmbeddingQuery → Retrieving → AssemblingPrompt → Generating → Done`, with
/// `Failed` reachable from every working stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Idle,
    EmbeddingQuery,
    Retrieving,
    AssemblingPrompt,
    Generating,
    Done,
    Failed,
}

impl QueryStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::EmbeddingQuery => "embedding_query",
            Self::Retrieving => "retrieving",
            Self::AssemblingPrompt => "assembling_prompt",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// The stage that follows on success, `None` for terminal stages.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::EmbeddingQuery),
            Self::EmbeddingQuery => Some(Self::Retrieving),
            Self::Retrieving => Some(Self::AssemblingPrompt),
            Self::AssemblingPrompt => Some(Self::Generating),
            Self::Generating => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }
}

impl std::fmt::Display for QueryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::EmbeddingQuery => "embedding the question",
            Self::Retrieving => "retrieving context",
            Self::AssemblingPrompt => "assembling the prompt",
            Self::Generating => "generating the answer",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: QueryStage,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<ScoredChunk>,
    pub prompt_version: &'static str,
    pub timings: Vec<StageTiming>,
    pub total: Duration,
}

impl Answer {
    /// Distinct source pages in retrieval order.
    #[must_use]
    pub fn source_pages(&self) -> Vec<usize> {
        let mut pages = Vec::new();
        for s in &self.sources {
            if !pages.contains(&s.chunk.page) {
                pages.push(s.chunk.page);
            }
        }
        pages
    }
}

/// What `ensure_index` did.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    /// Document and settings unchanged; the persisted index was reused.
    Reused { chunks: usize },
    /// The index was (re)built from the document.
    Built {
        pages: usize,
        chunks: usize,
        stats: IndexStats,
    },
    /// The document could not be read; a previous index is served instead.
    Stale { reason: String, chunks: usize },
}

#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub document: PathBuf,
    pub document_present: bool,
    pub up_to_date: bool,
    pub checkpoint: Option<Checkpoint>,
    pub metadata: Option<IndexMetadata>,
}

/// Per-question state. Lives on the stack of one `answer` call only.
struct QueryRun {
    stage: QueryStage,
    entered: Instant,
    timings: Vec<StageTiming>,
}

impl QueryRun {
    fn new() -> Self {
        Self {
            stage: QueryStage::Idle,
            entered: Instant::now(),
            timings: Vec::with_capacity(4),
        }
    }

    fn advance(&mut self) {
        if self.stage != QueryStage::Idle {
            self.timings.push(StageTiming {
                stage: self.stage,
                elapsed: self.entered.elapsed(),
            });
        }
        if let Some(next) = self.stage.next() {
            tracing::trace!(from = self.stage.as_str(), to = next.as_str(), "query stage");
            self.stage = next;
            self.entered = Instant::now();
        }
    }

    fn check<T>(&mut self, result: Result<T, impl Into<QueryCause>>) -> Result<T, QueryError> {
        result.map_err(|cause| {
            let failed_at = self.stage;
            self.stage = QueryStage::Failed;
            QueryError::new(failed_at, cause)
        })
    }
}

/// Bounds every embedding call of an index build by the embedding timeout.
struct BoundedEmbedder<'a, E> {
    inner: &'a E,
    seconds: u64,
}

impl<E: Embedder> Embedder for BoundedEmbedder<'_, E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        with_timeout("chunk embedding", self.seconds, self.inner.embed(text)).await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// The question answering pipeline: one document, one index, one embedder and generator.
pub struct Pipeline<E, G> {
    config: Config,
    embedder: E,
    generator: G,
    retriever: Retriever,
    index: RwLock<Option<VectorIndex>>,
    tokenizer: OnceCell<Arc<dyn Tokenize>>,
}

impl<E, G> std::fmt::Debug for Pipeline<E, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("document", &self.config.document.path)
            .field("retriever", &self.retriever)
            .finish_non_exhaustive()
    }
}

impl<E: Embedder, G: Generator> Pipeline<E, G> {
    #[must_use]
    pub fn new(config: Config, embedder: E, generator: G) -> Self {
        let retriever = Retriever::new(config.retrieval.k);
        Self {
            config,
            embedder,
            generator,
            retriever,
            index: RwLock::new(None),
            tokenizer: OnceCell::new(),
        }
    }

    /// Use `tokenizer` instead of resolving `chunking.tokenizer` on first build.
    #[must_use]
    pub fn with_tokenizer(self, tokenizer: Arc<dyn Tokenize>) -> Self {
        Self {
            tokenizer: OnceCell::new_with(Some(tokenizer)),
            ..self
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    fn build_settings(&self) -> BuildSettings {
        BuildSettings {
            embedding_model: self.embedder.model_id().to_owned(),
            chunk_size: self.config.chunking.chunk_size,
            chunk_overlap: self.config.chunking.chunk_overlap,
        }
    }

    async fn tokenizer(&self) -> Result<Arc<dyn Tokenize>, PipelineError> {
        let tokenizer = self
            .tokenizer
            .get_or_try_init(|| async {
                let spec = self.config.chunking.tokenizer.clone();
                tracing::info!(tokenizer = %spec, "loading tokenizer");
                let loaded = tokio::task::spawn_blocking(move || {
                    crate::bootstrap::load_tokenizer(&spec)
                })
                .await
                .map_err(|e| {
                    document::ChunkError::Tokenizer(format!("tokenizer loader aborted: {e}"))
                })??;
                Ok::<_, PipelineError>(loaded)
            })
            .await?;
        Ok(Arc::clone(tokenizer))
    }

    /// Make sure a usable index is loaded, rebuilding it when the document or the
    /// build settings changed since the last checkpoint. `force` always rebuilds.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be loaded (and no stale index may be
    /// served), or if chunking, embedding, or storage fails.
    pub async fn ensure_index(&self, force: bool) -> Result<IndexOutcome, PipelineError> {
        let doc_path = &self.config.document.path;
        let store_dir = &self.config.vector_store.path;
        let settings = self.build_settings();
        let checkpoint = Checkpoint::load(&self.config.document.checkpoint_path).await;

        let stored = checkpoint.as_ref().map(|cp| &cp.fingerprint);
        let changed = match document::needs_rebuild(doc_path, stored).await {
            Ok(changed) => changed,
            Err(e) => return self.stale_or_fail(e, checkpoint.as_ref()).await,
        };

        let reason = match &checkpoint {
            _ if force => "rebuild requested",
            None => "no checkpoint",
            Some(_) if changed => "document changed",
            Some(cp) if cp.settings != settings => "index settings changed",
            Some(_) if !VectorIndex::exists(store_dir) => "index missing",
            Some(cp) => {
                let index = VectorIndex::open(store_dir).await?;
                let indexed = index.metadata().await?.and_then(|m| m.fingerprint);
                if index.is_empty().await? {
                    "index empty"
                } else if indexed.as_ref() != Some(&cp.fingerprint) {
                    "index does not match checkpoint"
                } else {
                    let chunks = index.len().await?;
                    tracing::info!(
                        chunks,
                        fingerprint = %cp.fingerprint.short(),
                        "document unchanged, reusing vector index"
                    );
                    *self.index.write().await = Some(index);
                    return Ok(IndexOutcome::Reused { chunks });
                }
            }
        };
        tracing::info!(reason, document = %doc_path.display(), "building vector index");

        match self.build(&settings).await {
            Err(PipelineError::Document(e)) => self.stale_or_fail(e, checkpoint.as_ref()).await,
            other => other,
        }
    }

    async fn build(&self, settings: &BuildSettings) -> Result<IndexOutcome, PipelineError> {
        let cfg = &self.config;
        let (document, _) = timed(
            "load_document",
            document::load_document(&cfg.document.path, cfg.document.max_file_size),
        )
        .await;
        let document = document?;

        let tokenizer = self.tokenizer().await?;
        let splitter = TokenSplitter::new(SplitterConfig {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        })?;
        let chunks = splitter.split(tokenizer.as_ref(), &document.pages)?;
        if chunks.is_empty() {
            return Err(DocumentError::Empty(document.source.clone()).into());
        }

        let embedder = BoundedEmbedder {
            inner: &self.embedder,
            seconds: cfg.timeouts.embedding_seconds,
        };
        let (batch, _) = timed("embed_chunks", EmbeddedChunks::embed(&chunks, &embedder)).await;
        let batch = batch?;

        // queries wait only while the new contents are committed
        let mut guard = self.index.write().await;
        let index = match guard.as_ref() {
            Some(index) => index.clone(),
            None => VectorIndex::open(&cfg.vector_store.path).await?,
        };
        let (stats, _) = timed(
            "commit_index",
            index.replace(&batch, Some(&document.fingerprint)),
        )
        .await;
        let stats = stats?;
        *guard = Some(index);
        drop(guard);

        Checkpoint {
            fingerprint: document.fingerprint.clone(),
            source: document.source.display().to_string(),
            page_count: document.page_count(),
            chunk_count: chunks.len(),
            settings: settings.clone(),
            indexed_at: chrono::Utc::now(),
        }
        .save(&cfg.document.checkpoint_path)
        .await?;

        Ok(IndexOutcome::Built {
            pages: document.page_count(),
            chunks: chunks.len(),
            stats,
        })
    }

    /// Serve the previous index if allowed and available, else return `err`.
    async fn stale_or_fail(
        &self,
        err: DocumentError,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<IndexOutcome, PipelineError> {
        let store_dir = &self.config.vector_store.path;
        if !self.config.document.allow_stale_index
            || checkpoint.is_none()
            || !VectorIndex::exists(store_dir)
        {
            return Err(err.into());
        }

        let index = VectorIndex::open(store_dir).await?;
        if index.is_empty().await? {
            return Err(err.into());
        }
        let chunks = index.len().await?;
        tracing::warn!(error = %err, chunks, "document unavailable, serving stale vector index");
        *self.index.write().await = Some(index);
        Ok(IndexOutcome::Stale {
            reason: err.to_string(),
            chunks,
        })
    }

    /// Answer one question against the loaded index.
    ///
    /// Failures are confined to this call; the pipeline stays usable.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] naming the stage that failed.
    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        let started = Instant::now();
        let timeouts = self.config.timeouts;
        let mut run = QueryRun::new();
        tracing::info!(question, "answering question");

        run.advance();
        let (vector, _) = timed(
            "embed_query",
            with_timeout(
                "query embedding",
                timeouts.embedding_seconds,
                self.embedder.embed(question),
            ),
        )
        .await;
        let vector = run.check(vector)?;

        run.advance();
        let (sources, _) = timed("retrieve", async {
            let guard = self.index.read().await;
            let index = guard.as_ref().ok_or(QueryCause::NoIndex)?;
            self.retriever
                .retrieve_by_vector(index, &vector)
                .await
                .map_err(QueryCause::from)
        })
        .await;
        let sources = run.check(sources)?;
        tracing::debug!(
            retrieved = sources.len(),
            pages = ?sources.iter().map(|s| s.chunk.page).collect::<Vec<_>>(),
            "context retrieved"
        );

        run.advance();
        let prompt = prompt::render_chunks(&sources, question);
        tracing::debug!(
            prompt_chars = prompt.len(),
            version = prompt::PROMPT_VERSION,
            "prompt assembled"
        );

        run.advance();
        let (text, _) = timed(
            "generate",
            with_timeout(
                "generation",
                timeouts.llm_seconds,
                self.generator.generate(&prompt),
            ),
        )
        .await;
        let text = run.check(text)?.trim().to_owned();

        run.advance();
        let total = started.elapsed();
        tracing::info!(
            question,
            answer_chars = text.len(),
            sources = sources.len(),
            total_ms = u64::try_from(total.as_millis()).unwrap_or(u64::MAX),
            "question answered"
        );

        Ok(Answer {
            question: question.to_owned(),
            text,
            sources,
            prompt_version: prompt::PROMPT_VERSION,
            timings: run.timings,
            total,
        })
    }

    /// Inspect document, checkpoint, and index without building anything.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing index cannot be read.
    pub async fn status(&self) -> Result<IndexStatus, PipelineError> {
        let doc_path = &self.config.document.path;
        let checkpoint = Checkpoint::load(&self.config.document.checkpoint_path).await;
        let current = document::fingerprint(doc_path).await.ok();

        let metadata = if VectorIndex::exists(&self.config.vector_store.path) {
            VectorIndex::open(&self.config.vector_store.path)
                .await?
                .metadata()
                .await?
        } else {
            None
        };

        let up_to_date = match (&checkpoint, &current) {
            (Some(cp), Some(fp)) => cp.matches(fp, &self.build_settings()) && metadata.is_some(),
            _ => false,
        };

        Ok(IndexStatus {
            document: doc_path.clone(),
            document_present: current.is_some(),
            up_to_date,
            checkpoint,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use docqa_llm::mock::{MockEmbedder, MockGenerator};
    use docqa_memory::tokenizer::WhitespaceTokenizer;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
    }

    impl Fixture {
        fn new(document: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.document.path = dir.path().join("doc.txt");
            config.document.checkpoint_path = dir.path().join("checkpoint.json");
            config.vector_store.path = dir.path().join("vector_db");
            config.chunking.chunk_size = 8;
            config.chunking.chunk_overlap = 2;
            std::fs::write(&config.document.path, document).unwrap();
            Self { _dir: dir, config }
        }

        fn pipeline(
            &self,
            embedder: MockEmbedder,
            generator: MockGenerator,
        ) -> Pipeline<MockEmbedder, MockGenerator> {
            Pipeline::new(self.config.clone(), embedder, generator)
                .with_tokenizer(Arc::new(WhitespaceTokenizer))
        }
    }

    #[test]
    fn stages_advance_in_order() {
        let mut stage = QueryStage::Idle;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(
            seen,
            [
                QueryStage::Idle,
                QueryStage::EmbeddingQuery,
                QueryStage::Retrieving,
                QueryStage::AssemblingPrompt,
                QueryStage::Generating,
                QueryStage::Done,
            ]
        );
        assert!(QueryStage::Failed.next().is_none());
    }

    #[tokio::test]
    async fn first_run_builds_then_reuses() {
        let fx = Fixture::new("Paris is the capital of France.");
        let embedder = MockEmbedder::default();

        let first = fx.pipeline(embedder.clone(), MockGenerator::default());
        let outcome = first.ensure_index(false).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Built { pages: 1, chunks: 1, .. }));
        let calls_after_build = embedder.calls();
        assert_eq!(calls_after_build, 1);

        let second = fx.pipeline(embedder.clone(), MockGenerator::default());
        let outcome = second.ensure_index(false).await.unwrap();
        assert_eq!(outcome, IndexOutcome::Reused { chunks: 1 });
        assert_eq!(embedder.calls(), calls_after_build);
    }

    #[tokio::test]
    async fn changed_document_triggers_rebuild() {
        let fx = Fixture::new("first version");
        let pipeline = fx.pipeline(MockEmbedder::default(), MockGenerator::default());
        pipeline.ensure_index(false).await.unwrap();

        std::fs::write(&fx.config.document.path, "second version of the text").unwrap();
        let outcome = pipeline.ensure_index(false).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Built { .. }));
    }

    #[tokio::test]
    async fn changed_chunk_settings_trigger_rebuild() {
        let mut fx = Fixture::new("some words to index here");
        fx.pipeline(MockEmbedder::default(), MockGenerator::default())
            .ensure_index(false)
            .await
            .unwrap();

        fx.config.chunking.chunk_size = 3;
        fx.config.chunking.chunk_overlap = 1;
        let outcome = fx
            .pipeline(MockEmbedder::default(), MockGenerator::default())
            .ensure_index(false)
            .await
            .unwrap();
        assert!(matches!(outcome, IndexOutcome::Built { .. }));
    }

    #[tokio::test]
    async fn forced_rebuild_ignores_checkpoint() {
        let fx = Fixture::new("stable content");
        let pipeline = fx.pipeline(MockEmbedder::default(), MockGenerator::default());
        pipeline.ensure_index(false).await.unwrap();
        let outcome = pipeline.ensure_index(true).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Built { .. }));
    }

    #[tokio::test]
    async fn missing_document_fails_without_creating_index() {
        let fx = Fixture::new("x");
        std::fs::remove_file(&fx.config.document.path).unwrap();
        let pipeline = fx.pipeline(MockEmbedder::default(), MockGenerator::default());

        let err = pipeline.ensure_index(false).await.unwrap_err();
        assert!(matches!(err, PipelineError::Document(DocumentError::NotFound(_))));
        assert!(!VectorIndex::exists(&fx.config.vector_store.path));
        assert!(!fx.config.document.checkpoint_path.exists());
    }

    #[tokio::test]
    async fn stale_index_served_only_when_allowed() {
        let mut fx = Fixture::new("The warranty lasts two years.");
        fx.pipeline(MockEmbedder::default(), MockGenerator::default())
            .ensure_index(false)
            .await
            .unwrap();
        std::fs::remove_file(&fx.config.document.path).unwrap();

        let strict = fx.pipeline(MockEmbedder::default(), MockGenerator::default());
        assert!(strict.ensure_index(false).await.is_err());

        fx.config.document.allow_stale_index = true;
        let lenient = fx.pipeline(MockEmbedder::default(), MockGenerator::default());
        let outcome = lenient.ensure_index(false).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Stale { chunks: 1, .. }));

        let answer = lenient.answer("How long is the warranty?").await.unwrap();
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_keeps_previous_index_and_checkpoint() {
        let fx = Fixture::new("original text");
        fx.pipeline(MockEmbedder::default(), MockGenerator::default())
            .ensure_index(false)
            .await
            .unwrap();
        let before = Checkpoint::load(&fx.config.document.checkpoint_path)
            .await
            .unwrap();

        std::fs::write(&fx.config.document.path, "edited text").unwrap();
        let failing = fx.pipeline(MockEmbedder::failing(), MockGenerator::default());
        let err = failing.ensure_index(false).await.unwrap_err();
        assert!(matches!(err, PipelineError::Index(_)));

        let after = Checkpoint::load(&fx.config.document.checkpoint_path)
            .await
            .unwrap();
        assert_eq!(before, after);
        let index = VectorIndex::open(&fx.config.vector_store.path).await.unwrap();
        assert_eq!(index.get(0).await.unwrap().unwrap().text, "original text");
    }

    #[tokio::test]
    async fn index_out_of_sync_with_checkpoint_is_rebuilt() {
        let fx = Fixture::new("The warranty lasts two years.");
        fx.pipeline(MockEmbedder::default(), MockGenerator::default())
            .ensure_index(false)
            .await
            .unwrap();
        let recorded = std::fs::read(&fx.config.document.checkpoint_path).unwrap();

        // index moves on to a newer document but the checkpoint write is lost
        std::fs::write(&fx.config.document.path, "The warranty lasts five years.").unwrap();
        fx.pipeline(MockEmbedder::default(), MockGenerator::default())
            .ensure_index(false)
            .await
            .unwrap();
        std::fs::write(&fx.config.document.checkpoint_path, recorded).unwrap();
        std::fs::write(&fx.config.document.path, "The warranty lasts two years.").unwrap();

        let pipeline = fx.pipeline(MockEmbedder::default(), MockGenerator::default());
        let outcome = pipeline.ensure_index(false).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Built { chunks: 1, .. }));
        let answer = pipeline.answer("How long is the warranty?").await.unwrap();
        assert_eq!(answer.sources[0].chunk.text, "The warranty lasts two years.");
    }

    #[tokio::test]
    async fn checkpoint_failure_is_not_reported_as_stale() {
        let mut fx = Fixture::new("first version");
        fx.config.document.allow_stale_index = true;
        fx.pipeline(MockEmbedder::default(), MockGenerator::default())
            .ensure_index(false)
            .await
            .unwrap();

        std::fs::write(&fx.config.document.path, "second version").unwrap();
        std::fs::create_dir(fx.config.document.checkpoint_path.with_extension("tmp")).unwrap();

        let pipeline = fx.pipeline(MockEmbedder::default(), MockGenerator::default());
        let err = pipeline.ensure_index(false).await.unwrap_err();
        assert!(matches!(err, PipelineError::Checkpoint(_)));
        let index = VectorIndex::open(&fx.config.vector_store.path).await.unwrap();
        assert_eq!(index.get(0).await.unwrap().unwrap().text, "second version");
    }

    /// Chunk embeddings wait on `gate`; questions (ending in `?`) never do.
    struct GatedEmbedder {
        inner: MockEmbedder,
        gate: Arc<RwLock<()>>,
    }

    impl Embedder for GatedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            if !text.ends_with('?') {
                let _open = self.gate.read().await;
            }
            self.inner.embed(text).await
        }

        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
    }

    #[tokio::test]
    async fn queries_proceed_while_rebuild_embeds() {
        let fx = Fixture::new("alpha beta gamma");
        let gate = Arc::new(RwLock::new(()));
        let pipeline = Pipeline::new(
            fx.config.clone(),
            GatedEmbedder {
                inner: MockEmbedder::default(),
                gate: Arc::clone(&gate),
            },
            MockGenerator::default(),
        )
        .with_tokenizer(Arc::new(WhitespaceTokenizer));
        pipeline.ensure_index(false).await.unwrap();

        std::fs::write(&fx.config.document.path, "delta epsilon zeta").unwrap();
        let closed = gate.write().await;
        let p = &pipeline;
        let query = async move {
            let answered =
                tokio::time::timeout(Duration::from_secs(5), p.answer("which letters?")).await;
            drop(closed);
            answered
        };
        let (rebuilt, answered) = tokio::join!(pipeline.ensure_index(false), query);

        let answer = answered.expect("query blocked by rebuild").unwrap();
        assert_eq!(answer.sources[0].chunk.text, "alpha beta gamma");
        assert!(matches!(rebuilt.unwrap(), IndexOutcome::Built { .. }));
        let answer = pipeline.answer("which letters?").await.unwrap();
        assert_eq!(answer.sources[0].chunk.text, "delta epsilon zeta");
    }

    #[tokio::test]
    async fn answer_walks_all_stages() {
        let fx = Fixture::new("Paris is the capital of France.");
        let generator = MockGenerator::with_responses(vec!["  Paris.  ".into()]);
        let pipeline = fx.pipeline(MockEmbedder::default(), generator.clone());
        pipeline.ensure_index(false).await.unwrap();

        let answer = pipeline.answer("What is the capital of France?").await.unwrap();
        assert_eq!(answer.text, "Paris.");
        assert_eq!(answer.source_pages(), [1]);
        let stages: Vec<QueryStage> = answer.timings.iter().map(|t| t.stage).collect();
        assert_eq!(
            stages,
            [
                QueryStage::EmbeddingQuery,
                QueryStage::Retrieving,
                QueryStage::AssemblingPrompt,
                QueryStage::Generating,
            ]
        );

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Paris is the capital of France."));
        assert!(prompts[0].contains("What is the capital of France?"));
    }

    #[tokio::test]
    async fn answer_without_index_reports_retrieval_stage() {
        let fx = Fixture::new("text");
        let pipeline = fx.pipeline(MockEmbedder::default(), MockGenerator::default());
        let err = pipeline.answer("anything?").await.unwrap_err();
        assert_eq!(err.stage, QueryStage::Retrieving);
        assert!(matches!(err.cause, QueryCause::NoIndex));
        assert!(err.user_message().contains("docqa index"));
    }

    #[tokio::test]
    async fn generation_failure_does_not_poison_next_query() {
        let fx = Fixture::new("Some content about rivers.");
        let pipeline = fx.pipeline(MockEmbedder::default(), MockGenerator::failing());
        pipeline.ensure_index(false).await.unwrap();
        let err = pipeline.answer("rivers?").await.unwrap_err();
        assert_eq!(err.stage, QueryStage::Generating);

        let healthy = Pipeline::new(
            fx.config.clone(),
            MockEmbedder::default(),
            MockGenerator::default(),
        )
        .with_tokenizer(Arc::new(WhitespaceTokenizer));
        healthy.ensure_index(false).await.unwrap();
        assert!(healthy.answer("rivers?").await.is_ok());
        assert!(pipeline.answer("rivers again?").await.is_err());
        assert!(healthy.answer("rivers again?").await.is_ok());
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let mut fx = Fixture::new("content");
        fx.config.timeouts.llm_seconds = 1;
        let pipeline = fx.pipeline(
            MockEmbedder::default(),
            MockGenerator::default().with_delay(5_000),
        );
        pipeline.ensure_index(false).await.unwrap();

        let err = pipeline.answer("q").await.unwrap_err();
        assert_eq!(err.stage, QueryStage::Generating);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn status_reports_freshness() {
        let fx = Fixture::new("status check");
        let pipeline = fx.pipeline(MockEmbedder::default(), MockGenerator::default());
        let before = pipeline.status().await.unwrap();
        assert!(before.document_present);
        assert!(!before.up_to_date);
        assert!(before.metadata.is_none());

        pipeline.ensure_index(false).await.unwrap();
        let after = pipeline.status().await.unwrap();
        assert!(after.up_to_date);
        assert_eq!(after.metadata.unwrap().chunk_count, 1);
        assert_eq!(after.checkpoint.unwrap().page_count, 1);
    }
}
