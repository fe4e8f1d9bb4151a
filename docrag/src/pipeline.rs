//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates document ingestion (chunk, embed, replace
//! stored chunks) and query answering, which runs one pass of the query state
//! machine per call:
//!
//! ```text
//! RECEIVED -> EMBEDDING_QUERY -> RETRIEVING -> RANKING -> PACKING
//!          -> PROMPTING -> GENERATING -> DONE | FAILED
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{InMemoryVectorStore, RagConfig, RagPipeline, RagQuery};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .store(Arc::new(InMemoryVectorStore::new()))
//!     .generation_provider(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.ingest_text("handbook", handbook_text).await?;
//! let answer = pipeline.query(&RagQuery::new("How many vacation days do I get?")).await?;
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::chunking::{Chunker, SectionChunker};
use crate::config::RagConfig;
use crate::context::ContextPacker;
use crate::document::{Chunk, Document, RetrievalResult, SearchFilter};
use crate::embedding::{EmbeddingAdapter, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{DiagramProvider, DiagramType, GenerationProvider};
use crate::ingest::DocumentLocks;
use crate::prompt::{
    ConversationTurn, contextualize_query, grounding_prompt, recent_turns, suggest_followups,
};
use crate::reranker::{CosineReranker, Reranker};
use crate::retrieval::Retriever;
use crate::retry::{retry_or_else, retry_with_backoff};
use crate::vectorstore::{ChunkStore, VectorStore};

/// Largest `max_chunks` a query may request.
pub const MAX_CHUNKS_LIMIT: usize = 20;

const NO_CONTENT_ANSWER: &str =
    "I could not find anything in the available documents that answers this question.";
const APOLOGY_ANSWER: &str = "I'm sorry, I could not generate an answer right now. \
                              The passages retrieved for your question are listed as sources.";
const UNAVAILABLE_ANSWER: &str =
    "I'm sorry, the document search is temporarily unavailable. Please try again shortly.";

/// How a query selects and uses its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Search every document matching the tag filter.
    #[default]
    General,
    /// Search only the chunks of [`RagQuery::document_id`].
    DocumentScoped,
    /// Like `General`, with recent conversation turns folded into the query.
    Conversational,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General => "general",
            Self::DocumentScoped => "document_scoped",
            Self::Conversational => "conversational",
        };
        f.write_str(name)
    }
}

/// States of the per-query state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Received,
    EmbeddingQuery,
    Retrieving,
    Ranking,
    Packing,
    Prompting,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::EmbeddingQuery => "EMBEDDING_QUERY",
            Self::Retrieving => "RETRIEVING",
            Self::Ranking => "RANKING",
            Self::Packing => "PACKING",
            Self::Prompting => "PROMPTING",
            Self::Generating => "GENERATING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A question to answer from the ingested documents.
///
/// Unset `max_chunks` and `min_similarity` fall back to the pipeline's
/// [`RetrievalConfig`](crate::RetrievalConfig) defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RagQuery {
    pub text: String,
    pub domain_tags: BTreeSet<String>,
    pub document_id: Option<String>,
    pub history: Vec<ConversationTurn>,
    pub max_chunks: Option<usize>,
    pub min_similarity: Option<f32>,
    pub mode: QueryMode,
    pub diagram: Option<DiagramType>,
}

impl RagQuery {
    /// A general query with default limits.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    /// Restrict retrieval to chunks carrying at least one of `tags`.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Scope the query to one document and switch to [`QueryMode::DocumentScoped`].
    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self.mode = QueryMode::DocumentScoped;
        self
    }

    /// Attach prior turns and switch to [`QueryMode::Conversational`].
    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self.mode = QueryMode::Conversational;
        self
    }

    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = Some(max_chunks);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Request a diagram of the answer.
    pub fn with_diagram(mut self, diagram_type: DiagramType) -> Self {
        self.diagram = Some(diagram_type);
        self
    }
}

/// How a query ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The generator produced a grounded answer.
    Answered,
    /// No chunk met the similarity threshold.
    NoRelevantContent,
    /// A provider or store failed; sources are kept when retrieval succeeded.
    Degraded,
}

/// A chunk cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl From<&RetrievalResult> for SourceChunk {
    fn from(result: &RetrievalResult) -> Self {
        let chunk = &result.chunk;
        Self {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            text: chunk.text.clone(),
            similarity: result.similarity,
            page: chunk.page,
            section: chunk.section_title.clone(),
        }
    }
}

/// Rendered diagram source attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    #[serde(rename = "type")]
    pub diagram_type: DiagramType,
    pub code: String,
}

/// The structured result of a query. Always returned, even when providers fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagAnswer {
    pub query_id: String,
    pub answer_text: String,
    pub confidence: f32,
    pub quality: f32,
    pub source_chunks: Vec<SourceChunk>,
    pub suggested_followups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram: Option<Diagram>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub outcome: AnswerOutcome,
    /// Every state the query passed through, in order.
    pub states: Vec<QueryState>,
}

impl RagAnswer {
    fn without_sources(
        query_id: Uuid,
        outcome: AnswerOutcome,
        answer_text: &str,
        error_message: String,
        states: Vec<QueryState>,
    ) -> Self {
        Self {
            query_id: query_id.to_string(),
            answer_text: answer_text.to_string(),
            confidence: 0.0,
            quality: 0.0,
            source_chunks: Vec::new(),
            suggested_followups: Vec::new(),
            diagram: None,
            error_message: Some(error_message),
            outcome,
            states,
        }
    }

    /// The final state of the query.
    pub fn final_state(&self) -> Option<QueryState> {
        self.states.last().copied()
    }
}

fn no_content_reason(query: &RagQuery, min_similarity: f32) -> String {
    match (&query.mode, &query.document_id) {
        (QueryMode::DocumentScoped, Some(id)) => {
            format!("no chunks of document '{id}' met the similarity threshold of {min_similarity}")
        }
        _ => format!("no chunks met the similarity threshold of {min_similarity}"),
    }
}

/// Heuristic answer confidence: `0.5`, plus `0.1` per source up to `0.3`,
/// plus `0.2` for answers longer than 100 characters, clamped to `[0, 1]`.
pub fn answer_confidence(source_count: usize, answer: &str) -> f32 {
    let mut confidence = 0.5 + (0.1 * source_count as f32).min(0.3);
    if answer.chars().count() > 100 {
        confidence += 0.2;
    }
    confidence.clamp(0.0, 1.0)
}

/// Average of the answer confidence and the mean confidence of its sources.
pub fn answer_quality(confidence: f32, sources: &[RetrievalResult]) -> f32 {
    if sources.is_empty() {
        return confidence;
    }
    let mean = sources.iter().map(|s| s.chunk.confidence).sum::<f32>() / sources.len() as f32;
    ((confidence + mean) / 2.0).clamp(0.0, 1.0)
}

/// Validated per-query limits.
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_chunks: usize,
    min_similarity: f32,
}

/// Records the states a single query visits.
struct QueryRun {
    states: Vec<QueryState>,
}

impl QueryRun {
    fn new() -> Self {
        let mut run = Self { states: Vec::with_capacity(9) };
        run.enter(QueryState::Received);
        run
    }

    fn enter(&mut self, state: QueryState) {
        debug!(%state, "query state");
        self.states.push(state);
    }

    fn finish(mut self, state: QueryState) -> Vec<QueryState> {
        self.enter(state);
        self.states
    }
}

/// The RAG pipeline orchestrator.
///
/// Safe to share across tasks: queries only read the stores, and ingestion
/// of a given document is serialised by an internal [`DocumentLocks`].
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedder: EmbeddingAdapter,
    chunk_store: Arc<dyn ChunkStore>,
    retriever: Retriever,
    chunker: Arc<dyn Chunker>,
    reranker: Arc<dyn Reranker>,
    packer: ContextPacker,
    generator: Arc<dyn GenerationProvider>,
    diagrams: Option<Arc<dyn DiagramProvider>>,
    locks: DocumentLocks,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding adapter.
    pub fn embedder(&self) -> &EmbeddingAdapter {
        &self.embedder
    }

    /// Return a reference to the chunk store.
    pub fn chunk_store(&self) -> &Arc<dyn ChunkStore> {
        &self.chunk_store
    }

    /// Chunk, embed, and store a document, replacing any chunks it had.
    ///
    /// The document moves to `Processing` for the duration and ends
    /// `Completed`, or `Failed` with the error recorded as its reason.
    /// Embedding failures never fail ingestion; affected chunks carry
    /// degraded zero vectors and are excluded from retrieval until the
    /// document is reprocessed. Returns the number of chunks stored.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Conflict`] if the document is already processing,
    /// or the store error if deleting or saving chunks fails.
    pub async fn ingest(&self, document: &mut Document) -> Result<usize> {
        let _guard = self.locks.lock(&document.id).await;
        document.start_processing()?;

        match self.replace_chunks(document).await {
            Ok(chunk_count) => {
                document.complete()?;
                info!(document.id = %document.id, chunk_count, "ingested document");
                Ok(chunk_count)
            }
            Err(e) => {
                error!(document.id = %document.id, error = %e, "ingestion failed");
                document.fail(e.to_string())?;
                Err(e)
            }
        }
    }

    /// Ingest raw text under `document_id` with default document settings.
    ///
    /// # Errors
    ///
    /// See [`ingest`](Self::ingest).
    pub async fn ingest_text(&self, document_id: &str, text: &str) -> Result<usize> {
        let mut document = Document::new(document_id, text);
        self.ingest(&mut document).await
    }

    async fn replace_chunks(&self, document: &Document) -> Result<usize> {
        let mut chunks = self.chunker.chunk(document);
        let low_confidence = chunks.iter().filter(|c| c.is_low_confidence()).count();
        let degraded = self.embedder.embed_chunks(&mut chunks).await;
        if degraded > 0 {
            warn!(
                document.id = %document.id,
                degraded,
                chunk_count = chunks.len(),
                "stored chunks with degraded embeddings; reprocess the document to retry"
            );
        }

        let removed = self.chunk_store.delete_chunks(&document.id).await?;
        self.chunk_store.save_chunks(&chunks).await?;
        debug!(document.id = %document.id, removed, low_confidence, "replaced document chunks");
        Ok(chunks.len())
    }

    /// Delete every chunk of a document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if the document has no chunks.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let _guard = self.locks.lock(document_id).await;
        let removed = self.chunk_store.delete_chunks(document_id).await?;
        if removed == 0 {
            return Err(RagError::document_not_found(document_id));
        }
        info!(document.id = %document_id, removed, "deleted document chunks");
        Ok(removed)
    }

    /// The stored chunks of a document, ordered by index.
    pub async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.chunk_store.get_chunks(document_id).await
    }

    fn limits(&self, query: &RagQuery) -> Result<Limits> {
        if query.text.trim().is_empty() {
            return Err(RagError::Validation("query text must not be empty".to_string()));
        }
        let retrieval = &self.config.retrieval;
        let max_chunks = query.max_chunks.unwrap_or(retrieval.default_max_chunks);
        if !(1..=MAX_CHUNKS_LIMIT).contains(&max_chunks) {
            return Err(RagError::Validation(format!(
                "max_chunks must be between 1 and {MAX_CHUNKS_LIMIT}, got {max_chunks}"
            )));
        }
        let min_similarity = query.min_similarity.unwrap_or(retrieval.default_min_similarity);
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(RagError::Validation(format!(
                "min_similarity must be between 0 and 1, got {min_similarity}"
            )));
        }
        if query.mode == QueryMode::DocumentScoped
            && query.document_id.as_deref().is_none_or(|id| id.trim().is_empty())
        {
            return Err(RagError::Validation(
                "document-scoped queries require a document_id".to_string(),
            ));
        }
        Ok(Limits { max_chunks, min_similarity })
    }

    /// Answer a query from the ingested documents.
    ///
    /// Provider and store failures never surface as errors: the returned
    /// [`RagAnswer`] reports them through [`AnswerOutcome::Degraded`] and
    /// `error_message`. An absence of relevant chunks is reported as
    /// [`AnswerOutcome::NoRelevantContent`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for empty text, `max_chunks` outside
    /// `1..=20`, `min_similarity` outside `[0, 1]`, or a document-scoped query
    /// without a document ID.
    pub async fn query(&self, query: &RagQuery) -> Result<RagAnswer> {
        let limits = self.limits(query)?;
        let query_id = Uuid::new_v4();
        let span = info_span!("rag.query", query.id = %query_id, mode = %query.mode);
        Ok(self.run_query(query, limits, query_id).instrument(span).await)
    }

    async fn run_query(&self, query: &RagQuery, limits: Limits, query_id: Uuid) -> RagAnswer {
        let mut run = QueryRun::new();
        let history = match query.mode {
            QueryMode::Conversational => {
                recent_turns(&query.history, self.config.context.history_window)
            }
            _ => &[],
        };

        run.enter(QueryState::EmbeddingQuery);
        let search_text = contextualize_query(&query.text, history, history.len());
        let query_embedding = match self.embedder.embed_query(&search_text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                error!(error = %e, "query embedding failed");
                return RagAnswer::without_sources(
                    query_id,
                    AnswerOutcome::Degraded,
                    UNAVAILABLE_ANSWER,
                    format!("query embedding failed: {e}"),
                    run.finish(QueryState::Failed),
                );
            }
        };

        run.enter(QueryState::Retrieving);
        let filter =
            SearchFilter { domain_tags: query.domain_tags.clone(), document_id: query.document_id.clone() };
        let retrieved = match self.retrieve(query, &query_embedding, &filter, limits).await {
            Ok(retrieved) => retrieved,
            Err(e) => {
                error!(error = %e, "retrieval failed");
                return RagAnswer::without_sources(
                    query_id,
                    AnswerOutcome::Degraded,
                    UNAVAILABLE_ANSWER,
                    format!("retrieval failed: {e}"),
                    run.finish(QueryState::Failed),
                );
            }
        };
        if retrieved.is_empty() {
            info!(min_similarity = limits.min_similarity, "no relevant content");
            return RagAnswer::without_sources(
                query_id,
                AnswerOutcome::NoRelevantContent,
                NO_CONTENT_ANSWER,
                no_content_reason(query, limits.min_similarity),
                run.finish(QueryState::Done),
            );
        }

        run.enter(QueryState::Ranking);
        let mut ranked = match self
            .reranker
            .rerank(&query.text, &query_embedding, retrieved.clone())
            .await
        {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, "reranking failed, keeping retrieval order");
                retrieved
            }
        };
        // Rescored results are held to the same threshold as the store's.
        let before = ranked.len();
        ranked.retain(|r| r.similarity >= limits.min_similarity);
        if ranked.len() < before {
            debug!(dropped = before - ranked.len(), "rescored chunks fell below the threshold");
        }
        if ranked.is_empty() {
            info!(min_similarity = limits.min_similarity, "no relevant content after ranking");
            return RagAnswer::without_sources(
                query_id,
                AnswerOutcome::NoRelevantContent,
                NO_CONTENT_ANSWER,
                no_content_reason(query, limits.min_similarity),
                run.finish(QueryState::Done),
            );
        }

        run.enter(QueryState::Packing);
        let packed = self.packer.pack(&ranked);
        debug!(
            retrieved = ranked.len(),
            packed = packed.len(),
            tokens = ContextPacker::token_total(packed),
            "packed context"
        );
        if packed.is_empty() {
            return RagAnswer::without_sources(
                query_id,
                AnswerOutcome::NoRelevantContent,
                NO_CONTENT_ANSWER,
                format!(
                    "the best matching chunk exceeds the context budget of {} tokens",
                    self.packer.max_tokens()
                ),
                run.finish(QueryState::Done),
            );
        }

        run.enter(QueryState::Prompting);
        let prompt = grounding_prompt(&query.text, packed, history);

        run.enter(QueryState::Generating);
        let source_chunks: Vec<SourceChunk> = packed.iter().map(SourceChunk::from).collect();
        let suggested_followups = suggest_followups(&query.text, packed);
        let generator = self.generator.as_ref();
        let generated = retry_with_backoff(&self.config.retry, "generate", || {
            generator.generate(&prompt)
        })
        .await;

        let answer_text = match generated {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                error!(provider = generator.name(), error = %e, "generation failed");
                return RagAnswer {
                    query_id: query_id.to_string(),
                    answer_text: APOLOGY_ANSWER.to_string(),
                    confidence: 0.0,
                    quality: 0.0,
                    source_chunks,
                    suggested_followups,
                    diagram: None,
                    error_message: Some(format!("generation failed: {e}")),
                    outcome: AnswerOutcome::Degraded,
                    states: run.finish(QueryState::Done),
                };
            }
        };

        let diagram = match query.diagram {
            Some(diagram_type) => self.render_diagram(&answer_text, diagram_type).await,
            None => None,
        };

        let confidence = answer_confidence(packed.len(), &answer_text);
        let quality = answer_quality(confidence, packed);
        info!(result_count = packed.len(), confidence, quality, "query completed");

        RagAnswer {
            query_id: query_id.to_string(),
            answer_text,
            confidence,
            quality,
            source_chunks,
            suggested_followups,
            diagram,
            error_message: None,
            outcome: AnswerOutcome::Answered,
            states: run.finish(QueryState::Done),
        }
    }

    async fn retrieve(
        &self,
        query: &RagQuery,
        query_embedding: &[f32],
        filter: &SearchFilter,
        limits: Limits,
    ) -> Result<Vec<RetrievalResult>> {
        if let (QueryMode::DocumentScoped, Some(document_id)) = (query.mode, &query.document_id) {
            if self.chunk_store.get_chunks(document_id).await?.is_empty() {
                debug!(document.id = %document_id, "scoped document has no chunks");
                return Ok(Vec::new());
            }
        }
        self.retriever
            .retrieve(query_embedding, filter, limits.min_similarity, limits.max_chunks)
            .await
    }

    async fn render_diagram(&self, answer: &str, diagram_type: DiagramType) -> Option<Diagram> {
        let Some(diagrams) = self.diagrams.as_deref() else {
            warn!(%diagram_type, "diagram requested but no diagram provider is configured");
            return None;
        };
        retry_or_else(
            &self.config.retry,
            "render_diagram",
            move || async move {
                let code = diagrams.render(answer, diagram_type).await?;
                Ok(Some(Diagram { diagram_type, code }))
            },
            |e| {
                warn!(%diagram_type, error = %e, "diagram rendering failed, answering without it");
                None
            },
        )
        .await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding provider, both stores, and the generation provider are
/// required. The config defaults to [`RagConfig::default()`], the chunker to a
/// [`SectionChunker`] over the config's chunking settings, and the reranker to
/// [`CosineReranker`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .store(Arc::new(InMemoryVectorStore::new()))
///     .generation_provider(Arc::new(llm))
///     .diagram_provider(Arc::new(diagrams))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunk_store: Option<Arc<dyn ChunkStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    diagrams: Option<Arc<dyn DiagramProvider>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector search backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the chunk persistence backend.
    pub fn chunk_store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.chunk_store = Some(store);
        self
    }

    /// Use one backend for both chunk persistence and vector search.
    pub fn store<S>(mut self, store: Arc<S>) -> Self
    where
        S: VectorStore + ChunkStore + 'static,
    {
        self.vector_store = Some(store.clone());
        self.chunk_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Replace the default [`CosineReranker`].
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the answer generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(provider);
        self
    }

    /// Set an optional diagram provider for diagram-augmented queries.
    pub fn diagram_provider(mut self, provider: Arc<dyn DiagramProvider>) -> Self {
        self.diagrams = Some(provider);
        self
    }

    /// Build the [`RagPipeline`], validating the config and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or the
    /// config fails validation.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?;
        let chunk_store = self
            .chunk_store
            .ok_or_else(|| RagError::Config("chunk_store is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::Config("generation_provider is required".to_string()))?;

        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(SectionChunker::new(config.chunking.clone())?),
        };
        let embedder =
            EmbeddingAdapter::new(embedding_provider, &config.embedding, config.retry.clone());
        let retriever = Retriever::new(vector_store, config.retrieval.over_fetch_factor);
        let packer = ContextPacker::new(config.context.max_context_tokens);

        Ok(RagPipeline {
            embedder,
            chunk_store,
            retriever,
            chunker,
            reranker: self.reranker.unwrap_or_else(|| Arc::new(CosineReranker)),
            packer,
            generator,
            diagrams: self.diagrams,
            locks: DocumentLocks::new(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::chunk;

    fn result_with_confidence(confidence: f32) -> RetrievalResult {
        let mut c = chunk("d", 0, "text");
        c.confidence = confidence;
        RetrievalResult { chunk: c, similarity: 0.9 }
    }

    #[test]
    fn confidence_follows_source_count_and_length() {
        assert!((answer_confidence(0, "short") - 0.5).abs() < 1e-6);
        assert!((answer_confidence(2, "short") - 0.7).abs() < 1e-6);
        assert!((answer_confidence(5, "short") - 0.8).abs() < 1e-6);
        assert!((answer_confidence(5, &"x".repeat(101)) - 1.0).abs() < 1e-6);
        assert!((answer_confidence(1, &"x".repeat(100)) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn quality_averages_with_source_confidence() {
        let sources = vec![result_with_confidence(1.0), result_with_confidence(0.6)];
        assert!((answer_quality(0.8, &sources) - 0.8).abs() < 1e-6);
        assert!((answer_quality(0.7, &[]) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn answer_serializes_camel_case() {
        let answer = RagAnswer {
            query_id: "q".into(),
            answer_text: "Forty two.".into(),
            confidence: 0.6,
            quality: 0.7,
            source_chunks: vec![SourceChunk::from(&result_with_confidence(1.0))],
            suggested_followups: vec![],
            diagram: Some(Diagram { diagram_type: DiagramType::Mindmap, code: "mindmap".into() }),
            error_message: None,
            outcome: AnswerOutcome::Answered,
            states: vec![QueryState::Received, QueryState::Done],
        };
        let json = serde_json::to_value(&answer).unwrap();

        assert_eq!(json["answerText"], "Forty two.");
        assert_eq!(json["sourceChunks"][0]["chunkId"], "d_0");
        assert_eq!(json["sourceChunks"][0]["documentId"], "d");
        assert!(json["sourceChunks"][0].get("page").is_none());
        assert_eq!(json["diagram"]["type"], "mindmap");
        assert!(json.get("errorMessage").is_none());
        assert_eq!(json["states"][1], "DONE");
        assert_eq!(json["outcome"], "answered");
    }

    #[test]
    fn query_builder_sets_modes() {
        let scoped = RagQuery::new("q").with_document("doc-1");
        assert_eq!(scoped.mode, QueryMode::DocumentScoped);
        assert_eq!(scoped.document_id.as_deref(), Some("doc-1"));

        let chat = RagQuery::new("q").with_history(vec![ConversationTurn::user("hi")]);
        assert_eq!(chat.mode, QueryMode::Conversational);
    }

    #[test]
    fn query_state_display_matches_serde() {
        for state in [QueryState::EmbeddingQuery, QueryState::Done, QueryState::Failed] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
