//! Embedding provider trait and the fault-tolerant [`EmbeddingAdapter`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::BoundedCache;
use crate::config::EmbeddingConfig;
use crate::document::Chunk;
use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::similarity::is_zero_vector;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short name used in logs and errors.
    fn name(&self) -> &str {
        "embedding"
    }
}

/// An embedding vector together with whether it is a degraded placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedded {
    pub vector: Vec<f32>,
    /// `true` when every attempt failed and `vector` is all zeros.
    pub degraded: bool,
}

impl Embedded {
    fn real(vector: Vec<f32>) -> Self {
        Self { vector, degraded: false }
    }

    fn zero(dimensions: usize) -> Self {
        Self { vector: vec![0.0; dimensions], degraded: true }
    }
}

fn check_dimensions(provider: &str, vector: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if vector.len() != expected {
        return Err(RagError::provider(
            provider,
            format!("expected {expected}-dimensional embedding, got {}", vector.len()),
        ));
    }
    Ok(vector)
}

/// Wraps an [`EmbeddingProvider`] with retries, batch-to-single fallback,
/// zero-vector degradation, and a bounded query-embedding cache.
///
/// Ingestion never fails because of embeddings: a text whose embedding
/// cannot be produced receives a zero vector of length `D` marked degraded.
/// Zero vectors score `0.0` against every query and are never cached.
pub struct EmbeddingAdapter {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    batch_size: usize,
    retry: RetryPolicy,
    query_cache: Mutex<BoundedCache<String, Vec<f32>>>,
}

impl EmbeddingAdapter {
    /// Create an adapter for `provider` with the given sizing and retry policy.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig, retry: RetryPolicy) -> Self {
        if provider.dimensions() != config.dimensions {
            warn!(
                provider = provider.name(),
                provider_dimensions = provider.dimensions(),
                configured_dimensions = config.dimensions,
                "embedding provider dimensions differ from configuration"
            );
        }
        Self {
            provider,
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            retry,
            query_cache: Mutex::new(BoundedCache::new(config.query_cache_capacity)),
        }
    }

    /// The expected embedding dimension `D`.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    async fn try_embed(&self, text: &str) -> Result<Vec<f32>> {
        let provider = self.provider.as_ref();
        let dimensions = self.dimensions;
        retry_with_backoff(&self.retry, "embed", move || async move {
            let vector = provider.embed(text).await?;
            check_dimensions(provider.name(), vector, dimensions)
        })
        .await
    }

    /// Embed a single text, degrading to a zero vector if every attempt fails.
    pub async fn embed_one(&self, text: &str) -> Embedded {
        match self.try_embed(text).await {
            Ok(vector) => Embedded::real(vector),
            Err(e) => {
                warn!(
                    provider = self.provider.name(),
                    text_len = text.len(),
                    error = %e,
                    "embedding failed, using zero vector"
                );
                Embedded::zero(self.dimensions)
            }
        }
    }

    /// Embed texts with one provider batch call, falling back to
    /// [`embed_one`](Self::embed_one) per text if the batch fails.
    ///
    /// The result always has the same length and order as `texts`.
    pub async fn embed_batch(&self, texts: &[&str]) -> Vec<Embedded> {
        if texts.is_empty() {
            return Vec::new();
        }

        let provider = self.provider.as_ref();
        let dimensions = self.dimensions;
        let batch = retry_with_backoff(&self.retry, "embed_batch", move || async move {
            let vectors = provider.embed_batch(texts).await?;
            if vectors.len() != texts.len() {
                return Err(RagError::provider(
                    provider.name(),
                    format!("returned {} embeddings for {} inputs", vectors.len(), texts.len()),
                ));
            }
            vectors
                .into_iter()
                .map(|v| check_dimensions(provider.name(), v, dimensions))
                .collect::<Result<Vec<_>>>()
        })
        .await;

        match batch {
            Ok(vectors) => vectors.into_iter().map(Embedded::real).collect(),
            Err(e) => {
                warn!(
                    provider = provider.name(),
                    batch_size = texts.len(),
                    error = %e,
                    "batch embedding failed, falling back to single embeddings"
                );
                let mut results = Vec::with_capacity(texts.len());
                for text in texts {
                    results.push(self.embed_one(text).await);
                }
                results
            }
        }
    }

    /// Attach embeddings to `chunks` in batches of the configured size.
    ///
    /// Returns the number of chunks that received a degraded embedding.
    pub async fn embed_chunks(&self, chunks: &mut [Chunk]) -> usize {
        let mut degraded = 0;
        for batch in chunks.chunks_mut(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embed_batch(&texts).await;
            for (chunk, embedded) in batch.iter_mut().zip(embeddings) {
                degraded += usize::from(embedded.degraded);
                chunk.embedding = embedded.vector;
                chunk.embedding_degraded = embedded.degraded;
            }
        }
        debug!(chunk_count = chunks.len(), degraded, "embedded chunks");
        degraded
    }

    /// Embed a query, consulting and filling the bounded query cache.
    ///
    /// # Errors
    ///
    /// Returns the provider error once retries are exhausted, so the caller
    /// can distinguish a degraded system from an absence of relevant content.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.query_cache.lock().await.get(&text.to_string()) {
            debug!(text_len = text.len(), "query embedding cache hit");
            return Ok(vector);
        }

        let vector = self.try_embed(text).await?;
        if !is_zero_vector(&vector) {
            self.query_cache.lock().await.insert(text.to_string(), vector.clone());
        }
        Ok(vector)
    }
}
