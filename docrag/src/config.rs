//! Configuration for the RAG pipeline.
//!
//! [`RagConfig`] groups the tunables of every pipeline stage. It can be built
//! in code through [`RagConfig::builder()`] or loaded from a TOML file and
//! `DOCRAG_`-prefixed environment variables with [`RagConfig::load`].

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// Chunk sizing parameters, in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub max_chunk_size: usize,
    /// Number of trailing characters of a chunk repeated at the start of the next.
    pub overlap_size: usize,
    /// Chunks shorter than this are merged forward or flagged low-confidence.
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chunk_size: 1000, overlap_size: 200, min_chunk_size: 100 }
    }
}

impl ChunkingConfig {
    /// Check that the sizes describe a chunking that always makes progress.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `max_chunk_size == 0`,
    /// `overlap_size >= max_chunk_size`, or `min_chunk_size > max_chunk_size`.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(RagError::Config("max_chunk_size must be greater than zero".to_string()));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(RagError::Config(format!(
                "overlap_size ({}) must be less than max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(RagError::Config(format!(
                "min_chunk_size ({}) must not exceed max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

/// Retrieval defaults applied when a query does not override them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks returned when the query does not specify `max_chunks`.
    pub default_max_chunks: usize,
    /// Minimum cosine similarity when the query does not specify one.
    pub default_min_similarity: f32,
    /// Candidates requested from the store per returned chunk.
    pub over_fetch_factor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_max_chunks: 5, default_min_similarity: 0.5, over_fetch_factor: 2 }
    }
}

/// Context window and prompt assembly parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Token budget for the packed context handed to the generator.
    pub max_context_tokens: usize,
    /// Number of most recent conversation turns folded into conversational queries.
    pub history_window: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_context_tokens: 3000, history_window: 3 }
    }
}

/// Embedding adapter parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Expected vector dimension `D`.
    pub dimensions: usize,
    /// Number of texts per provider batch during ingestion.
    pub batch_size: usize,
    /// Maximum number of memoised query embeddings. `0` disables the cache.
    pub query_cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimensions: 384, batch_size: 32, query_cache_capacity: 1024 }
    }
}

/// Background ingestion pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionConfig {
    /// Number of concurrent ingestion workers.
    pub workers: usize,
    /// Jobs accepted while all workers are busy; further submissions are rejected.
    pub queue_capacity: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self { workers: 4, queue_capacity: 64 }
    }
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub embedding: EmbeddingConfig,
    pub retry: RetryPolicy,
    pub ingestion: IngestionConfig,
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Load configuration from defaults, an optional TOML file, and the
    /// environment, in increasing order of precedence.
    ///
    /// Environment variables use the `DOCRAG_` prefix and `__` for nesting,
    /// e.g. `DOCRAG_CHUNKING__MAX_CHUNK_SIZE=800`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a source cannot be parsed or the merged
    /// configuration fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(RagConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: RagConfig = figment
            .merge(Env::prefixed("DOCRAG_").split("__"))
            .extract()
            .map_err(|e| RagError::Config(format!("failed to load configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that parameters are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `max_chunk_size == 0` or `overlap_size >= max_chunk_size`
    /// - `min_chunk_size > max_chunk_size`
    /// - `default_max_chunks` is outside `1..=20`
    /// - `default_min_similarity` is outside `[0, 1]`
    /// - `dimensions`, `batch_size`, `over_fetch_factor`, or `workers` is zero
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if !(1..=20).contains(&self.retrieval.default_max_chunks) {
            return Err(RagError::Config("default_max_chunks must be within 1..=20".to_string()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.default_min_similarity) {
            return Err(RagError::Config(
                "default_min_similarity must be within [0, 1]".to_string(),
            ));
        }
        if self.retrieval.over_fetch_factor == 0 {
            return Err(RagError::Config("over_fetch_factor must be greater than zero".to_string()));
        }
        if self.embedding.dimensions == 0 || self.embedding.batch_size == 0 {
            return Err(RagError::Config(
                "embedding dimensions and batch_size must be greater than zero".to_string(),
            ));
        }
        if self.ingestion.workers == 0 {
            return Err(RagError::Config("ingestion workers must be greater than zero".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::Config("retry max_attempts must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.config.chunking.max_chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn overlap_size(mut self, overlap: usize) -> Self {
        self.config.chunking.overlap_size = overlap;
        self
    }

    /// Set the minimum chunk size in characters.
    pub fn min_chunk_size(mut self, size: usize) -> Self {
        self.config.chunking.min_chunk_size = size;
        self
    }

    /// Set the default number of chunks returned per query.
    pub fn default_max_chunks(mut self, k: usize) -> Self {
        self.config.retrieval.default_max_chunks = k;
        self
    }

    /// Set the default minimum similarity threshold.
    pub fn default_min_similarity(mut self, threshold: f32) -> Self {
        self.config.retrieval.default_min_similarity = threshold;
        self
    }

    /// Set the token budget of the packed context.
    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.config.context.max_context_tokens = tokens;
        self
    }

    /// Set how many prior turns conversational queries fold in.
    pub fn history_window(mut self, turns: usize) -> Self {
        self.config.context.history_window = turns;
        self
    }

    /// Set the embedding dimension `D`.
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.config.embedding.dimensions = dimensions;
        self
    }

    /// Set the ingestion embedding batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.embedding.batch_size = size;
        self
    }

    /// Set the query embedding cache capacity.
    pub fn query_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.embedding.query_cache_capacity = capacity;
        self
    }

    /// Set the provider retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set the ingestion worker count and queue capacity.
    pub fn ingestion(mut self, workers: usize, queue_capacity: usize) -> Self {
        self.config.ingestion = IngestionConfig { workers, queue_capacity };
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] under the conditions listed on
    /// [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
