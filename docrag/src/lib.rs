//! # docrag
//!
//! Retrieval-Augmented Generation over ingested text documents.
//!
//! ## Overview
//!
//! This crate provides:
//! - Section-aware chunking with overlap and a per-chunk quality gate
//! - Fault-tolerant embedding with batch fallback and degraded zero vectors
//! - Cosine top-K retrieval with document and tag scoping
//! - Token-budgeted context packing
//! - A query state machine that grounds generated answers in retrieved
//!   chunks and always returns a structured [`RagAnswer`]
//! - A bounded background [`IngestionPool`] with per-document write locks
//!
//! Storage, embedding, generation, and diagram rendering are consumed through
//! the [`ChunkStore`], [`VectorStore`], [`EmbeddingProvider`],
//! [`GenerationProvider`], and [`DiagramProvider`] traits.
//! [`InMemoryVectorStore`] covers development and tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docrag::{InMemoryVectorStore, RagConfig, RagPipeline, RagQuery};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::load(None)?)
//!     .embedding_provider(Arc::new(my_embedder))
//!     .store(Arc::new(InMemoryVectorStore::new()))
//!     .generation_provider(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.ingest_text("handbook", &handbook_text).await?;
//! let answer = pipeline.query(&RagQuery::new("How many vacation days do I get?")).await?;
//! println!("{}", answer.answer_text);
//! ```
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | OpenAI-compatible embedding and chat providers over `reqwest` |
//! | `full` | Every optional provider |

pub mod cache;
pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod inmemory;
pub mod pipeline;
pub mod prompt;
pub mod reranker;
pub mod retrieval;
pub mod retry;
pub mod similarity;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

pub use cache::BoundedCache;
pub use chunking::{Chunker, SectionChunker, normalize_text};
pub use config::{
    ChunkingConfig, ContextConfig, EmbeddingConfig, IngestionConfig, RagConfig, RagConfigBuilder,
    RetrievalConfig,
};
pub use context::ContextPacker;
pub use document::{Chunk, Document, DocumentStatus, RetrievalResult, SearchFilter};
pub use embedding::{Embedded, EmbeddingAdapter, EmbeddingProvider};
pub use error::{RagError, Result};
pub use generation::{DiagramProvider, DiagramType, GeneratedDiagramProvider, GenerationProvider};
pub use ingest::{DocumentGuard, DocumentLocks, IngestReport, IngestTicket, IngestionPool};
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{
    AnswerOutcome, Diagram, QueryMode, QueryState, RagAnswer, RagPipeline, RagPipelineBuilder,
    RagQuery, SourceChunk,
};
pub use prompt::{ConversationTurn, TurnRole};
pub use reranker::{CosineReranker, NoOpReranker, Reranker};
pub use retrieval::Retriever;
pub use retry::{RetryPolicy, retry_or_else, retry_with_backoff};
pub use similarity::cosine;
pub use vectorstore::{ChunkStore, VectorStore};
