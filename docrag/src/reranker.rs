//! Reranker trait for re-scoring retrieved chunks.

use async_trait::async_trait;

use crate::document::RetrievalResult;
use crate::error::Result;
use crate::inmemory::rank_order;
use crate::similarity::cosine;

/// A reranker that re-scores and reorders retrieval results.
///
/// Implementations can use cross-encoder models, LLM-based scoring, or
/// other strategies to improve precision beyond the store's ranking.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank results given the original query and its embedding.
    ///
    /// Returns results in a new order with potentially updated scores.
    async fn rerank(
        &self,
        query: &str,
        query_embedding: &[f32],
        results: Vec<RetrievalResult>,
    ) -> Result<Vec<RetrievalResult>>;
}

/// Recomputes exact cosine similarity against the query embedding and
/// sorts by it, guarding against stale or approximate store scores.
///
/// This is the pipeline's default reranker.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineReranker;

#[async_trait]
impl Reranker for CosineReranker {
    async fn rerank(
        &self,
        _query: &str,
        query_embedding: &[f32],
        mut results: Vec<RetrievalResult>,
    ) -> Result<Vec<RetrievalResult>> {
        for result in &mut results {
            result.similarity = cosine(&result.chunk.embedding, query_embedding);
        }
        results.sort_by(rank_order);
        Ok(results)
    }
}

/// A no-op reranker that returns results unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(
        &self,
        _query: &str,
        _query_embedding: &[f32],
        results: Vec<RetrievalResult>,
    ) -> Result<Vec<RetrievalResult>> {
        Ok(results)
    }
}
