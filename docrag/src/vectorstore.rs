//! Storage traits for chunks and vector similarity search.

use async_trait::async_trait;

use crate::document::{Chunk, RetrievalResult, SearchFilter};
use crate::error::Result;

/// Document-owned chunk persistence.
///
/// A document owns its chunk list: reprocessing deletes every chunk of the
/// document and saves the new list.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// All chunks of a document, ordered by ascending chunk index.
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Insert or replace chunks by ID. Chunks should have embeddings set.
    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Delete every chunk of a document, returning how many were removed.
    async fn delete_chunks(&self, document_id: &str) -> Result<usize>;
}

/// A storage backend capable of top-K similarity queries.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{InMemoryVectorStore, SearchFilter, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// let results = store.search(&query_embedding, &SearchFilter::default(), 10).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Search for the `limit` chunks most similar to `embedding`.
    ///
    /// Returns results ordered by descending similarity. Backends that cannot
    /// evaluate every field of `filter` may return extra candidates; the
    /// [`Retriever`](crate::Retriever) post-filters locally.
    async fn search(
        &self,
        embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>>;

    /// Backend name used in logs and errors.
    fn name(&self) -> &str {
        "vector-store"
    }
}
