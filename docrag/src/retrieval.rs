//! Top-K retrieval on top of a [`VectorStore`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error};

use crate::document::{RetrievalResult, SearchFilter};
use crate::error::{RagError, Result};
use crate::inmemory::rank_order;
use crate::vectorstore::VectorStore;

/// Queries a [`VectorStore`] and turns its candidates into a ranked,
/// filtered, deduplicated result list.
///
/// The store is asked for `over_fetch_factor * k` candidates so that local
/// filtering and deduplication still leave up to `k` results. The document
/// and tag filters are re-applied locally, so scoping holds even against
/// stores that ignore part of the [`SearchFilter`].
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    over_fetch_factor: usize,
}

impl Retriever {
    /// Create a retriever over `store`.
    pub fn new(store: Arc<dyn VectorStore>, over_fetch_factor: usize) -> Self {
        Self { store, over_fetch_factor: over_fetch_factor.max(1) }
    }

    /// Retrieve up to `k` chunks with similarity of at least `min_similarity`.
    ///
    /// Results are ordered by descending similarity, ties going to the more
    /// recently created chunk. Chunks with degraded embeddings are excluded.
    /// An empty list is a valid outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStore`] if the store query fails.
    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        filter: &SearchFilter,
        min_similarity: f32,
        k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let fetch = k.saturating_mul(self.over_fetch_factor);
        let mut candidates =
            self.store.search(query_embedding, filter, fetch).await.map_err(|e| {
                error!(backend = self.store.name(), error = %e, "vector store search failed");
                match e {
                    RagError::VectorStore { .. } => e,
                    other => RagError::VectorStore {
                        backend: self.store.name().to_string(),
                        message: other.to_string(),
                    },
                }
            })?;
        let fetched = candidates.len();

        candidates.retain(|r| {
            !r.chunk.embedding_degraded
                && filter.matches(&r.chunk)
                && r.similarity >= min_similarity
        });
        candidates.sort_by(rank_order);

        let mut seen_ids = HashSet::new();
        let mut seen_texts = HashSet::new();
        let mut results = Vec::with_capacity(k.min(candidates.len()));
        for candidate in candidates {
            if results.len() == k {
                break;
            }
            if !seen_ids.insert(candidate.chunk.id.clone())
                || !seen_texts.insert(candidate.chunk.text.clone())
            {
                continue;
            }
            results.push(candidate);
        }

        debug!(fetched, returned = results.len(), k, min_similarity, "retrieved chunks");
        Ok(results)
    }
}
