//! In-memory chunk and vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small-scale use cases.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, RetrievalResult, SearchFilter};
use crate::error::Result;
use crate::similarity::cosine;
use crate::vectorstore::{ChunkStore, VectorStore};

/// An in-memory store implementing both [`ChunkStore`] and [`VectorStore`].
///
/// Chunks are grouped by document ID and kept sorted by chunk index.
/// Searches are brute-force over every chunk matching the filter.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    documents: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored chunks across all documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.values().map(Vec::len).sum()
    }

    /// Whether the store holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Order by descending similarity, breaking ties in favour of fresher chunks.
pub(crate) fn rank_order(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.chunk.created_at.cmp(&a.chunk.created_at))
}

#[async_trait]
impl ChunkStore for InMemoryVectorStore {
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let documents = self.documents.read().await;
        Ok(documents.get(document_id).cloned().unwrap_or_default())
    }

    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut documents = self.documents.write().await;
        for chunk in chunks {
            let stored = documents.entry(chunk.document_id.clone()).or_default();
            match stored.iter_mut().find(|c| c.id == chunk.id) {
                Some(existing) => *existing = chunk.clone(),
                None => stored.push(chunk.clone()),
            }
        }
        for stored in documents.values_mut() {
            stored.sort_by_key(|c| c.index);
        }
        Ok(())
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<usize> {
        let mut documents = self.documents.write().await;
        Ok(documents.remove(document_id).map_or(0, |chunks| chunks.len()))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let documents = self.documents.read().await;
        let candidates: Box<dyn Iterator<Item = &Chunk> + '_> = match &filter.document_id {
            Some(id) => Box::new(documents.get(id).into_iter().flatten()),
            None => Box::new(documents.values().flatten()),
        };

        let mut scored: Vec<RetrievalResult> = candidates
            .filter(|chunk| chunk.has_embedding() && filter.matches(chunk))
            .map(|chunk| RetrievalResult {
                similarity: cosine(&chunk.embedding, embedding),
                chunk: chunk.clone(),
            })
            .collect();

        scored.sort_by(rank_order);
        scored.truncate(limit);
        Ok(scored)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
