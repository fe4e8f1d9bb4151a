//! Property tests for in-memory store search ordering and filtering.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::Utc;
use docrag::document::{Chunk, SearchFilter};
use docrag::inmemory::InMemoryVectorStore;
use docrag::vectorstore::{ChunkStore, VectorStore};
use proptest::prelude::*;

const DIM: usize = 16;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

fn make_chunk(document_id: &str, index: usize, embedding: Vec<f32>, tags: &[&str]) -> Chunk {
    let text = format!("chunk {index} of {document_id}");
    Chunk {
        id: format!("{document_id}_{index}"),
        document_id: document_id.to_string(),
        index,
        start: 0,
        end: text.len(),
        token_count: text.len() / 4,
        text,
        embedding,
        embedding_degraded: false,
        confidence: 1.0,
        section_title: None,
        page: None,
        content_type: None,
        domain_tags: tags.iter().map(|t| t.to_string()).collect(),
        metadata: HashMap::new(),
        created_at: Utc::now(),
    }
}

/// Chunks spread over three documents, alternating between two tags.
fn arb_chunks() -> impl Strategy<Value = Vec<Chunk>> {
    proptest::collection::vec((0usize..3, arb_normalized_embedding(DIM)), 1..24).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (doc, embedding))| {
                let tag = if i % 2 == 0 { "hr" } else { "kitchen" };
                make_chunk(&format!("doc_{doc}"), i, embedding, &[tag])
            })
            .collect()
    })
}

/// **Property 1: In-memory store search ordering**
/// *For any* set of stored chunks, searching with a query embedding returns
/// results ordered by descending cosine similarity, and at most `limit` of them.
mod prop_inmemory_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_limit(
            chunks in arb_chunks(),
            query in arb_normalized_embedding(DIM),
            limit in 1usize..30,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.save_chunks(&chunks).await.unwrap();
                store.search(&query, &SearchFilter::default(), limit).await.unwrap()
            });

            prop_assert!(results.len() <= limit);
            prop_assert_eq!(results.len(), chunks.len().min(limit));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].similarity >= window[1].similarity,
                    "results not in descending order: {} < {}",
                    window[0].similarity,
                    window[1].similarity,
                );
            }
        }
    }
}

/// **Property 2: Search filters are never violated**
/// *For any* document or tag filter, every returned chunk satisfies it, and
/// every matching chunk is returned when the limit allows.
mod prop_inmemory_search_filters {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn document_filter_returns_only_that_document(
            chunks in arb_chunks(),
            query in arb_normalized_embedding(DIM),
            doc in 0usize..3,
        ) {
            let document_id = format!("doc_{doc}");
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.save_chunks(&chunks).await.unwrap();
                store.search(&query, &SearchFilter::for_document(&document_id), 100).await.unwrap()
            });

            let expected = chunks.iter().filter(|c| c.document_id == document_id).count();
            prop_assert_eq!(results.len(), expected);
            prop_assert!(results.iter().all(|r| r.chunk.document_id == document_id));
        }

        #[test]
        fn tag_filter_requires_a_shared_tag(
            chunks in arb_chunks(),
            query in arb_normalized_embedding(DIM),
        ) {
            let filter = SearchFilter {
                domain_tags: BTreeSet::from(["kitchen".to_string()]),
                document_id: None,
            };
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.save_chunks(&chunks).await.unwrap();
                store.search(&query, &filter, 100).await.unwrap()
            });

            let expected: HashSet<&str> = chunks
                .iter()
                .filter(|c| c.domain_tags.contains("kitchen"))
                .map(|c| c.id.as_str())
                .collect();
            let returned: HashSet<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
            prop_assert_eq!(returned, expected);
        }
    }
}

#[tokio::test]
async fn saving_a_chunk_id_twice_replaces_it() {
    let store = InMemoryVectorStore::new();
    let mut chunk = make_chunk("doc", 0, vec![1.0, 0.0], &[]);
    store.save_chunks(std::slice::from_ref(&chunk)).await.unwrap();
    chunk.text = "revised".to_string();
    store.save_chunks(&[chunk]).await.unwrap();

    let stored = store.get_chunks("doc").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "revised");
}

#[tokio::test]
async fn chunks_without_embeddings_are_not_searchable() {
    let store = InMemoryVectorStore::new();
    store
        .save_chunks(&[make_chunk("doc", 0, Vec::new(), &[]), make_chunk("doc", 1, vec![1.0, 0.0], &[])])
        .await
        .unwrap();

    let results = store.search(&[1.0, 0.0], &SearchFilter::default(), 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.index, 1);
    assert_eq!(store.len().await, 2);
}
