//! Document lifecycle and background ingestion tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{
    ANSWER, HANDBOOK, HashEmbedder, RECIPES, ReadOnlyStore, ScriptedGenerator, pipeline_with,
    test_config,
};
use docrag::{
    Document, DocumentStatus, EmbeddingProvider, InMemoryVectorStore, IngestionPool, RagError,
    RagPipeline, RagQuery, Result, VectorStore,
};
use tokio::sync::Semaphore;

fn scripted() -> Arc<ScriptedGenerator> {
    Arc::new(ScriptedGenerator::answering(ANSWER))
}

#[tokio::test]
async fn ingest_completes_document_and_stores_chunks() {
    let (pipeline, store) = pipeline_with(Arc::new(HashEmbedder::new()), scripted());
    let mut doc = Document::new("handbook", HANDBOOK).with_tags(["hr"]);

    let count = pipeline.ingest(&mut doc).await.unwrap();

    assert_eq!(doc.status(), DocumentStatus::Completed);
    assert_eq!(count, 2);
    let chunks = pipeline.document_chunks("handbook").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.embedding.len() == common::DIMENSIONS));
    assert!(chunks.iter().all(|c| !c.embedding_degraded && c.domain_tags.contains("hr")));
    assert_eq!(chunks[0].section_title.as_deref(), Some("VACATION POLICY"));
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn reingesting_replaces_previous_chunks() {
    let (pipeline, store) = pipeline_with(Arc::new(HashEmbedder::new()), scripted());
    let mut doc = Document::new("handbook", HANDBOOK);
    pipeline.ingest(&mut doc).await.unwrap();

    let mut revised = Document::new("handbook", "ONLY SECTION\nA single short replacement policy.");
    let count = pipeline.ingest(&mut revised).await.unwrap();

    assert_eq!(count, 1);
    let chunks = pipeline.document_chunks("handbook").await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.contains("replacement"));
    assert_eq!(store.len().await, 1);

    // A finished document may be processed again.
    pipeline.ingest(&mut doc).await.unwrap();
    assert_eq!(pipeline.document_chunks("handbook").await.unwrap().len(), 2);
}

#[tokio::test]
async fn embedding_failure_degrades_chunk_but_completes_document() {
    let embedder = Arc::new(HashEmbedder::failing_on("flour"));
    let (pipeline, _) = pipeline_with(embedder, scripted());
    let mut doc = Document::new("recipes", RECIPES);

    pipeline.ingest(&mut doc).await.unwrap();

    assert_eq!(doc.status(), DocumentStatus::Completed);
    let chunks = pipeline.document_chunks("recipes").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].embedding_degraded);
    assert!(chunks[0].embedding.iter().all(|x| *x == 0.0));
    assert!(!chunks[1].embedding_degraded);

    let answer = pipeline
        .query(&RagQuery::new("How long should soup simmer?").with_document("recipes").with_min_similarity(0.0))
        .await
        .unwrap();
    assert!(!answer.source_chunks.is_empty());
    assert!(answer.source_chunks.iter().all(|s| s.chunk_id != "recipes_0"));
}

#[tokio::test]
async fn store_failure_marks_document_failed() {
    let store = Arc::new(ReadOnlyStore::default());
    let pipeline = RagPipeline::builder()
        .config(test_config())
        .embedding_provider(Arc::new(HashEmbedder::new()))
        .store(store)
        .generation_provider(scripted())
        .build()
        .unwrap();
    let mut doc = Document::new("handbook", HANDBOOK);

    let err = pipeline.ingest(&mut doc).await.unwrap_err();

    assert!(matches!(err, RagError::VectorStore { .. }));
    assert_eq!(doc.status(), DocumentStatus::Failed);
    assert!(doc.failure_reason().unwrap().contains("read-only"));

    // A failed document may be processed again.
    let _ = pipeline.ingest(&mut doc).await;
    assert_eq!(doc.status(), DocumentStatus::Failed);
}

#[tokio::test]
async fn document_already_processing_is_rejected() {
    let (pipeline, store) = pipeline_with(Arc::new(HashEmbedder::new()), scripted());
    let mut doc = Document::new("handbook", HANDBOOK);
    doc.start_processing().unwrap();

    let err = pipeline.ingest(&mut doc).await.unwrap_err();

    assert!(matches!(err, RagError::Conflict(_)));
    assert_eq!(doc.status(), DocumentStatus::Processing);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn empty_document_completes_with_no_chunks() {
    let (pipeline, _) = pipeline_with(Arc::new(HashEmbedder::new()), scripted());
    let mut doc = Document::new("blank", "  \n\n ");

    assert_eq!(pipeline.ingest(&mut doc).await.unwrap(), 0);
    assert_eq!(doc.status(), DocumentStatus::Completed);
}

#[tokio::test]
async fn delete_document_removes_chunks() {
    let (pipeline, store) = pipeline_with(Arc::new(HashEmbedder::new()), scripted());
    pipeline.ingest_text("handbook", HANDBOOK).await.unwrap();
    pipeline.ingest_text("recipes", RECIPES).await.unwrap();

    assert_eq!(pipeline.delete_document("handbook").await.unwrap(), 2);
    assert!(pipeline.document_chunks("handbook").await.unwrap().is_empty());
    assert_eq!(store.len().await, 2);

    let err = pipeline.delete_document("handbook").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound { .. }));
}

#[tokio::test]
async fn concurrent_ingests_of_one_document_do_not_duplicate_chunks() {
    let (pipeline, store) = pipeline_with(Arc::new(HashEmbedder::new()), scripted());
    let pipeline = Arc::new(pipeline);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.ingest_text("handbook", HANDBOOK).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 2);
    }

    assert_eq!(store.len().await, 2);
}

/// Embedder that blocks every call until permits are added to its gate.
struct GatedEmbedder {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _permit = self.gate.acquire().await.map_err(|e| RagError::provider("gated", e.to_string()))?;
        Ok(HashEmbedder::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let _permit = self.gate.acquire().await.map_err(|e| RagError::provider("gated", e.to_string()))?;
        Ok(texts.iter().map(|t| HashEmbedder::vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        common::DIMENSIONS
    }

    fn name(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn full_queue_rejects_with_backpressure() {
    let gate = Arc::new(Semaphore::new(0));
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = RagPipeline::builder()
        .config(test_config())
        .embedding_provider(Arc::new(GatedEmbedder { gate: gate.clone() }))
        .store(store.clone())
        .generation_provider(scripted())
        .build()
        .unwrap();
    let config = docrag::IngestionConfig { workers: 1, queue_capacity: 1 };
    let pool = IngestionPool::new(Arc::new(pipeline), &config);

    let first = pool.submit(Document::new("one", HANDBOOK)).unwrap();
    // Let the worker take the first job and block on the gate.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = pool.submit(Document::new("two", RECIPES)).unwrap();

    let err = pool.submit(Document::new("three", HANDBOOK)).unwrap_err();
    assert!(matches!(err, RagError::Backpressure { capacity: 1 }));

    gate.add_permits(1_000);
    assert_eq!(first.wait().await.unwrap(), 2);
    let report = second.report().await.unwrap();
    assert_eq!(report.document.status(), DocumentStatus::Completed);
    assert_eq!(report.result.unwrap(), 2);
    pool.shutdown().await;

    assert_eq!(store.len().await, 4);
    assert_eq!(store.name(), "in-memory");
}

#[tokio::test]
async fn pool_reports_failed_documents() {
    let pipeline = RagPipeline::builder()
        .config(test_config())
        .embedding_provider(Arc::new(HashEmbedder::new()))
        .store(Arc::new(ReadOnlyStore::default()))
        .generation_provider(scripted())
        .build()
        .unwrap();
    let pool = IngestionPool::new(Arc::new(pipeline), &docrag::IngestionConfig::default());

    let report = pool.submit(Document::new("handbook", HANDBOOK)).unwrap().report().await.unwrap();

    assert!(report.result.is_err());
    assert_eq!(report.document.status(), DocumentStatus::Failed);
    assert!(report.document.failure_reason().is_some());
    pool.shutdown().await;
}

#[tokio::test]
async fn pool_drains_queue_on_shutdown() {
    let (pipeline, store) = pipeline_with(Arc::new(HashEmbedder::new()), scripted());
    let pool = IngestionPool::new(Arc::new(pipeline), &docrag::IngestionConfig { workers: 2, queue_capacity: 8 });

    let tickets: Vec<_> = (0..4)
        .map(|i| pool.submit(Document::new(format!("doc-{i}"), RECIPES)).unwrap())
        .collect();
    pool.shutdown().await;

    for ticket in tickets {
        assert_eq!(ticket.wait().await.unwrap(), 2);
    }
    assert_eq!(store.len().await, 8);
}
