//! Deterministic mock providers shared by the integration tests.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docrag::{
    Chunk, ChunkStore, EmbeddingProvider, GenerationProvider, InMemoryVectorStore, RagConfig,
    RagError, RagPipeline, Result, RetrievalResult, RetryPolicy, SearchFilter, VectorStore,
};

pub const DIMENSIONS: usize = 256;

pub const HANDBOOK: &str = "VACATION POLICY\n\
Employees receive twenty vacation days per year. Vacation days must be approved by a manager \
before they are taken.\n\n\
REMOTE WORK\n\
Staff may work remotely up to three days per week. Remote work requires a stable internet \
connection and a quiet workspace.";

pub const RECIPES: &str = "BREAD\n\
Mix flour, water, salt and yeast. Knead the dough for ten minutes and let it rise for an hour.\n\n\
SOUP\n\
Simmer onions, carrots and celery in stock for thirty minutes.";

pub const ANSWER: &str = "Employees receive twenty vacation days per year [1].";

/// Bag-of-words embedder: each lowercase word adds weight to one hashed
/// bucket, and the vector is L2-normalised. Fails any call whose input
/// contains `fail_on`.
pub struct HashEmbedder {
    fail_on: Option<String>,
    seen: Mutex<Vec<String>>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self { fail_on: None, seen: Mutex::new(Vec::new()) }
    }

    pub fn failing_on(word: &str) -> Self {
        Self { fail_on: Some(word.to_string()), seen: Mutex::new(Vec::new()) }
    }

    /// Every text passed to `embed`, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            v[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    fn check(&self, text: &str) -> Result<()> {
        match &self.fail_on {
            Some(word) if text.contains(word.as_str()) => {
                Err(RagError::provider("hash", format!("refusing to embed '{word}'")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.seen.lock().unwrap().push(text.to_string());
        self.check(text)?;
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            self.check(text)?;
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Generator replying with a fixed answer, or failing every call.
///
/// Prompts asking for Mermaid source get a fenced flowchart.
pub struct ScriptedGenerator {
    answer: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn answering(answer: &str) -> Self {
        Self { answer: Some(answer.to_string()), calls: AtomicUsize::new(0), prompts: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { answer: None, calls: AtomicUsize::new(0), prompts: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.answer {
            Some(_) if prompt.contains("Mermaid") => {
                Ok("Here it is:\n```mermaid\nflowchart TD\n  A[Request] --> B[Approve]\n```".to_string())
            }
            Some(answer) => Ok(answer.clone()),
            None => Err(RagError::provider("scripted", "model overloaded")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A store whose writes always fail.
#[derive(Default)]
pub struct ReadOnlyStore {
    inner: InMemoryVectorStore,
}

#[async_trait]
impl ChunkStore for ReadOnlyStore {
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.inner.get_chunks(document_id).await
    }

    async fn save_chunks(&self, _chunks: &[Chunk]) -> Result<()> {
        Err(RagError::VectorStore { backend: "read-only".into(), message: "store is read-only".into() })
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<usize> {
        self.inner.delete_chunks(document_id).await
    }
}

#[async_trait]
impl VectorStore for ReadOnlyStore {
    async fn search(
        &self,
        embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        self.inner.search(embedding, filter, limit).await
    }

    fn name(&self) -> &str {
        "read-only"
    }
}

/// A store that reports the same similarity for every hit, as an index with
/// outdated scores would.
pub struct StaleScoreStore {
    inner: InMemoryVectorStore,
    score: f32,
}

impl StaleScoreStore {
    pub fn new(score: f32) -> Self {
        Self { inner: InMemoryVectorStore::new(), score }
    }
}

#[async_trait]
impl ChunkStore for StaleScoreStore {
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.inner.get_chunks(document_id).await
    }

    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        self.inner.save_chunks(chunks).await
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<usize> {
        self.inner.delete_chunks(document_id).await
    }
}

#[async_trait]
impl VectorStore for StaleScoreStore {
    async fn search(
        &self,
        embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let mut results = self.inner.search(embedding, filter, limit).await?;
        for result in &mut results {
            result.similarity = self.score;
        }
        Ok(results)
    }

    fn name(&self) -> &str {
        "stale"
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy { max_attempts: 2, initial_backoff_ms: 1, max_backoff_ms: 2, timeout_ms: 2_000 }
}

pub fn test_config() -> RagConfig {
    RagConfig::builder()
        .max_chunk_size(200)
        .overlap_size(40)
        .min_chunk_size(50)
        .dimensions(DIMENSIONS)
        .retry(fast_retry())
        .build()
        .unwrap()
}

pub fn pipeline_with(
    embedder: Arc<HashEmbedder>,
    generator: Arc<ScriptedGenerator>,
) -> (RagPipeline, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = RagPipeline::builder()
        .config(test_config())
        .embedding_provider(embedder)
        .store(store.clone())
        .generation_provider(generator)
        .build()
        .unwrap();
    (pipeline, store)
}

/// A pipeline with both sample documents ingested.
pub async fn seeded_pipeline(
    embedder: Arc<HashEmbedder>,
    generator: Arc<ScriptedGenerator>,
) -> (RagPipeline, Arc<InMemoryVectorStore>) {
    let (pipeline, store) = pipeline_with(embedder, generator);
    pipeline.ingest_text("handbook", HANDBOOK).await.unwrap();
    pipeline.ingest_text("recipes", RECIPES).await.unwrap();
    (pipeline, store)
}
