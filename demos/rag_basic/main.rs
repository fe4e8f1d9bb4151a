//! # RAG Basic Example
//!
//! Demonstrates the core RAG pipeline: ingest documents, then ask questions
//! answered only from their content.
//!
//! Uses `InMemoryVectorStore`, the default `SectionChunker`, a deterministic
//! bag-of-words `MockEmbeddingProvider`, and an `ExtractiveGenerator` that
//! echoes the best passage, so it runs with **zero API keys**.
//!
//! Run: `cargo run --example rag_basic`

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use docrag::{
    AnswerOutcome, Document, EmbeddingProvider, GenerationProvider, InMemoryVectorStore,
    RagConfig, RagPipeline, RagQuery,
};

// ---------------------------------------------------------------------------
// MockEmbeddingProvider: deterministic word-hash embeddings for demos
// ---------------------------------------------------------------------------

struct MockEmbeddingProvider {
    dimensions: usize,
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        // Each lowercase word bumps one hashed bucket, so texts sharing
        // words point in similar directions.
        let mut emb = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2) {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            emb[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// ExtractiveGenerator: answers with the first passage of the prompt
// ---------------------------------------------------------------------------

struct ExtractiveGenerator;

#[async_trait::async_trait]
impl GenerationProvider for ExtractiveGenerator {
    async fn generate(&self, prompt: &str) -> docrag::Result<String> {
        // Passages follow a "[1] (document: ...)" header line.
        let passage = prompt
            .split_once("[1] (")
            .and_then(|(_, rest)| rest.split_once('\n'))
            .map(|(_, body)| body.split("\n\n").next().unwrap_or(body).trim())
            .unwrap_or("I don't know.");
        Ok(format!("{passage} [1]"))
    }

    fn name(&self) -> &str {
        "extractive"
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docrag_telemetry::init_telemetry("rag-basic")?;

    // -- 1. Configure the pipeline ----------------------------------------
    // Small chunks keep the demo readable; a low threshold lets the toy
    // embedder's partial matches through.
    let config = RagConfig::builder()
        .max_chunk_size(300)
        .overlap_size(50)
        .min_chunk_size(40)
        .dimensions(128)
        .default_max_chunks(3)
        .default_min_similarity(0.15)
        .build()?;

    // -- 2. Build the pipeline with in-memory components ------------------
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(MockEmbeddingProvider { dimensions: 128 }))
        .store(Arc::new(InMemoryVectorStore::new()))
        .generation_provider(Arc::new(ExtractiveGenerator))
        .build()?;

    // -- 3. Ingest sample documents ---------------------------------------
    let mut documents = vec![
        Document::new(
            "rust",
            "OWNERSHIP\nRust is a systems programming language focused on safety, speed, and \
             concurrency. It achieves memory safety without a garbage collector through its \
             ownership system.\n\nCARGO\nCargo is the Rust package manager. It builds code, \
             downloads dependencies, and runs tests.",
        )
        .with_tags(["programming"])
        .with_source_uri("https://www.rust-lang.org"),
        Document::new(
            "python",
            "Python is a high-level, interpreted programming language known for its \
             readability and versatility. It is widely used in data science, web development, \
             and automation.",
        )
        .with_tags(["programming"]),
        Document::new(
            "rag",
            "Retrieval-Augmented Generation combines a retrieval system with a language \
             model. Documents are chunked, embedded, and stored in a vector database. At query \
             time the most relevant chunks are retrieved and given to the model as context.",
        )
        .with_tags(["ml"]),
    ];

    println!("Ingesting {} documents...", documents.len());
    for doc in &mut documents {
        let count = pipeline.ingest(doc).await?;
        println!("  {} -> {count} chunk(s), status {}", doc.id, doc.status());
    }

    // -- 4. Query the pipeline --------------------------------------------
    let queries = [
        RagQuery::new("How does Rust achieve memory safety?"),
        RagQuery::new("Which language is used in data science?").with_tags(["programming"]),
        RagQuery::new("What does the package manager do?").with_document("rust"),
        RagQuery::new("What is the capital of France?"),
    ];

    for query in &queries {
        println!("\nQuery: \"{}\" ({})", query.text, query.mode);
        let answer = pipeline.query(query).await?;
        match answer.outcome {
            AnswerOutcome::Answered => {
                println!("  Answer: {}", answer.answer_text);
                println!("  Confidence: {:.2}, quality: {:.2}", answer.confidence, answer.quality);
                for (i, source) in answer.source_chunks.iter().enumerate() {
                    println!(
                        "  [{}] sim={:.3} doc={} section={}",
                        i + 1,
                        source.similarity,
                        source.document_id,
                        source.section.as_deref().unwrap_or("-"),
                    );
                }
                for followup in &answer.suggested_followups {
                    println!("  Follow-up: {followup}");
                }
            }
            AnswerOutcome::NoRelevantContent | AnswerOutcome::Degraded => {
                println!("  {}", answer.answer_text);
                println!("  ({})", answer.error_message.as_deref().unwrap_or("no details"));
            }
        }
    }

    println!("\nDone.");
    Ok(())
}
