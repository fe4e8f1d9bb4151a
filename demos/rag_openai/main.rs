//! # RAG with OpenAI
//!
//! Runs the pipeline against the OpenAI embeddings and chat completions APIs
//! (or any compatible server). Loads settings from `docrag.toml` when present
//! and `DOCRAG_*` environment variables.
//!
//! Set `OPENAI_API_KEY`, optionally `OPENAI_BASE_URL`, then:
//!
//! Run: `cargo run --example rag_openai --features openai -- path/to/file.txt "your question"`

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use docrag::openai::{OpenAIEmbeddingProvider, OpenAIGenerationProvider};
use docrag::{
    Document, GeneratedDiagramProvider, InMemoryVectorStore, RagConfig, RagPipeline, RagQuery,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docrag_telemetry::init_telemetry("rag-openai")?;

    let mut args = std::env::args().skip(1);
    let path = args.next().context("usage: rag_openai <file> <question>")?;
    let question = args.next().context("usage: rag_openai <file> <question>")?;

    let config_file = Path::new("docrag.toml");
    let config = RagConfig::load(config_file.exists().then_some(config_file))?;

    let mut embedder =
        OpenAIEmbeddingProvider::from_env()?.with_dimensions(config.embedding.dimensions);
    let mut llm = OpenAIGenerationProvider::from_env()?;
    if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
        embedder = embedder.with_base_url(&base_url);
        llm = llm.with_base_url(&base_url);
    }
    let llm = Arc::new(llm);

    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(embedder))
        .store(Arc::new(InMemoryVectorStore::new()))
        .generation_provider(llm.clone())
        .diagram_provider(Arc::new(GeneratedDiagramProvider::new(llm)))
        .build()?;

    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let mut document = Document::new(path.clone(), text).with_source_uri(path.clone());
    let chunk_count = pipeline.ingest(&mut document).await?;
    println!("Ingested {path}: {chunk_count} chunks");

    let answer = pipeline.query(&RagQuery::new(question)).await?;
    println!("\n{}\n", answer.answer_text);
    for (i, source) in answer.source_chunks.iter().enumerate() {
        println!("[{}] {} (similarity {:.3})", i + 1, source.chunk_id, source.similarity);
    }
    if let Some(error) = answer.error_message {
        eprintln!("note: {error}");
    }
    Ok(())
}
