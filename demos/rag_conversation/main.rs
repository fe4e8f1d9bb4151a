//! # RAG Conversation Example
//!
//! Ingests documents through the background `IngestionPool`, then holds a
//! short conversation where each follow-up question is resolved against the
//! prior turns. The last question asks for a flowchart of the answer.
//!
//! Query spans are captured in memory with `docrag-telemetry` and the state
//! transitions of the final query are printed alongside the JSON answer.
//!
//! Run: `cargo run --example rag_conversation`

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use docrag::{
    ConversationTurn, DiagramType, Document, EmbeddingProvider, GeneratedDiagramProvider,
    GenerationProvider, InMemoryVectorStore, IngestionPool, RagConfig, RagPipeline, RagQuery,
};
use docrag_telemetry::QueryTraceStorage;

const POLICIES: &[(&str, &str)] = &[
    (
        "leave",
        "ANNUAL LEAVE\nEmployees receive twenty days of annual leave per year. Leave requests \
         are submitted in the HR portal and approved by the line manager.\n\nCARRY OVER\nUp to \
         five unused leave days carry over into the next year. Carried days expire at the end \
         of March.",
    ),
    (
        "expenses",
        "TRAVEL EXPENSES\nTravel must be booked through the company travel desk. Receipts are \
         uploaded within thirty days of the trip.\n\nMEALS\nMeals during travel are reimbursed \
         up to a daily allowance of forty euros.",
    ),
];

struct WordHashEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for WordHashEmbedder {
    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        let mut emb = vec![0.0f32; 128];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 3) {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            emb[(hasher.finish() % 128) as usize] += 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        128
    }
}

/// Stands in for a chat model: quotes the first passage, or draws a
/// two-step flowchart when asked for Mermaid source.
struct CannedModel;

#[async_trait::async_trait]
impl GenerationProvider for CannedModel {
    async fn generate(&self, prompt: &str) -> docrag::Result<String> {
        if prompt.contains("Mermaid") {
            return Ok("```mermaid\nflowchart TD\n  A[Submit request in HR portal] --> \
                       B[Line manager approves]\n```"
                .to_string());
        }
        let passage = prompt
            .split_once("[1] (")
            .and_then(|(_, rest)| rest.split_once('\n'))
            .map(|(_, body)| body.split("\n\n").next().unwrap_or(body).trim().to_string())
            .unwrap_or_default();
        Ok(format!("According to the policy: {passage} [1]"))
    }

    fn name(&self) -> &str {
        "canned"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let traces = Arc::new(QueryTraceStorage::new());
    docrag_telemetry::init_with_capture("rag-conversation", traces.clone())?;

    let config = RagConfig::builder()
        .max_chunk_size(300)
        .overlap_size(40)
        .min_chunk_size(40)
        .dimensions(128)
        .default_min_similarity(0.1)
        .history_window(4)
        .ingestion(2, 8)
        .build()?;

    let model = Arc::new(CannedModel);
    let pipeline = Arc::new(
        RagPipeline::builder()
            .config(config.clone())
            .embedding_provider(Arc::new(WordHashEmbedder))
            .store(Arc::new(InMemoryVectorStore::new()))
            .generation_provider(model.clone())
            .diagram_provider(Arc::new(GeneratedDiagramProvider::new(model)))
            .build()?,
    );

    // -- Background ingestion ---------------------------------------------
    let pool = IngestionPool::new(pipeline.clone(), &config.ingestion);
    let tickets = POLICIES
        .iter()
        .map(|(id, text)| pool.submit(Document::new(*id, *text).with_tags(["hr"])))
        .collect::<docrag::Result<Vec<_>>>()?;
    for ticket in tickets {
        let report = ticket.report().await?;
        println!(
            "{}: {} ({} chunks)",
            report.document.id,
            report.document.status(),
            report.result.as_ref().map_or(0, |n| *n)
        );
    }
    pool.shutdown().await;

    // -- Conversation -----------------------------------------------------
    let questions = [
        "How many days of annual leave do employees get?",
        "Who approves the requests?",
        "Can unused days carry over?",
    ];
    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut last_answer = None;

    for (i, question) in questions.iter().enumerate() {
        let mut query = RagQuery::new(*question).with_tags(["hr"]).with_history(history.clone());
        if i == 1 {
            query = query.with_diagram(DiagramType::Flowchart);
        }

        let answer = pipeline.query(&query).await?;
        println!("\nuser: {question}\nassistant: {}", answer.answer_text);
        if let Some(diagram) = &answer.diagram {
            println!("diagram ({}):\n{}", diagram.diagram_type, diagram.code);
        }

        history.push(ConversationTurn::user(*question));
        history.push(ConversationTurn::assistant(answer.answer_text.clone()));
        last_answer = Some(answer);
    }

    // -- Inspect the last query -------------------------------------------
    if let Some(answer) = last_answer {
        println!("\n{}", serde_json::to_string_pretty(&answer)?);
        for span in traces.get_trace(&answer.query_id).unwrap_or_default() {
            let states: Vec<_> = span
                .events
                .iter()
                .filter(|e| e.message.as_deref() == Some("query state"))
                .filter_map(|e| e.fields.get("state"))
                .collect();
            tracing::info!(span = %span.name, ?states, "captured query span");
        }
    }

    Ok(())
}
