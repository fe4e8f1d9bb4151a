//! Text generation and diagram rendering collaborators.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, Result};

/// A provider that generates text from a prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Short name used in logs and errors.
    fn name(&self) -> &str {
        "generation"
    }
}

/// A provider that renders answer text into diagram source code.
#[async_trait]
pub trait DiagramProvider: Send + Sync {
    /// Render `text` as a diagram of the given type, returning its source.
    async fn render(&self, text: &str, diagram_type: DiagramType) -> Result<String>;
}

/// Supported diagram kinds, rendered as Mermaid source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiagramType {
    #[default]
    Flowchart,
    Sequence,
    Mindmap,
    Timeline,
}

/// Per-type rendering behaviour.
struct DiagramSpec {
    /// First token of valid diagram source.
    keyword: &'static str,
    /// Type-specific drawing instructions.
    instructions: &'static str,
    fence_open: &'static str,
    fence_close: &'static str,
}

const FLOWCHART: DiagramSpec = DiagramSpec {
    keyword: "flowchart",
    instructions: "Draw the steps and decisions described below as a top-down flowchart \
                   (`flowchart TD`). Use short node labels and label decision edges.",
    fence_open: "```mermaid",
    fence_close: "```",
};

const SEQUENCE: DiagramSpec = DiagramSpec {
    keyword: "sequenceDiagram",
    instructions: "Draw the interactions described below as a sequence diagram. \
                   Declare every participant before its first message.",
    fence_open: "```mermaid",
    fence_close: "```",
};

const MINDMAP: DiagramSpec = DiagramSpec {
    keyword: "mindmap",
    instructions: "Summarise the concepts described below as a mind map with a single root \
                   and at most three levels of indentation.",
    fence_open: "```mermaid",
    fence_close: "```",
};

const TIMELINE: DiagramSpec = DiagramSpec {
    keyword: "timeline",
    instructions: "Arrange the events described below on a timeline, one period per line, \
                   in chronological order.",
    fence_open: "```mermaid",
    fence_close: "```",
};

impl DiagramType {
    /// Every diagram type.
    pub const ALL: [DiagramType; 4] = [Self::Flowchart, Self::Sequence, Self::Mindmap, Self::Timeline];

    fn spec(self) -> &'static DiagramSpec {
        match self {
            Self::Flowchart => &FLOWCHART,
            Self::Sequence => &SEQUENCE,
            Self::Mindmap => &MINDMAP,
            Self::Timeline => &TIMELINE,
        }
    }

    /// The Mermaid keyword valid source of this type starts with.
    pub fn keyword(self) -> &'static str {
        self.spec().keyword
    }

    /// Build the generation prompt asking for a diagram of `text`.
    pub fn prompt(self, text: &str) -> String {
        let spec = self.spec();
        format!(
            "{instructions}\n\
             Respond with Mermaid source only, starting with `{keyword}`, wrapped in \
             {open} ... {close}. Do not add facts that are not in the text.\n\n\
             Text:\n{text}",
            instructions = spec.instructions,
            keyword = spec.keyword,
            open = spec.fence_open,
            close = spec.fence_close,
        )
    }

    /// Pull diagram source out of raw generator output.
    ///
    /// Strips this type's fence delimiters if present and returns `None`
    /// unless the remaining source starts with [`keyword`](Self::keyword).
    pub fn extract_code(self, raw: &str) -> Option<String> {
        let spec = self.spec();
        let mut body = raw.trim();
        if let Some(open) = body.find(spec.fence_open) {
            body = &body[open + spec.fence_open.len()..];
            if let Some(close) = body.find(spec.fence_close) {
                body = &body[..close];
            }
        }
        let body = body.trim();
        body.starts_with(spec.keyword).then(|| body.to_string())
    }
}

impl fmt::Display for DiagramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flowchart => "flowchart",
            Self::Sequence => "sequence",
            Self::Mindmap => "mindmap",
            Self::Timeline => "timeline",
        };
        f.write_str(name)
    }
}

/// A [`DiagramProvider`] that asks a [`GenerationProvider`] for Mermaid
/// source using each [`DiagramType`]'s prompt template.
pub struct GeneratedDiagramProvider {
    generator: Arc<dyn GenerationProvider>,
}

impl GeneratedDiagramProvider {
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl DiagramProvider for GeneratedDiagramProvider {
    async fn render(&self, text: &str, diagram_type: DiagramType) -> Result<String> {
        let raw = self.generator.generate(&diagram_type.prompt(text)).await?;
        debug!(%diagram_type, raw_len = raw.len(), "diagram generated");
        diagram_type.extract_code(&raw).ok_or_else(|| {
            RagError::provider(
                self.generator.name(),
                format!("response is not valid {diagram_type} source"),
            )
        })
    }
}
