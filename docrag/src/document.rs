//! Data types for documents, chunks, and retrieval results.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Chunks that took any quality-gate penalty score below this confidence.
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.95;

/// Lifecycle state of a [`Document`] in the ingestion pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A source document containing extracted text and metadata.
///
/// The lifecycle [`status`](Document::status) can only be changed through the
/// named transitions [`start_processing`](Document::start_processing),
/// [`complete`](Document::complete), [`fail`](Document::fail), and
/// [`reset`](Document::reset).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The extracted text content of the document.
    pub text: String,
    /// ISO language code of the text.
    pub language: String,
    /// Domain tags used to scope retrieval.
    pub domain_tags: BTreeSet<String>,
    /// Key-value metadata copied onto every chunk.
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl Document {
    /// Create a pending document with English as its language.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            language: "en".to_string(),
            domain_tags: BTreeSet::new(),
            metadata: HashMap::new(),
            source_uri: None,
            status: DocumentStatus::Pending,
            failure_reason: None,
        }
    }

    /// Set the language code.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Add domain tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the source URI.
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    /// The current lifecycle state.
    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    /// The reason recorded by the last [`fail`](Document::fail), if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Enter `Processing`. Legal from every state except `Processing`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Conflict`] if the document is already being
    /// processed, which indicates a concurrent reprocess request.
    pub fn start_processing(&mut self) -> Result<()> {
        if self.status == DocumentStatus::Processing {
            return Err(RagError::Conflict(format!(
                "document '{}' is already being processed",
                self.id
            )));
        }
        self.status = DocumentStatus::Processing;
        self.failure_reason = None;
        Ok(())
    }

    /// Move from `Processing` to `Completed`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Conflict`] if the document is not processing.
    pub fn complete(&mut self) -> Result<()> {
        self.finish(DocumentStatus::Completed)
    }

    /// Move from `Processing` to `Failed`, recording the reason.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Conflict`] if the document is not processing.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.finish(DocumentStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Return a finished document to `Pending` so it can be queued again.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Conflict`] while the document is processing.
    pub fn reset(&mut self) -> Result<()> {
        if self.status == DocumentStatus::Processing {
            return Err(RagError::Conflict(format!(
                "document '{}' cannot be reset while processing",
                self.id
            )));
        }
        self.status = DocumentStatus::Pending;
        self.failure_reason = None;
        Ok(())
    }

    fn finish(&mut self, next: DocumentStatus) -> Result<()> {
        if self.status != DocumentStatus::Processing {
            return Err(RagError::Conflict(format!(
                "document '{}' cannot move from {} to {next}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// A contiguous span of a [`Document`]'s normalised text, the unit of
/// embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of the chunk within its document, starting at zero.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Byte offset of the first character in the normalised document text.
    pub start: usize,
    /// Byte offset one past the last character in the normalised document text.
    pub end: usize,
    /// Estimated token count, `chars / 4`.
    pub token_count: usize,
    /// The vector embedding. Empty until embedded.
    pub embedding: Vec<f32>,
    /// Set when the embedding is a zero-vector placeholder for a failed call.
    #[serde(default)]
    pub embedding_degraded: bool,
    /// Heuristic quality score in `[0, 1]`.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Domain tags inherited from the parent document.
    #[serde(default)]
    pub domain_tags: BTreeSet<String>,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Whether an embedding has been attached, degraded or not.
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// Whether the chunk failed the quality gate.
    pub fn is_low_confidence(&self) -> bool {
        self.confidence < LOW_CONFIDENCE_THRESHOLD
    }

    /// Number of characters in the chunk text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A retrieved [`Chunk`] paired with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]` (higher is more relevant).
    pub similarity: f32,
}

/// Restricts which chunks a search may return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// When non-empty, a chunk must carry at least one of these tags.
    #[serde(default)]
    pub domain_tags: BTreeSet<String>,
    /// When set, only chunks of this document are eligible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl SearchFilter {
    /// A filter scoped to a single document.
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self { document_id: Some(document_id.into()), ..Self::default() }
    }

    /// Whether the chunk passes this filter.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(document_id) = &self.document_id {
            if &chunk.document_id != document_id {
                return false;
            }
        }
        self.domain_tags.is_empty() || self.domain_tags.iter().any(|t| chunk.domain_tags.contains(t))
    }
}
