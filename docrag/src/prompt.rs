//! Prompt assembly: conversational query expansion, grounding prompts, and
//! follow-up suggestions.

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::document::RetrievalResult;

const MAX_FOLLOWUPS: usize = 3;

const GROUNDING_RULES: &str = "\
You answer questions using only the numbered context passages below.
Rules:
- Use only facts stated in the context. Do not add facts, names, or numbers from outside it.
- If the context does not contain the answer, say that the documents do not contain enough information.
- Cite the passages you rely on by number, for example [1] or [2][3].
- Keep the answer concise and in the language of the question.";

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One prior message of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }
}

/// The last `window` turns of `history`.
pub fn recent_turns(history: &[ConversationTurn], window: usize) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(window)..]
}

fn write_turns(out: &mut String, turns: &[ConversationTurn]) {
    for turn in turns {
        let _ = writeln!(out, "{}: {}", turn.role.label(), turn.content.trim());
    }
}

/// Prefix `query` with the most recent conversation turns so the query
/// embedding reflects the conversation.
pub fn contextualize_query(query: &str, history: &[ConversationTurn], window: usize) -> String {
    let turns = recent_turns(history, window);
    if turns.is_empty() {
        return query.to_string();
    }
    let mut out = String::new();
    write_turns(&mut out, turns);
    let _ = write!(out, "user: {}", query.trim());
    out
}

/// Build the grounding prompt from packed context passages.
///
/// Passages are numbered in their ranked order; `history` is included
/// verbatim under its own heading when non-empty.
pub fn grounding_prompt(query: &str, passages: &[RetrievalResult], history: &[ConversationTurn]) -> String {
    let mut out = String::with_capacity(
        GROUNDING_RULES.len() + passages.iter().map(|p| p.chunk.text.len() + 64).sum::<usize>(),
    );
    out.push_str(GROUNDING_RULES);
    out.push_str("\n\nContext:\n");

    for (i, passage) in passages.iter().enumerate() {
        let chunk = &passage.chunk;
        let _ = write!(out, "[{}] (document: {}", i + 1, chunk.document_id);
        if let Some(section) = &chunk.section_title {
            let _ = write!(out, ", section: {section}");
        }
        if let Some(page) = chunk.page {
            let _ = write!(out, ", page: {page}");
        }
        let _ = writeln!(out, ")\n{}\n", chunk.text.trim());
    }

    if !history.is_empty() {
        out.push_str("Conversation so far:\n");
        write_turns(&mut out, history);
        out.push('\n');
    }

    let _ = write!(out, "Question: {}\nAnswer:", query.trim());
    out
}

/// Suggest up to three follow-up questions from the section titles of the
/// cited sources, skipping sections the query already mentions.
pub fn suggest_followups(query: &str, sources: &[RetrievalResult]) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut seen = HashSet::new();
    let mut followups: Vec<String> = sources
        .iter()
        .filter_map(|s| s.chunk.section_title.as_deref())
        .map(str::trim)
        .filter(|title| !title.is_empty() && !query_lower.contains(&title.to_lowercase()))
        .filter(|title| seen.insert(title.to_lowercase()))
        .take(MAX_FOLLOWUPS)
        .map(|title| format!("What else does the document say about {title}?"))
        .collect();

    if followups.is_empty() && !sources.is_empty() {
        followups.push("Can you provide more detail on this topic from the documents?".to_string());
    }
    followups
}
