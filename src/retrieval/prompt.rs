//! Turns a ranked context set into the system/user message pair.

use crate::store::types::RankedDoc;

/// Persona for the assistant. Journal context is optional, so the assistant
/// must stay useful for ordinary conversation too.
pub const SYSTEM_PERSONA: &str = "You are a warm, helpful assistant who can talk about any topic. \
When excerpts from the user's journal are included, draw on them to make your answer personal \
and specific, and mention the date when it helps. When no excerpts are included, or they are \
not relevant, simply answer the question as a friendly conversational assistant.";

/// A system message and a user message, ready for a chat model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Build the prompt for `question` grounded in `docs` (best first).
///
/// Each doc becomes a `• [date] text` line in ranking order, followed by the
/// question. With no docs the user message is the question alone.
pub fn build_prompt(question: &str, docs: &[RankedDoc]) -> Prompt {
    let user = if docs.is_empty() {
        question.to_string()
    } else {
        let context = docs
            .iter()
            .map(|d| format!("• [{}] {}", d.date, d.text))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Relevant journal context:\n{context}\n\nQuestion: {question}")
    };

    Prompt {
        system: SYSTEM_PERSONA.to_string(),
        user,
    }
}
