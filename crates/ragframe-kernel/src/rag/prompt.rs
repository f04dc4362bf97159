//! Prompt assembly
//!
//! The prompt is the query, followed (when any context was retained) by a
//! `Context:` section holding each chunk's text in retrieval order, joined by
//! [`CONTEXT_SEPARATOR`]. No instruction text is added here; generators that
//! need a response-format instruction add it themselves.

use super::types::ContextChunk;

/// Separator placed between chunk texts in the context section.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Header line introducing the context section.
pub const CONTEXT_HEADER: &str = "Context:";

/// Build the generation prompt for `query` and the retained `contexts`.
pub fn build_prompt(query: &str, contexts: &[ContextChunk]) -> String {
    if contexts.is_empty() {
        return query.to_string();
    }

    let joined = contexts
        .iter()
        .map(ContextChunk::text)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!("{query}\n\n{CONTEXT_HEADER}\n{joined}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> ContextChunk {
        ContextChunk::new(text).unwrap()
    }

    #[test]
    fn test_no_context_is_bare_query() {
        assert_eq!(build_prompt("Why?", &[]), "Why?");
    }

    #[test]
    fn test_contexts_in_order_with_separator() {
        let prompt = build_prompt("Q", &[chunk("first"), chunk("second")]);
        assert_eq!(prompt, "Q\n\nContext:\nfirst\n\n---\n\nsecond");
    }

    #[test]
    fn test_pure_function() {
        let contexts = vec![chunk("Paris is the capital of France.")];
        let q = "What is the capital of France?";
        assert_eq!(build_prompt(q, &contexts), build_prompt(q, &contexts));
        assert!(build_prompt(q, &contexts).starts_with(q));
    }
}
