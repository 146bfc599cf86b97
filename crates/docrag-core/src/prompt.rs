//! Context assembly and the question-answering prompt template.
//!
//! Retrieved chunks are packed into a context block in ranked order,
//! whole chunks only, until the character budget would be exceeded.
//! The prompt embeds the user query and the context block (or an explicit
//! no-context marker) in a fixed layout so identical inputs always yield
//! identical prompts.

use crate::index::SearchHit;

/// Separator placed between chunks inside the context block.
pub const CHUNK_SEPARATOR: &str = "\n---\n";

/// Marker used in place of a context block when retrieval found nothing.
pub const NO_CONTEXT_MARKER: &str = "(no supporting context was found for this question)";

/// Context block built from ranked search hits.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBlock {
    pub text: String,
    /// Hits that made it into `text`, in rank order.
    pub used: Vec<SearchHit>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

/// Pack `hits` (already in rank order) into at most `budget_chars`
/// characters, separator included.
///
/// Stops at the first hit that does not fit, so lower-ranked chunks are
/// always dropped before higher-ranked ones.
pub fn build_context(hits: Vec<SearchHit>, budget_chars: usize) -> ContextBlock {
    let sep_len = CHUNK_SEPARATOR.chars().count();
    let mut text = String::new();
    let mut used_chars = 0usize;
    let mut used = Vec::new();

    for hit in hits {
        let cost = hit.text.chars().count() + if used.is_empty() { 0 } else { sep_len };
        if used_chars + cost > budget_chars {
            break;
        }
        if !used.is_empty() {
            text.push_str(CHUNK_SEPARATOR);
        }
        text.push_str(&hit.text);
        used_chars += cost;
        used.push(hit);
    }

    ContextBlock { text, used }
}

/// Render the prompt sent to the completion provider.
pub fn render_prompt(query: &str, context: &ContextBlock) -> String {
    let context_text = if context.is_empty() {
        NO_CONTEXT_MARKER
    } else {
        context.text.as_str()
    };
    format!(
        "Answer the question using the context below. \
         If the context does not contain the answer, say that you don't know.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\
         Answer:",
        context_text,
        query.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn hit(id: u64, text: &str) -> SearchHit {
        SearchHit {
            id,
            distance: id as f32,
            text: text.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_all_fit() {
        let block = build_context(vec![hit(1, "alpha"), hit(2, "beta")], 100);
        assert_eq!(block.text, "alpha\n---\nbeta");
        assert_eq!(block.used.len(), 2);
    }

    #[test]
    fn test_budget_drops_lowest_ranked() {
        // "aaaa" (4) + sep (5) + "bbbb" (4) = 13 > 12
        let block = build_context(vec![hit(1, "aaaa"), hit(2, "bbbb"), hit(3, "c")], 12);
        assert_eq!(block.text, "aaaa");
        let ids: Vec<u64> = block.used.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_budget_exact_fit() {
        let block = build_context(vec![hit(1, "aaaa"), hit(2, "bbbb")], 13);
        assert_eq!(block.used.len(), 2);
        assert_eq!(block.text.chars().count(), 13);
    }

    #[test]
    fn test_first_chunk_over_budget_gives_empty_block() {
        let block = build_context(vec![hit(1, "too long for budget")], 5);
        assert!(block.is_empty());
        assert!(block.text.is_empty());
    }

    #[test]
    fn test_prompt_is_deterministic_and_contains_parts() {
        let block = build_context(vec![hit(1, "The fox is brown.")], 100);
        let a = render_prompt("  what color is the fox? ", &block);
        let b = render_prompt("what color is the fox?", &block);
        assert_eq!(a, b);
        assert!(a.contains("Context:\nThe fox is brown.\n"));
        assert!(a.contains("Question: what color is the fox?\n"));
        assert!(a.ends_with("Answer:"));
    }

    #[test]
    fn test_prompt_marks_missing_context() {
        let prompt = render_prompt("anything?", &build_context(Vec::new(), 100));
        assert!(prompt.contains(NO_CONTEXT_MARKER));
    }
}
