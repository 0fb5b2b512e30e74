//! Response formatter for chat and search callers.
//!
//! Pure functions: no I/O, no mutation. The chat surface never exposes raw
//! errors or an empty body — missing results become a templated "not
//! found" message with topic hints.

use crate::models::ScoredChunk;

/// Generic topics suggested when a query matches nothing.
const TOPIC_HINTS: &[&str] = &[
    "accessibility guidelines",
    "task planning",
    "document uploads",
    "procurement",
];

/// Render retrieved chunks into a single human-readable answer.
///
/// Empty `results` yields a fallback message that names the query and the
/// generic topic hints, never an error. Otherwise each result contributes
/// a labeled snippet (source name plus the leading `snippet_chars`
/// characters of its text), in result order.
pub fn format_answer(results: &[ScoredChunk], query: &str, snippet_chars: usize) -> String {
    if results.is_empty() {
        return format!(
            "I couldn't find anything in the knowledge base about \"{}\". \
             You could try asking about {} instead.",
            query,
            TOPIC_HINTS.join(", ")
        );
    }

    let mut answer = format!("Here's what I found about \"{}\":\n", query);
    for result in results {
        let snippet: String = result.chunk.text.chars().take(snippet_chars).collect();
        let ellipsis = if result.chunk.text.chars().count() > snippet_chars {
            "…"
        } else {
            ""
        };
        answer.push_str(&format!(
            "\nFrom {} (section {}): {}{}\n",
            result.chunk.metadata.file_name,
            result.chunk.metadata.chunk_index + 1,
            snippet.trim(),
            ellipsis
        ));
    }
    answer
}

/// Friendly apology used by the chat surface when the pipeline itself
/// fails. Returned with HTTP 200 so conversational UIs never show raw
/// error chrome.
pub fn apology() -> String {
    "Sorry, I'm having trouble reaching the knowledge base right now. \
     Please try again in a moment."
        .to_string()
}
