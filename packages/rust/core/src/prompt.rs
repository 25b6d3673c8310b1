//! Prompt construction for the two inference modes.

use std::fmt::Write;

use answerline_shared::{SearchContext, Turn};

/// Render prior turns as alternating lines followed by the new query.
///
/// With no history the prompt is the query itself.
pub fn direct_prompt(query: &str, history: &[Turn]) -> String {
    if history.is_empty() {
        return query.to_string();
    }

    let mut prompt = String::new();
    for turn in history {
        let _ = writeln!(prompt, "User: {}", turn.user);
        let _ = writeln!(prompt, "Assistant: {}", turn.assistant);
    }
    let _ = write!(prompt, "User: {query}");
    prompt
}

/// Wrap the search context and query in the answer-from-sources instruction.
pub fn search_prompt(query: &str, context: &SearchContext) -> String {
    format!(
        "You are a knowledgeable assistant with access to fresh web search results.\n\
         Answer the question using only the facts in the results below. \
         Give a clear and precise answer, including dates and numbers where the results provide them. \
         Do not add unconfirmed details and do not speculate.\n\n\
         {context}\n\
         Question: {query}",
        context = context.as_str()
    )
}
