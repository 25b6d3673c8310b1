//! Rendering of search results for the model and for people.

use std::fmt::Write;

use chrono::{DateTime, Local};

use answerline_shared::{SearchContext, SearchResult};

const SEPARATOR_WIDTH: usize = 80;

/// Build the context block handed to the model, stamped with `now`.
pub fn build_context(query: &str, results: &[SearchResult], now: DateTime<Local>) -> SearchContext {
    if results.is_empty() {
        return SearchContext::new(format!("The search for '{query}' returned no results."), now);
    }

    let mut text = String::new();
    let _ = writeln!(text, "=== CURRENT DATE AND TIME ===");
    let _ = writeln!(
        text,
        "Today: {}, time: {} (local time)\n",
        now.format("%d.%m.%Y"),
        now.format("%H:%M")
    );
    let _ = writeln!(text, "=== SEARCH RESULTS: '{query}' ===\n");

    for result in results {
        let _ = writeln!(text, "[Source {}] {}", result.rank, result.title);
        let _ = writeln!(text, "URL: {}", result.url);
        if !result.body.is_empty() {
            let _ = writeln!(text, "CONTENT:\n{}", result.body);
        }
        let _ = writeln!(text, "{}\n", "-".repeat(SEPARATOR_WIDTH));
    }

    let _ = writeln!(text, "=== END OF RESULTS ===");
    let _ = writeln!(
        text,
        "IMPORTANT: use the CURRENT DATE above when an answer depends on what is current."
    );

    SearchContext::new(text, now)
}

/// Numbered titles with links, for showing a listing directly.
pub fn format_listing(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut text = String::from("Search results:\n\n");
    for result in results {
        let _ = writeln!(text, "{}. {}", result.rank, result.title);
        let _ = writeln!(text, "   {}\n", result.url);
    }
    text
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn result(rank: usize, title: &str, body: &str) -> SearchResult {
        SearchResult {
            rank,
            title: title.into(),
            url: format!("https://example.com/{rank}"),
            body: body.into(),
        }
    }

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 0).unwrap()
    }

    #[test]
    fn context_lists_results_in_rank_order() {
        let results = vec![
            result(1, "First", "alpha body"),
            result(2, "Second", ""),
            result(3, "Third", "gamma body"),
        ];
        let context = build_context("capital of France?", &results, fixed_now());
        let text = context.as_str();

        assert!(text.contains("Today: 09.03.2026, time: 14:05"));
        assert!(text.contains("=== SEARCH RESULTS: 'capital of France?' ==="));

        let first = text.find("[Source 1] First").unwrap();
        let second = text.find("[Source 2] Second").unwrap();
        let third = text.find("[Source 3] Third").unwrap();
        assert!(first < second && second < third);

        assert!(text.contains("CONTENT:\nalpha body"));
        assert_eq!(text.matches("CONTENT:").count(), 2);
        assert_eq!(text.matches(&"-".repeat(80)).count(), 3);
        assert!(text.trim_end().ends_with("is current."));
        assert_eq!(context.generated_at(), fixed_now());
    }

    #[test]
    fn empty_results_give_single_line() {
        let context = build_context("nothing", &[], fixed_now());
        assert_eq!(context.as_str(), "The search for 'nothing' returned no results.");
    }

    #[test]
    fn listing_shows_titles_and_links() {
        let text = format_listing(&[result(1, "First", "x"), result(2, "Second", "y")]);
        assert!(text.starts_with("Search results:"));
        assert!(text.contains("1. First\n   https://example.com/1"));
        assert!(text.contains("2. Second"));
        assert!(!text.contains("x\n"));
    }

    #[test]
    fn empty_listing() {
        assert_eq!(format_listing(&[]), "No results found.");
    }
}
