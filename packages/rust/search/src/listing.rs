//! Parsing of the search engine's HTML result listing.
//!
//! Each result block carries a title anchor (`a.result__a`) and an optional
//! snippet (`.result__snippet`). Rank is assigned over retained entries only,
//! so a skipped block never leaves a gap.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use answerline_shared::SearchResult;

/// Titles longer than this are cut.
const MAX_TITLE_CHARS: usize = 200;

static RESULT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.result").expect("valid selector"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.result__a").expect("valid selector"));
static SNIPPET_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".result__snippet").expect("valid selector"));

/// Parse up to `max_results` entries from a result page, in page order.
pub fn parse_listing(html: &str, max_results: usize) -> Vec<SearchResult> {
    let doc = Html::parse_document(html);
    let mut results = Vec::new();

    for (idx, block) in doc.select(&RESULT_SEL).enumerate() {
        if results.len() >= max_results {
            break;
        }

        let Some(anchor) = block.select(&TITLE_SEL).next() else {
            debug!(block = idx + 1, "result block without title anchor, skipping");
            continue;
        };

        let Some(url) = anchor.value().attr("href").and_then(resolve_link) else {
            debug!(block = idx + 1, "result block without usable link, skipping");
            continue;
        };

        let title = collapsed_text(anchor);
        if title.is_empty() {
            debug!(block = idx + 1, %url, "result block without title, skipping");
            continue;
        }

        let body = block
            .select(&SNIPPET_SEL)
            .next()
            .map(collapsed_text)
            .unwrap_or_default();

        results.push(SearchResult {
            rank: results.len() + 1,
            title: title.chars().take(MAX_TITLE_CHARS).collect(),
            url,
            body,
        });
    }

    results
}

/// Turn a result href into an absolute HTTP(S) URL.
///
/// Links through the engine's redirector (`//duckduckgo.com/l/?uddg=...`)
/// are unwrapped to their target.
pub fn resolve_link(href: &str) -> Option<String> {
    let href = href.trim();
    let candidate = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    let mut url = Url::parse(&candidate).ok()?;

    let is_redirector = url
        .host_str()
        .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"))
        && url.path() == "/l/";
    if is_redirector {
        let target = url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())?;
        url = Url::parse(&target).ok()?;
    }

    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

/// All text under an element, whitespace collapsed.
fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(href: &str, title: &str, snippet: Option<&str>) -> String {
        let snippet = snippet
            .map(|s| format!(r#"<a class="result__snippet" href="{href}">{s}</a>"#))
            .unwrap_or_default();
        format!(
            r#"<div class="result results_links web-result"><div class="links_main">
                <h2 class="result__title"><a rel="nofollow" class="result__a" href="{href}">{title}</a></h2>
                {snippet}
            </div></div>"#
        )
    }

    fn page(blocks: &[String]) -> String {
        format!(
            "<html><body><div id=\"links\" class=\"results\">{}</div></body></html>",
            blocks.join("\n")
        )
    }

    #[test]
    fn parses_results_in_order() {
        let html = page(&[
            block("https://en.wikipedia.org/wiki/Paris", "Paris - Wikipedia", Some("Paris is the capital of France.")),
            block("https://www.britannica.com/place/Paris", "Paris | Britannica", None),
        ]);
        let results = parse_listing(&html, 10);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].title, "Paris - Wikipedia");
        assert_eq!(results[0].url, "https://en.wikipedia.org/wiki/Paris");
        assert_eq!(results[0].body, "Paris is the capital of France.");
        assert_eq!(results[1].rank, 2);
        assert_eq!(results[1].body, "");
    }

    #[test]
    fn skipped_entries_keep_ranks_dense() {
        let html = page(&[
            block("/relative/link", "Relative", None),
            block("https://a.example/one", "One", None),
            block("https://b.example/two", "   ", None),
            block("javascript:void(0)", "Script", None),
            block("https://c.example/three", "Three", None),
        ]);
        let results = parse_listing(&html, 10);

        let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
        let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert_eq!(titles, vec!["One", "Three"]);
    }

    #[test]
    fn caps_at_max_results() {
        let blocks: Vec<String> = (1..=8)
            .map(|i| block(&format!("https://site{i}.example/"), &format!("Site {i}"), None))
            .collect();
        let results = parse_listing(&page(&blocks), 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].title, "Site 3");
    }

    #[test]
    fn long_titles_are_cut() {
        let title = "x".repeat(500);
        let results = parse_listing(&page(&[block("https://a.example/", &title, None)]), 5);
        assert_eq!(results[0].title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn block_without_anchor_is_skipped() {
        let html = page(&[
            r#"<div class="result"><span>sponsored</span></div>"#.to_string(),
            block("https://a.example/", "Kept", None),
        ]);
        let results = parse_listing(&html, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rank, 1);
    }

    #[test]
    fn resolve_link_unwraps_redirector() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage%3Fa%3D1&rut=abc";
        assert_eq!(
            resolve_link(href).as_deref(),
            Some("https://example.com/page?a=1")
        );
    }

    #[test]
    fn resolve_link_rejects_non_http() {
        assert_eq!(resolve_link("ftp://example.com/file"), None);
        assert_eq!(resolve_link("mailto:someone@example.com"), None);
        assert_eq!(resolve_link("/local/path"), None);
        assert_eq!(resolve_link(""), None);
    }

    #[test]
    fn resolve_link_keeps_plain_absolute() {
        assert_eq!(
            resolve_link(" http://example.com/a/b ").as_deref(),
            Some("http://example.com/a/b")
        );
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(parse_listing("<html><body>No results.</body></html>", 10).is_empty());
    }
}
