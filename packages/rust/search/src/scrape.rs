//! Single-page fetch and main-content text extraction.
//!
//! Uses readability-style heuristics: drop page chrome, take the first
//! article-like container, fall back to `<body>`.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use answerline_shared::{AnswerlineError, Result};

use crate::agents::browser_headers;

/// Elements whose text never counts as page content.
const CHROME_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "iframe", "noscript",
];

/// Main-content candidates, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    r#"[role="main"]"#,
    ".content",
    ".post-content",
    "#content",
];

static CONTENT_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});
static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// Appended to text cut at the character cap.
const ELLIPSIS: &str = "...";

/// Fetches one page and reduces it to plain text.
#[derive(Clone)]
pub struct ScrapeWorker {
    client: Client,
    timeout: Duration,
    max_chars: usize,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl ScrapeWorker {
    pub fn new(client: Client, timeout: Duration, max_chars: usize) -> Self {
        Self {
            client,
            timeout,
            max_chars,
            allow_localhost: false,
        }
    }

    /// Allow scraping localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Fetch `url` and return its extracted text, or an empty string on any failure.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn scrape(&self, url: &str) -> String {
        match self.fetch(url).await {
            Ok(html) => {
                let text = extract_text(&html, self.max_chars);
                debug!(chars = text.chars().count(), "scraped page");
                text
            }
            Err(e) => {
                warn!(error = %e, "scrape failed, keeping snippet");
                String::new()
            }
        }
    }

    /// Only the first hop is checked here; the client's [`redirect_policy`]
    /// covers the rest.
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| AnswerlineError::parse(format!("{url}: {e}")))?;
        if !self.allow_localhost && is_ssrf_target(&parsed) {
            return Err(AnswerlineError::Network(format!(
                "{url}: private or local address blocked"
            )));
        }

        let response = self
            .client
            .get(parsed)
            .headers(browser_headers())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AnswerlineError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnswerlineError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| AnswerlineError::Network(format!("{url}: body read failed: {e}")))
    }
}

/// Extract the main text of an HTML page, whitespace collapsed and capped at `max_chars`.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let doc = Html::parse_document(html);

    let region = CONTENT_SELS
        .iter()
        .find_map(|sel| doc.select(sel).find(|el| !inside_chrome(*el)))
        .or_else(|| doc.select(&BODY_SEL).next())
        .unwrap_or_else(|| doc.root_element());

    let mut raw = String::new();
    collect_text(region, &mut raw);
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    truncate_chars(&text, max_chars)
}

/// Recursively gather text nodes, skipping chrome subtrees.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(e) if !CHROME_TAGS.contains(&e.name()) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn inside_chrome(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| CHROME_TAGS.contains(&a.value().name()))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{ELLIPSIS}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Redirect policy for search and scrape clients.
///
/// Follows at most 10 hops and refuses any hop from a public origin into a
/// private or local address.
pub(crate) fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let blocked = attempt
            .previous()
            .first()
            .filter(|origin| !redirect_allowed(origin, attempt.url()))
            .map(|_| attempt.url().to_string());
        match blocked {
            Some(target) => {
                warn!(url = %target, "redirect into private address blocked");
                attempt.error(format!("redirect to {target}: private or local address blocked"))
            }
            None => attempt.follow(),
        }
    })
}

const MAX_REDIRECTS: usize = 10;

/// A hop may reach a private address only if the chain already started on one.
fn redirect_allowed(origin: &Url, next: &Url) -> bool {
    !is_ssrf_target(next) || is_ssrf_target(origin)
}

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
