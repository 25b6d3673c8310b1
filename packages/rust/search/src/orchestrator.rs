//! Web search with bounded-parallel page scraping.
//!
//! One listing request per query, then up to `pages_to_scrape` concurrent
//! page fetches whose text replaces the matching result's snippet.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use answerline_shared::{AnswerlineError, Result, SearchConfig, SearchResult};

use crate::agents::browser_headers;
use crate::listing::parse_listing;
use crate::scrape::{ScrapeWorker, redirect_policy};

/// Issues searches and enriches the top results with scraped page text.
pub struct SearchOrchestrator {
    config: SearchConfig,
    client: Client,
    worker: ScrapeWorker,
    /// Caps page fetches across every request sharing this orchestrator.
    scrape_permits: Arc<Semaphore>,
}

impl SearchOrchestrator {
    /// Create a new orchestrator with the given configuration.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect_policy())
            .connect_timeout(config.scrape_timeout)
            .build()
            .map_err(|e| AnswerlineError::Network(format!("failed to build HTTP client: {e}")))?;

        let worker = ScrapeWorker::new(
            client.clone(),
            config.scrape_timeout,
            config.scrape_max_chars,
        );
        let scrape_permits = Arc::new(Semaphore::new(config.scrape_concurrency.max(1)));

        Ok(Self {
            config,
            client,
            worker,
            scrape_permits,
        })
    }

    /// Allow scraping localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.worker = self.worker.allow_localhost();
        self
    }

    /// Search for `query`. Never fails: any error yields an empty list.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        match self.try_search(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "search failed");
                Vec::new()
            }
        }
    }

    /// Search for `query`, surfacing listing failures to the caller.
    ///
    /// Scrape failures are still absorbed per result.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn try_search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let start = Instant::now();

        let html = self.fetch_listing(query).await?;
        let mut results = parse_listing(&html, self.config.max_results);
        info!(results = results.len(), bytes = html.len(), "parsed search listing");

        if !results.is_empty() && self.config.pages_to_scrape > 0 {
            let scraped = self.scrape_top(&mut results).await;
            info!(scraped, "replaced snippets with page text");
        }

        info!(
            results = results.len(),
            duration_ms = start.elapsed().as_millis(),
            "search complete"
        );
        Ok(results)
    }

    async fn fetch_listing(&self, query: &str) -> Result<String> {
        let form = [("q", query), ("kl", self.config.region.as_str())];

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(browser_headers())
            .form(&form)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| AnswerlineError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnswerlineError::Network(format!("search endpoint returned HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| AnswerlineError::Network(format!("search body read failed: {e}")))
    }

    /// Scrape the top results in parallel and write their text back by rank.
    ///
    /// Returns how many snippets were replaced.
    async fn scrape_top(&self, results: &mut [SearchResult]) -> usize {
        let count = results.len().min(self.config.pages_to_scrape);
        debug!(count, "scraping top results");

        let handles: Vec<_> = results[..count]
            .iter()
            .map(|result| {
                let worker = self.worker.clone();
                let permits = self.scrape_permits.clone();
                let url = result.url.clone();
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return String::new();
                    };
                    worker.scrape(&url).await
                })
            })
            .collect();

        // Awaiting in spawn order keeps each text at its own rank,
        // whichever task finishes first.
        let mut replaced = 0;
        for (result, handle) in results[..count].iter_mut().zip(handles) {
            match handle.await {
                Ok(text) if !text.is_empty() => {
                    result.body = text;
                    replaced += 1;
                }
                Ok(_) => {
                    debug!(rank = result.rank, url = %result.url, "no page text, keeping snippet");
                }
                Err(e) => {
                    warn!(rank = result.rank, error = %e, "scrape task failed");
                }
            }
        }

        replaced
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: String, pages_to_scrape: usize) -> SearchConfig {
        SearchConfig {
            endpoint,
            region: "wt-wt".into(),
            max_results: 10,
            pages_to_scrape,
            request_timeout: Duration::from_secs(5),
            scrape_timeout: Duration::from_secs(2),
            scrape_max_chars: 1500,
            scrape_concurrency: 5,
        }
    }

    fn listing(links: &[(String, &str, &str)]) -> String {
        let blocks: String = links
            .iter()
            .map(|(href, title, snippet)| {
                format!(
                    r#"<div class="result"><a class="result__a" href="{href}">{title}</a>
                       <a class="result__snippet">{snippet}</a></div>"#
                )
            })
            .collect();
        format!("<html><body>{blocks}</body></html>")
    }

    async fn mount_page(server: &MockServer, route: &str, html: &str, delay_ms: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(html)
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn search_scrapes_top_pages_in_rank_order() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("POST"))
            .and(path("/html/"))
            .and(body_string_contains("q=What+is+the+capital+of+France%3F"))
            .and(body_string_contains("kl=wt-wt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[
                (format!("{base}/one"), "One", "snippet one"),
                (format!("{base}/two"), "Two", "snippet two"),
                (format!("{base}/three"), "Three", "snippet three"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        // The first page is the slowest, so completion order differs from rank order.
        mount_page(&server, "/one", "<article>page one</article>", 800).await;
        mount_page(&server, "/two", "<article>page two</article>", 500).await;
        // Beyond pages_to_scrape: must never be fetched.
        Mock::given(method("GET"))
            .and(path("/three"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<article>page three</article>"))
            .expect(0)
            .mount(&server)
            .await;

        let orchestrator = SearchOrchestrator::new(config(format!("{base}/html/"), 2))
            .unwrap()
            .allow_localhost();
        let start = Instant::now();
        let results = orchestrator.search("What is the capital of France?").await;

        // Sequential fetches would take at least 1300ms.
        assert!(start.elapsed() < Duration::from_millis(1250), "{:?}", start.elapsed());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].body, "page one");
        assert_eq!(results[1].body, "page two");
        assert_eq!(results[2].body, "snippet three");
        let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_scrape_keeps_snippet_and_spares_siblings() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("POST"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[
                (format!("{base}/broken"), "Broken", "kept snippet"),
                (format!("{base}/slow"), "Slow", "slow snippet"),
                (format!("{base}/fine"), "Fine", "fine snippet"),
            ])))
            .mount(&server)
            .await;

        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<main>too late</main>")
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;
        mount_page(&server, "/fine", "<main>fine page</main>", 0).await;

        let orchestrator = SearchOrchestrator::new(config(format!("{base}/html/"), 5))
            .unwrap()
            .allow_localhost();
        let start = Instant::now();
        let results = orchestrator.search("anything").await;

        assert!(start.elapsed() < Duration::from_secs(8));
        assert_eq!(results[0].body, "kept snippet");
        assert_eq!(results[1].body, "slow snippet");
        assert_eq!(results[2].body, "fine page");
    }

    #[tokio::test]
    async fn zero_pages_to_scrape_skips_fetches() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[(
                format!("{base}/one"),
                "One",
                "snippet",
            )])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let orchestrator = SearchOrchestrator::new(config(format!("{base}/html/"), 0))
            .unwrap()
            .allow_localhost();
        let results = orchestrator.search("q").await;
        assert_eq!(results[0].body, "snippet");
    }

    #[tokio::test]
    async fn endpoint_error_yields_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let orchestrator =
            SearchOrchestrator::new(config(format!("{}/html/", server.uri()), 5)).unwrap();
        assert!(orchestrator.search("q").await.is_empty());
        assert!(orchestrator.try_search("q").await.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_empty_list() {
        let orchestrator =
            SearchOrchestrator::new(config("http://127.0.0.1:9/html/".into(), 5)).unwrap();
        assert!(orchestrator.search("q").await.is_empty());
    }
}
