//! End-to-end `answer` pipeline: query → (search → context) → inference → chunks.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use tracing::{Instrument, info, info_span, warn};

use answerline_search::{SearchOrchestrator, build_context};
use answerline_shared::{PipelineConfig, PipelineOutcome, Query, RequestId, Result, SearchContext, SearchResult, Turn};

use crate::inference::{InferenceClient, InferenceOutcome};

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Web search capability used by the coordinator.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Ranked results for `query`. An `Err` triggers the fallback route.
    async fn try_search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

#[async_trait]
impl WebSearch for SearchOrchestrator {
    async fn try_search(&self, query: &str) -> Result<Vec<SearchResult>> {
        SearchOrchestrator::try_search(self, query).await
    }
}

/// Model inference capability used by the coordinator.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn infer_direct(&self, query: &str, history: &[Turn], model: &str) -> InferenceOutcome;

    async fn infer_with_search(
        &self,
        query: &str,
        context: SearchContext,
        model: &str,
    ) -> InferenceOutcome;
}

#[async_trait]
impl Inference for InferenceClient {
    async fn infer_direct(&self, query: &str, history: &[Turn], model: &str) -> InferenceOutcome {
        InferenceClient::infer_direct(self, query, history, model).await
    }

    async fn infer_with_search(
        &self,
        query: &str,
        context: SearchContext,
        model: &str,
    ) -> InferenceOutcome {
        InferenceClient::infer_with_search(self, query, context, model).await
    }
}

// ---------------------------------------------------------------------------
// Status notices
// ---------------------------------------------------------------------------

/// Intermediate notices a caller may surface while an answer is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Searching,
    Analyzing { results: usize },
    FallbackNoResults,
    FallbackSearchError,
}

impl Status {
    pub fn message(&self) -> String {
        match self {
            Self::Searching => "Searching the web...".to_string(),
            Self::Analyzing { results } => format!("Found {results} results, analyzing..."),
            Self::FallbackNoResults => {
                "Nothing found on the web, answering from the model alone...".to_string()
            }
            Self::FallbackSearchError => {
                "Web search failed, answering from the model alone...".to_string()
            }
        }
    }
}

/// Receiver for status notices.
pub trait StatusSink: Send + Sync {
    fn notify(&self, status: Status);
}

/// No-op sink for headless/test usage.
pub struct SilentStatus;

impl StatusSink for SilentStatus {
    fn notify(&self, _status: Status) {}
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Final result of one `answer` call.
#[derive(Debug, Clone)]
pub struct Reply {
    pub outcome: PipelineOutcome,
    /// Outcome text, cleaned and split for the transport. Never empty.
    pub chunks: Vec<String>,
}

/// Decides the route for each query and turns every result into text.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    inference: Arc<dyn Inference>,
    search: Option<Arc<dyn WebSearch>>,
}

impl PipelineCoordinator {
    /// A coordinator without search capability.
    pub fn new(config: PipelineConfig, inference: Arc<dyn Inference>) -> Self {
        Self {
            config,
            inference,
            search: None,
        }
    }

    /// Attach a search capability.
    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Search runs only when available, enabled, requested, and the query ends in `?`.
    pub fn should_search(&self, query: &Query, enable_search: bool) -> bool {
        self.search.is_some()
            && self.config.search_enabled
            && enable_search
            && query.ends_with_question()
    }

    /// Answer `query`. Always yields presentable text.
    pub async fn answer(&self, query: &Query, enable_search: bool, status: &dyn StatusSink) -> Reply {
        let request_id = RequestId::new();
        let span = info_span!("answer", %request_id, model = %query.model());
        self.answer_inner(query, enable_search, status)
            .instrument(span)
            .await
    }

    async fn answer_inner(&self, query: &Query, enable_search: bool, status: &dyn StatusSink) -> Reply {
        let start = Instant::now();
        let searching = self.should_search(query, enable_search);
        info!(
            searching,
            turns = query.history().len(),
            chars = query.text().chars().count(),
            "answering query"
        );

        let outcome = match self.search.as_deref() {
            Some(search) if searching => self.search_route(search, query, status).await,
            _ => self.direct_route(query, false).await,
        };

        let mut chunks = answerline_format::format(outcome.text(), self.config.chunk_limit);
        if chunks.iter().all(|c| c.trim().is_empty()) {
            chunks = vec![InferenceOutcome::Empty.message()];
        }

        info!(
            answered = outcome.is_answer(),
            chunks = chunks.len(),
            duration_ms = start.elapsed().as_millis(),
            "answer ready"
        );

        Reply { outcome, chunks }
    }

    async fn search_route(
        &self,
        search: &dyn WebSearch,
        query: &Query,
        status: &dyn StatusSink,
    ) -> PipelineOutcome {
        status.notify(Status::Searching);

        match search.try_search(query.text()).await {
            Ok(results) if !results.is_empty() => {
                status.notify(Status::Analyzing {
                    results: results.len(),
                });
                let context = build_context(query.text(), &results, Local::now());
                self.inference
                    .infer_with_search(query.text(), context, query.model())
                    .await
                    .into_pipeline_outcome(false)
            }
            Ok(_) => {
                info!("search returned no results, falling back to direct");
                status.notify(Status::FallbackNoResults);
                self.direct_route(query, true).await
            }
            Err(e) => {
                warn!(error = %e, "search failed, falling back to direct");
                status.notify(Status::FallbackSearchError);
                self.direct_route(query, true).await
            }
        }
    }

    async fn direct_route(&self, query: &Query, fallback: bool) -> PipelineOutcome {
        self.inference
            .infer_direct(query.text(), query.history(), query.model())
            .await
            .into_pipeline_outcome(fallback)
    }
}
