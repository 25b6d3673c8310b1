//! Inference client: prompt in, presentable answer text out.
//!
//! Each call spawns the configured generate command under two deadlines. The
//! soft deadline is handed to the process itself (`--max-time`); the hard
//! deadline adds a grace period and is enforced here by killing the child.
//! Output is read as newline-delimited JSON fragments and concatenated in
//! arrival order.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use answerline_shared::{
    AnswerlineError, InferenceConfig, PipelineOutcome, Result, SearchContext, Turn,
};

use crate::process::{ProcessOutput, run_supervised};
use crate::prompt::{direct_prompt, search_prompt};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of a generate request.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<SamplingOptions>,
    /// Base64-encoded images for vision models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// Sampling parameters sent with search-augmented prompts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub num_ctx: u32,
}

impl SamplingOptions {
    /// Settings for answering from search results.
    pub fn for_search() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            num_ctx: 4096,
        }
    }
}

/// One line of the service's response stream.
#[derive(Debug, Deserialize)]
struct GenerateFragment {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Text accumulated from a response body.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reassembly {
    pub text: String,
    /// Lines that parsed as fragments.
    pub fragments: usize,
    /// Non-blank lines that failed to parse.
    pub skipped: usize,
    /// Whether any fragment carried `done: true`.
    pub done: bool,
}

/// Concatenate the `response` of every parseable line, in order.
///
/// A line that fails to parse is skipped; later lines are still read.
pub fn reassemble(body: &str) -> Reassembly {
    let mut out = Reassembly::default();

    for (line_no, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<GenerateFragment>(line) {
            Ok(fragment) => {
                out.fragments += 1;
                if let Some(text) = fragment.response {
                    out.text.push_str(&text);
                }
                if let Some(message) = fragment.error {
                    warn!(line = line_no, error = %message, "service reported an error");
                }
                out.done |= fragment.done;
            }
            Err(e) => {
                let err = AnswerlineError::parse(format!("fragment on line {line_no}: {e}"));
                warn!(error = %err, "skipping malformed fragment");
                out.skipped += 1;
            }
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Which prompt shape a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceMode {
    Direct,
    Search,
    Image,
}

impl std::fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Search => f.write_str("search"),
            Self::Image => f.write_str("image"),
        }
    }
}

/// Classified result of one inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceOutcome {
    /// Non-empty answer, already truncated.
    Answer(String),
    /// The process succeeded but produced no text.
    Empty,
    /// A deadline was hit; carries the soft deadline the mode used.
    TimedOut(InferenceMode, Duration),
    /// Spawn failure or a non-zero, non-timeout exit.
    Failed(String),
}

pub const EMPTY_MESSAGE: &str = "The model returned nothing. Try rephrasing the question.";
pub const FAILED_MESSAGE: &str = "The request to the model failed.";

/// Prompt used when an image arrives without a caption.
pub const DEFAULT_IMAGE_PROMPT: &str = "What is in this picture?";

/// Message shown when a request runs out of time.
pub fn timeout_message(mode: InferenceMode, soft: Duration) -> String {
    match mode {
        InferenceMode::Direct => {
            "The model did not answer in time. Try a shorter query or a faster model.".to_string()
        }
        InferenceMode::Search => format!(
            "The model did not process the search results within {} seconds. Try:\n\
             • choosing a faster model\n\
             • simplifying the query\n\
             • raising request_timeout_secs in the config",
            soft.as_secs()
        ),
        InferenceMode::Image => {
            "The model did not describe the image in time. Try a smaller image or a vision model."
                .to_string()
        }
    }
}

impl InferenceOutcome {
    /// Presentable text for this outcome.
    pub fn message(&self) -> String {
        match self {
            Self::Answer(text) => text.clone(),
            Self::Empty => EMPTY_MESSAGE.to_string(),
            Self::TimedOut(mode, soft) => timeout_message(*mode, *soft),
            Self::Failed(_) => FAILED_MESSAGE.to_string(),
        }
    }

    /// Convert into the pipeline's outcome, marking answers from the fallback route.
    pub fn into_pipeline_outcome(self, fallback: bool) -> PipelineOutcome {
        match self {
            Self::Answer(text) if fallback => PipelineOutcome::FallbackAnswered(text),
            Self::Answer(text) => PipelineOutcome::Answered(text),
            Self::TimedOut(..) => PipelineOutcome::TimedOut(self.message()),
            Self::Empty | Self::Failed(_) => PipelineOutcome::Errored(self.message()),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Runs generate requests through the configured command.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// Deadline handed to the process for `mode`.
    pub fn soft_timeout(&self, mode: InferenceMode) -> Duration {
        match mode {
            InferenceMode::Direct | InferenceMode::Image => self.config.base_timeout,
            InferenceMode::Search => self
                .config
                .base_timeout
                .saturating_mul(2)
                .min(self.config.timeout_ceiling),
        }
    }

    /// Deadline after which the process is killed.
    pub fn hard_timeout(&self, mode: InferenceMode) -> Duration {
        self.soft_timeout(mode).saturating_add(self.config.supervisor_grace)
    }

    /// Answer from the conversation alone.
    #[instrument(skip(self, query, history), fields(turns = history.len()))]
    pub async fn infer_direct(&self, query: &str, history: &[Turn], model: &str) -> InferenceOutcome {
        let request = InferenceRequest {
            model: model.to_string(),
            prompt: direct_prompt(query, history),
            stream: false,
            options: None,
            images: None,
        };
        self.run(request, InferenceMode::Direct).await
    }

    /// Answer from search results. History is never included.
    #[instrument(skip(self, query, context), fields(context_chars = context.len()))]
    pub async fn infer_with_search(
        &self,
        query: &str,
        context: SearchContext,
        model: &str,
    ) -> InferenceOutcome {
        let request = InferenceRequest {
            model: model.to_string(),
            prompt: search_prompt(query, &context),
            stream: false,
            options: Some(SamplingOptions::for_search()),
            images: None,
        };
        self.run(request, InferenceMode::Search).await
    }

    /// Describe an image, answering `prompt` about it when given.
    #[instrument(skip(self, image, prompt), fields(image_bytes = image.len()))]
    pub async fn describe_image(
        &self,
        image: &[u8],
        prompt: Option<&str>,
        model: &str,
    ) -> InferenceOutcome {
        let prompt = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_IMAGE_PROMPT);
        let request = InferenceRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            options: None,
            images: Some(vec![base64::engine::general_purpose::STANDARD.encode(image)]),
        };
        self.run(request, InferenceMode::Image).await
    }

    async fn run(&self, request: InferenceRequest, mode: InferenceMode) -> InferenceOutcome {
        let soft = self.soft_timeout(mode);
        let hard = self.hard_timeout(mode);

        let body = match serde_json::to_vec(&request) {
            Ok(body) => body,
            Err(e) => return InferenceOutcome::Failed(format!("failed to encode request: {e}")),
        };

        info!(
            %mode,
            model = %request.model,
            prompt_chars = request.prompt.chars().count(),
            timeout_ms = soft.as_millis(),
            "sending inference request"
        );

        let result = run_supervised(&self.argv(soft), Some(body), hard).await;
        let outcome = self.classify(result, mode, soft);

        match &outcome {
            InferenceOutcome::Answer(text) => info!(chars = text.chars().count(), "answer received"),
            InferenceOutcome::Empty => warn!("model returned no text"),
            InferenceOutcome::TimedOut(..) => error!(timeout_ms = soft.as_millis(), "inference timed out"),
            InferenceOutcome::Failed(detail) => error!(detail = %detail, "inference failed"),
        }
        outcome
    }

    /// Full command line: configured program plus the generate arguments.
    fn argv(&self, soft: Duration) -> Vec<String> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        let mut argv = self.config.command.clone();
        argv.extend([
            "-sS".to_string(),
            "-X".to_string(),
            "POST".to_string(),
            url,
            "-H".to_string(),
            "Content-Type: application/json".to_string(),
            "-d".to_string(),
            "@-".to_string(),
            "--max-time".to_string(),
            soft.as_secs().max(1).to_string(),
            "--connect-timeout".to_string(),
            self.config.connect_timeout.as_secs().max(1).to_string(),
        ]);
        argv
    }

    fn classify(
        &self,
        result: Result<ProcessOutput>,
        mode: InferenceMode,
        soft: Duration,
    ) -> InferenceOutcome {
        let output = match result {
            Ok(output) => output,
            Err(AnswerlineError::Timeout(_)) => return InferenceOutcome::TimedOut(mode, soft),
            Err(e) => return InferenceOutcome::Failed(e.to_string()),
        };

        match output.code {
            Some(0) => {
                let reassembly = reassemble(&output.stdout);
                debug!(
                    fragments = reassembly.fragments,
                    skipped = reassembly.skipped,
                    done = reassembly.done,
                    "response reassembled"
                );
                if reassembly.text.is_empty() {
                    InferenceOutcome::Empty
                } else {
                    InferenceOutcome::Answer(truncate_chars(
                        reassembly.text,
                        self.config.max_answer_length,
                    ))
                }
            }
            Some(code) if code == self.config.timeout_exit_code => {
                warn!(exit_code = code, stderr = %output.stderr.trim(), "process hit its own deadline");
                InferenceOutcome::TimedOut(mode, soft)
            }
            code => InferenceOutcome::Failed(format!(
                "exit code {code:?}: {}",
                output.stderr.trim()
            )),
        }
    }
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}
