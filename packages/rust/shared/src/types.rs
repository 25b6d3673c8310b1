//! Core domain types shared by the search, inference and pipeline crates.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one `answer` call in logs (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a new time-sortable request identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// One prior exchange of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// What the user said.
    pub user: String,
    /// What the assistant answered.
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// An immutable user query plus everything needed to answer it.
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    ends_with_question: bool,
    model: String,
    history: Vec<Turn>,
}

impl Query {
    /// Build a query with no history.
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        let text = text.into();
        let ends_with_question = text.trim_end().ends_with('?');
        Self {
            text,
            ends_with_question,
            model: model.into(),
            history: Vec::new(),
        }
    }

    /// Attach prior turns (oldest first).
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the text ends with `?` once trailing whitespace is trimmed.
    pub fn ends_with_question(&self) -> bool {
        self.ends_with_question
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

// ---------------------------------------------------------------------------
// SearchResult
// ---------------------------------------------------------------------------

/// A single entry of a search listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based position among the retained entries, in engine order.
    pub rank: usize,
    /// Result title.
    pub title: String,
    /// Absolute HTTP(S) link.
    pub url: String,
    /// Snippet, replaced by scraped page text when scraping succeeds.
    pub body: String,
}

// ---------------------------------------------------------------------------
// SearchContext
// ---------------------------------------------------------------------------

/// Formatted search results handed to the model in place of history.
///
/// Immutable once built; [`SearchContext::into_text`] consumes it.
#[derive(Debug, Clone)]
pub struct SearchContext {
    text: String,
    generated_at: DateTime<Local>,
}

impl SearchContext {
    pub fn new(text: String, generated_at: DateTime<Local>) -> Self {
        Self { text, generated_at }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn generated_at(&self) -> DateTime<Local> {
        self.generated_at
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

// ---------------------------------------------------------------------------
// PipelineOutcome
// ---------------------------------------------------------------------------

/// How a query's processing ended. Every variant carries presentable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The model answered on the first route taken.
    Answered(String),
    /// Search failed or came back empty; the direct route answered instead.
    FallbackAnswered(String),
    /// The inference deadline was exceeded.
    TimedOut(String),
    /// The inference step failed or returned nothing.
    Errored(String),
}

impl PipelineOutcome {
    /// The text to deliver, whatever the outcome.
    pub fn text(&self) -> &str {
        match self {
            Self::Answered(text)
            | Self::FallbackAnswered(text)
            | Self::TimedOut(text)
            | Self::Errored(text) => text,
        }
    }

    /// Whether the model actually produced an answer.
    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answered(_) | Self::FallbackAnswered(_))
    }
}
