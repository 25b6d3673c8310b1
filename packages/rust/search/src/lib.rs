//! Web search, page scraping, and search-context rendering.
//!
//! This crate provides:
//! - [`SearchOrchestrator`]: listing request plus bounded-parallel scraping
//! - [`ScrapeWorker`]: single-page fetch and main-content extraction
//! - [`parse_listing`]: result-listing parser with dense ranks
//! - [`build_context`] / [`format_listing`]: rendering for the model and for people

mod agents;
pub mod context;
pub mod listing;
pub mod orchestrator;
pub mod scrape;

pub use agents::random_user_agent;
pub use context::{build_context, format_listing};
pub use listing::{parse_listing, resolve_link};
pub use orchestrator::SearchOrchestrator;
pub use scrape::{ScrapeWorker, extract_text};
