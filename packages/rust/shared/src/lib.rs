//! Shared types, error model, and configuration for Answerline.
//!
//! This crate is the foundation depended on by all other Answerline crates.
//! It provides:
//! - [`AnswerlineError`]: the unified error type
//! - Domain types ([`Query`], [`Turn`], [`SearchResult`], [`SearchContext`], [`PipelineOutcome`])
//! - Configuration ([`AppConfig`], runtime views, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, HistorySection, InferenceConfig, InferenceSection, OutputSection, PipelineConfig,
    SearchConfig, SearchSection, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{AnswerlineError, Result};
pub use types::{PipelineOutcome, Query, RequestId, SearchContext, SearchResult, Turn};
