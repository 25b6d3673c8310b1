//! Core pipeline orchestration and inference for Answerline.
//!
//! This crate ties together search, inference, and response formatting into
//! the end-to-end `answer` workflow, exposed through [`PipelineCoordinator`].

pub mod inference;
pub mod models;
pub mod pipeline;
pub mod process;
pub mod prompt;

pub use inference::{InferenceClient, InferenceMode, InferenceOutcome, InferenceRequest, SamplingOptions};
pub use models::{list_models, parse_model_list};
pub use pipeline::{Inference, PipelineCoordinator, Reply, SilentStatus, Status, StatusSink, WebSearch};
