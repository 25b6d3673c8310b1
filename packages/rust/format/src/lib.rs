//! Answer formatting for message transports.
//!
//! Strips markup tags from raw model output, then splits it into chunks no
//! longer than the transport's per-message limit.

mod cleanup;
mod split;

use tracing::{debug, instrument};

pub use split::split_message;

/// Per-message limit of the default chat transport, in characters.
pub const TRANSPORT_LIMIT: usize = 4096;

/// Clean and split a raw answer into transport-sized chunks.
///
/// An answer that fits within `limit` after cleanup comes back as exactly
/// one chunk equal to the cleaned text.
#[instrument(skip(raw), fields(raw_len = raw.len()))]
pub fn format(raw: &str, limit: usize) -> Vec<String> {
    let cleaned = cleanup::run_pipeline(raw);
    let chunks = split_message(&cleaned, limit);

    debug!(
        cleaned_len = cleaned.len(),
        chunks = chunks.len(),
        "answer formatted"
    );

    chunks
}
