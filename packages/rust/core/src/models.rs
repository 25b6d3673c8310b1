//! Listing of locally installed models.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::process::run_supervised;

const LIST_TIMEOUT: Duration = Duration::from_secs(15);

/// Run the configured list command and return the installed model names.
///
/// Any failure yields an empty list.
#[instrument(skip_all, fields(command = ?command))]
pub async fn list_models(command: &[String]) -> Vec<String> {
    let output = match run_supervised(command, None, LIST_TIMEOUT).await {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "failed to list models");
            return Vec::new();
        }
    };

    if output.code != Some(0) {
        warn!(exit_code = ?output.code, stderr = %output.stderr.trim(), "model list command failed");
        return Vec::new();
    }

    let models = parse_model_list(&output.stdout);
    debug!(count = models.len(), "models listed");
    models
}

/// First column of every row, skipping the `NAME` header.
pub fn parse_model_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.starts_with("NAME"))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}
