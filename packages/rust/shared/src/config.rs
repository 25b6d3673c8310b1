//! Application configuration for Answerline.
//!
//! User config lives at `~/.answerline/answerline.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AnswerlineError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "answerline.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".answerline";

// ---------------------------------------------------------------------------
// Config structs (matching answerline.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inference service settings.
    #[serde(default)]
    pub inference: InferenceSection,

    /// Web search and scraping settings.
    #[serde(default)]
    pub search: SearchSection,

    /// Outgoing message settings.
    #[serde(default)]
    pub output: OutputSection,

    /// Conversation history settings.
    #[serde(default)]
    pub history: HistorySection,
}

/// `[inference]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSection {
    /// Base URL of the local inference service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model used when the caller does not pick one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Program (plus leading arguments) that performs the generate request.
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    /// Base request timeout; direct-mode requests use it as is.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound on the doubled search-mode timeout.
    #[serde(default = "default_timeout_ceiling")]
    pub timeout_ceiling_secs: u64,

    /// Extra time the supervisor waits past the process's own deadline.
    #[serde(default = "default_supervisor_grace")]
    pub supervisor_grace_secs: u64,

    /// Connect timeout handed to the process.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Exit code the process uses to report its own timeout.
    #[serde(default = "default_timeout_exit_code")]
    pub timeout_exit_code: i32,

    /// Answers are truncated to this many characters.
    #[serde(default = "default_max_answer_length")]
    pub max_answer_length: usize,

    /// Command that prints the installed models.
    #[serde(default = "default_list_command")]
    pub list_command: Vec<String>,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_model: default_model(),
            command: default_command(),
            request_timeout_secs: default_request_timeout(),
            timeout_ceiling_secs: default_timeout_ceiling(),
            supervisor_grace_secs: default_supervisor_grace(),
            connect_timeout_secs: default_connect_timeout(),
            timeout_exit_code: default_timeout_exit_code(),
            max_answer_length: default_max_answer_length(),
            list_command: default_list_command(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "qwen3:14b-q8_0".into()
}
fn default_command() -> Vec<String> {
    vec!["curl".into()]
}
fn default_request_timeout() -> u64 {
    300
}
fn default_timeout_ceiling() -> u64 {
    300
}
fn default_supervisor_grace() -> u64 {
    10
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_timeout_exit_code() -> i32 {
    28
}
fn default_max_answer_length() -> usize {
    4000
}
fn default_list_command() -> Vec<String> {
    vec!["ollama".into(), "list".into()]
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Whether `?`-terminated queries may trigger a web search.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTML results endpoint of the search engine.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Region code sent with every search.
    #[serde(default = "default_region")]
    pub region: String,

    /// Maximum number of results kept from the listing.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// How many of the top results get their page scraped.
    #[serde(default = "default_pages_to_scrape")]
    pub pages_to_scrape: usize,

    /// Timeout for the listing request.
    #[serde(default = "default_search_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for each page fetch.
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,

    /// Scraped text is truncated to this many characters.
    #[serde(default = "default_scrape_max_chars")]
    pub scrape_max_chars: usize,

    /// Concurrent page fetches allowed across all requests.
    #[serde(default = "default_scrape_concurrency")]
    pub scrape_concurrency: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_search_endpoint(),
            region: default_region(),
            max_results: default_max_results(),
            pages_to_scrape: default_pages_to_scrape(),
            request_timeout_secs: default_search_timeout(),
            scrape_timeout_secs: default_scrape_timeout(),
            scrape_max_chars: default_scrape_max_chars(),
            scrape_concurrency: default_scrape_concurrency(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_search_endpoint() -> String {
    "https://html.duckduckgo.com/html/".into()
}
fn default_region() -> String {
    "ru-ru".into()
}
fn default_max_results() -> usize {
    10
}
fn default_pages_to_scrape() -> usize {
    5
}
fn default_search_timeout() -> u64 {
    8
}
fn default_scrape_timeout() -> u64 {
    5
}
fn default_scrape_max_chars() -> usize {
    1500
}
fn default_scrape_concurrency() -> usize {
    5
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Maximum length of one delivered chunk.
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            chunk_limit: default_chunk_limit(),
        }
    }
}

fn default_chunk_limit() -> usize {
    4096
}

/// `[history]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySection {
    /// Number of prior turns kept for direct-mode prompts.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    20
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.inference.endpoint).map_err(|e| {
            AnswerlineError::validation(format!(
                "inference.endpoint '{}' is not a URL: {e}",
                self.inference.endpoint
            ))
        })?;
        url::Url::parse(&self.search.endpoint).map_err(|e| {
            AnswerlineError::validation(format!(
                "search.endpoint '{}' is not a URL: {e}",
                self.search.endpoint
            ))
        })?;

        if self.inference.command.is_empty() {
            return Err(AnswerlineError::validation("inference.command is empty"));
        }
        if self.inference.list_command.is_empty() {
            return Err(AnswerlineError::validation("inference.list_command is empty"));
        }

        let positive = [
            ("inference.request_timeout_secs", self.inference.request_timeout_secs as usize),
            ("inference.timeout_ceiling_secs", self.inference.timeout_ceiling_secs as usize),
            ("inference.supervisor_grace_secs", self.inference.supervisor_grace_secs as usize),
            ("inference.max_answer_length", self.inference.max_answer_length),
            ("search.max_results", self.search.max_results),
            ("search.request_timeout_secs", self.search.request_timeout_secs as usize),
            ("search.scrape_timeout_secs", self.search.scrape_timeout_secs as usize),
            ("search.scrape_max_chars", self.search.scrape_max_chars),
            ("search.scrape_concurrency", self.search.scrape_concurrency),
            ("output.chunk_limit", self.output.chunk_limit),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(AnswerlineError::validation(format!("{key} must be positive")));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// HTML results endpoint.
    pub endpoint: String,
    /// Region code.
    pub region: String,
    /// Cap on retained results.
    pub max_results: usize,
    /// Number of top results whose pages are scraped.
    pub pages_to_scrape: usize,
    /// Listing request timeout.
    pub request_timeout: Duration,
    /// Per-page fetch timeout.
    pub scrape_timeout: Duration,
    /// Cap on scraped text length.
    pub scrape_max_chars: usize,
    /// Cross-request cap on concurrent page fetches.
    pub scrape_concurrency: usize,
}

impl From<&AppConfig> for SearchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.search.endpoint.clone(),
            region: config.search.region.clone(),
            max_results: config.search.max_results,
            pages_to_scrape: config.search.pages_to_scrape,
            request_timeout: Duration::from_secs(config.search.request_timeout_secs),
            scrape_timeout: Duration::from_secs(config.search.scrape_timeout_secs),
            scrape_max_chars: config.search.scrape_max_chars,
            scrape_concurrency: config.search.scrape_concurrency,
        }
    }
}

/// Runtime inference configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the inference service.
    pub endpoint: String,
    /// Program plus leading arguments for the generate invocation.
    pub command: Vec<String>,
    /// Direct-mode timeout.
    pub base_timeout: Duration,
    /// Ceiling for the search-mode timeout.
    pub timeout_ceiling: Duration,
    /// Supervisor grace on top of the process deadline.
    pub supervisor_grace: Duration,
    /// Connect timeout handed to the process.
    pub connect_timeout: Duration,
    /// Exit code meaning "the process hit its own deadline".
    pub timeout_exit_code: i32,
    /// Answers are truncated to this many characters.
    pub max_answer_length: usize,
}

impl From<&AppConfig> for InferenceConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.inference.endpoint.clone(),
            command: config.inference.command.clone(),
            base_timeout: Duration::from_secs(config.inference.request_timeout_secs),
            timeout_ceiling: Duration::from_secs(config.inference.timeout_ceiling_secs),
            supervisor_grace: Duration::from_secs(config.inference.supervisor_grace_secs),
            connect_timeout: Duration::from_secs(config.inference.connect_timeout_secs),
            timeout_exit_code: config.inference.timeout_exit_code,
            max_answer_length: config.inference.max_answer_length,
        }
    }
}

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Master switch for the search path.
    pub search_enabled: bool,
    /// Transport message-size limit.
    pub chunk_limit: usize,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            search_enabled: config.search.enabled,
            chunk_limit: config.output.chunk_limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.answerline/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AnswerlineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.answerline/answerline.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AnswerlineError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        AnswerlineError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AnswerlineError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AnswerlineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AnswerlineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("default_model"));
        assert!(toml_str.contains("chunk_limit"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.inference.request_timeout_secs, 300);
        assert_eq!(parsed.search.pages_to_scrape, 5);
        assert_eq!(parsed.output.chunk_limit, 4096);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
[search]
enabled = false
max_results = 3

[inference]
command = ["/usr/local/bin/curl", "--silent"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(!config.search.enabled);
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.search.scrape_max_chars, 1500);
        assert_eq!(config.inference.command.len(), 2);
        assert_eq!(config.inference.timeout_exit_code, 28);
        assert_eq!(config.history.max_turns, 20);
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();

        let search = SearchConfig::from(&app);
        assert_eq!(search.max_results, 10);
        assert_eq!(search.scrape_timeout, Duration::from_secs(5));

        let inference = InferenceConfig::from(&app);
        assert_eq!(inference.base_timeout, Duration::from_secs(300));
        assert_eq!(inference.supervisor_grace, Duration::from_secs(10));
        assert_eq!(inference.command, vec!["curl".to_string()]);

        let pipeline = PipelineConfig::from(&app);
        assert!(pipeline.search_enabled);
        assert_eq!(pipeline.chunk_limit, 4096);
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_chunk_limit() {
        let mut config = AppConfig::default();
        config.output.chunk_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output.chunk_limit"));
    }

    #[test]
    fn validate_rejects_zero_supervisor_grace() {
        let mut config = AppConfig::default();
        config.inference.supervisor_grace_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inference.supervisor_grace_secs"));
    }

    #[test]
    fn validate_rejects_empty_command() {
        let mut config = AppConfig::default();
        config.inference.command.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_endpoint() {
        let mut config = AppConfig::default();
        config.inference.endpoint = "not a url".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inference.endpoint"));
    }
}
