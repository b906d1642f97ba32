//! Configuration types for the committee simulator

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use config::{Config, Environment, File};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variables consulted for the generation API key, in order
pub const API_KEY_VARS: [&str; 2] = ["DEEPSEEK_API_KEY", "COMMITTEE_API_KEY"];

/// Top-level settings, layered from defaults, an optional file and `COMMITTEE_*` variables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Text-generation endpoint settings
    pub generation: GenerationSettings,
    /// Deliberation limits
    pub simulation: SimulationSettings,
    /// Artifact and template locations
    pub storage: StorageSettings,
    /// Log output
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings.
    ///
    /// With no explicit path, `committee.toml` (or any format the `config`
    /// crate recognises under that stem) in the working directory is used if
    /// present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env if present so local development picks up the API key
        let _ = dotenv();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("committee").required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("COMMITTEE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("simulation.crisis_keywords"),
            )
            .build()
            .and_then(|cfg| cfg.try_deserialize::<Settings>())
            .map_err(|e| Error::config(format!("Failed to load settings: {}", e)))
    }
}

/// Chat-completions endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Base URL of an OpenAI-compatible API (the `/chat/completions` path is appended)
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per request, including the first
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub base_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            timeout_secs: 60,
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

/// Deliberation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Cap on blackboard facts
    pub max_facts: usize,
    /// Cap on blackboard uncertainties
    pub max_uncertainties: usize,
    /// Cap on chair-directed questions
    pub max_questions: usize,
    /// Phrases that switch a run into crisis mode when found in a fact
    pub crisis_keywords: Vec<String>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            max_facts: 28,
            max_uncertainties: 8,
            max_questions: 6,
            crisis_keywords: crate::meeting::blackboard::DEFAULT_CRISIS_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// Artifact and template locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root of the per-meeting run directories
    pub runs_dir: PathBuf,
    /// Directory whose templates override the built-in set
    pub prompt_dir: Option<PathBuf>,
    /// Append every generation call to the run's prompt audit log
    pub audit_prompts: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("data/meeting_runs"),
            prompt_dir: None,
            audit_prompts: true,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Resolved client configuration for the chat-completions endpoint
#[derive(Clone)]
pub struct GenerationConfig {
    /// API key
    pub api_key: SecretString,
    /// Base URL
    pub base_url: Url,
    /// Model identifier
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
}

impl GenerationConfig {
    /// Create a configuration with a specific API key and default endpoint
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_key(&GenerationSettings::default(), api_key.into())
    }

    /// Resolve settings, reading the API key from the environment
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        let _ = dotenv();
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                Error::config(format!(
                    "No API key found; set one of {}",
                    API_KEY_VARS.join(", ")
                ))
            })?;
        Self::with_key(settings, api_key)
    }

    fn with_key(settings: &GenerationSettings, api_key: String) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| Error::config(format!("Invalid base_url {}: {}", settings.base_url, e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url,
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            retry: RetryPolicy::from_settings(settings),
        })
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get the API key as a string
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Chat-completions URL
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.as_str().trim_end_matches('/'))
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.generation.model, "deepseek-chat");
        assert_eq!(settings.simulation.max_facts, 28);
        assert_eq!(settings.simulation.max_questions, 6);
        assert!(!settings.simulation.crisis_keywords.is_empty());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[generation]\nmodel = \"local-model\"\n\n[simulation]\nmax_questions = 4\n"
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.generation.model, "local-model");
        assert_eq!(settings.simulation.max_questions, 4);
        // untouched sections keep their defaults
        assert_eq!(settings.simulation.max_facts, 28);
        assert_eq!(settings.generation.max_attempts, 3);
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = GenerationConfig::new("sk-very-secret").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("REDACTED"));
        assert_eq!(config.api_key(), "sk-very-secret");
    }

    #[test]
    fn test_completions_url_joins_cleanly() {
        let config = GenerationConfig::new("k")
            .unwrap()
            .with_base_url(Url::parse("http://127.0.0.1:9000").unwrap());
        assert_eq!(config.completions_url(), "http://127.0.0.1:9000/chat/completions");
    }
}
