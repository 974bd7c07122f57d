//! Configuration models for dynaschema.
//!
//! All I^R (resolvable ignorance) is parameterized here: models, retry
//! budgets and the batch policy. Every section has serde defaults, so an
//! empty (or missing) file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Top-level configuration for dynaschema.
///
/// I^R resolved: All configurable parameters are explicit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion service connection
    #[serde(default)]
    pub service: ServiceConfig,

    /// Schema inference and extraction pipeline
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Quiz generation pipeline
    #[serde(default)]
    pub quiz: QuizConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Connection to an OpenAI-compatible endpoint.
///
/// K_i: The endpoint implements the chat completions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API key (supports ${ENV_VAR} expansion)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// HTTP-level retries for rate limits, 5xx and network failures
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,

    /// Send `response_format` with a JSON schema. Disable for endpoints
    /// that reject it; the schema is still given in the prompt.
    #[serde(default = "default_true")]
    pub structured_outputs: bool,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_transport_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            transport_retries: default_transport_retries(),
            structured_outputs: true,
        }
    }
}

/// Specification for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model ID as the endpoint knows it (e.g. "gpt-4o-mini", "llama3.3:70b")
    pub id: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Completion token limit (endpoint default when unset)
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_model_id() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

impl ModelSpec {
    pub fn new(id: impl Into<String>, temperature: f64) -> Self {
        Self {
            id: id.into(),
            temperature,
            max_tokens: None,
        }
    }

    fn creative() -> Self {
        Self::new(default_model_id(), 0.7)
    }

    fn deterministic() -> Self {
        Self::new(default_model_id(), 0.0)
    }
}

/// Schema inference and extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Model that proposes the properties of a concept
    #[serde(default = "ModelSpec::creative")]
    pub inference_model: ModelSpec,

    /// Model that fills records from the corpus
    #[serde(default = "ModelSpec::deterministic")]
    pub extraction_model: ModelSpec,

    /// Re-asks for an invalid schema proposal
    #[serde(default = "default_retries")]
    pub inference_retries: u32,

    /// Re-asks for invalid extracted records
    #[serde(default = "default_retries")]
    pub extraction_retries: u32,
}

fn default_retries() -> u32 {
    2
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            inference_model: ModelSpec::creative(),
            extraction_model: ModelSpec::deterministic(),
            inference_retries: default_retries(),
            extraction_retries: default_retries(),
        }
    }
}

/// What a quiz run does when one question cannot be validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Log, count and move on to the next question
    #[default]
    Skip,
    /// Stop the run with the error
    Abort,
}

/// Quiz generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    /// Model that writes questions
    #[serde(default = "ModelSpec::creative")]
    pub generation_model: ModelSpec,

    /// Model that checks each wrong answer
    #[serde(default = "ModelSpec::deterministic")]
    pub validation_model: ModelSpec,

    /// Re-asks for an invalid generated question
    #[serde(default = "default_retries")]
    pub generation_retries: u32,

    /// Re-asks for an invalid verification
    #[serde(default = "default_validation_retries")]
    pub validation_retries: u32,

    /// Questions generated per run
    #[serde(default = "default_questions")]
    pub questions: usize,

    #[serde(default)]
    pub on_unresolved: UnresolvedPolicy,
}

fn default_validation_retries() -> u32 {
    1
}

fn default_questions() -> usize {
    2
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            generation_model: ModelSpec::creative(),
            validation_model: ModelSpec::deterministic(),
            generation_retries: default_retries(),
            validation_retries: default_validation_retries(),
            questions: default_questions(),
            on_unresolved: UnresolvedPolicy::Skip,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSONL output file (stdout when unset)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Attach token usage to every output row
    #[serde(default = "default_true")]
    pub include_usage: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            include_usage: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the API key from config or environment.
    ///
    /// `None` means no key is configured, which is fine for local
    /// endpoints; the service reports `AuthenticationFailed` otherwise.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.service.api_key {
            return Some(expand_env_vars(key));
        }
        std::env::var(&self.service.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let models = [
            ("extraction.inference_model", &self.extraction.inference_model),
            ("extraction.extraction_model", &self.extraction.extraction_model),
            ("quiz.generation_model", &self.quiz.generation_model),
            ("quiz.validation_model", &self.quiz.validation_model),
        ];
        for (key, spec) in models {
            if spec.id.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: "model id is empty".to_string(),
                });
            }
            if !(0.0..=2.0).contains(&spec.temperature) {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: format!("temperature {} is outside [0, 2]", spec.temperature),
                });
            }
        }

        if self.quiz.questions == 0 {
            return Err(ConfigError::Invalid {
                key: "quiz.questions".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.service.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "service.base_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

static ENV_VAR: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern"));

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    for cap in ENV_VAR.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// - B_i falsified: File not readable, parse error
/// - I^R unresolved: Value out of range
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}
