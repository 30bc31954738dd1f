use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chat::{ChatConfig, DEFAULT_SIMILARITY_TOP_K, DEFAULT_TOKEN_LIMIT};
use crate::embed::hash::DEFAULT_HASH_DIM;
use crate::embed::gemini::{DEFAULT_EMBEDDING_MODEL, DEFAULT_GEMINI_EMBEDDING_DIM};
use crate::error::{RagError, Result};
use crate::eval::{DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RESUME_CHARS, EvaluatorConfig};
use crate::gemini::{API_KEY_ENV_VAR, DEFAULT_ENDPOINT};
use crate::llm::{
    DEFAULT_LLM_MODEL, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE, GenerationConfig,
};
use crate::rerank::{DEFAULT_BOOST_WEIGHT, DEFAULT_TOP_N, RerankPolicy};
use crate::retrieval::{DEFAULT_TOP_K, RetrievalConfig};
use crate::retry::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, RetryPolicy,
};
use crate::store::DEFAULT_EXTENSIONS;

pub const CONFIG_DIR_NAME: &str = "hireflow";
pub const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local feature hashing; no network, no key.
    Hash,
    Gemini,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub resume_dir: PathBuf,
    pub index_path: PathBuf,
    pub ingest: IngestSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub rerank: RerankSettings,
    pub evaluation: EvaluationSettings,
    pub chat: ChatSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resume_dir: PathBuf::from("data"),
            index_path: PathBuf::from("vector_store/index.jsonl"),
            ingest: IngestSettings::default(),
            embedding: EmbeddingSettings::default(),
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
            rerank: RerankSettings::default(),
            evaluation: EvaluationSettings::default(),
            chat: ChatSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub extensions: Vec<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    /// Gemini embedding model; ignored by the hash backend.
    pub model: String,
    /// Vector size; `None` picks the backend's default.
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: None,
        }
    }
}

impl EmbeddingSettings {
    pub fn effective_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(match self.backend {
            EmbeddingBackend::Hash => DEFAULT_HASH_DIM,
            EmbeddingBackend::Gemini => DEFAULT_GEMINI_EMBEDDING_DIM,
        })
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub top_n: usize,
    /// Non-empty turns on keyword-boosted reranking.
    pub keywords: Vec<String>,
    pub boost_weight: f32,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            keywords: Vec::new(),
            boost_weight: DEFAULT_BOOST_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub max_concurrency: usize,
    pub max_attempts: u32,
    #[serde(with = "duration_str")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_str")]
    pub max_backoff: Duration,
    pub max_resume_chars: usize,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_resume_chars: DEFAULT_MAX_RESUME_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub token_limit: usize,
    pub similarity_top_k: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            token_limit: DEFAULT_TOKEN_LIMIT,
            similarity_top_k: DEFAULT_SIMILARITY_TOP_K,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl Settings {
    /// Defaults overlaid with a TOML file. An explicit path must exist; the
    /// per-user default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(RagError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match default_config_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };
        tracing::debug!("Loading config from {}", path.display());
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| RagError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&contents)
            .map_err(|e| RagError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Overlay environment variables. `lookup` is `std::env::var` in the
    /// binary and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get(API_KEY_ENV_VAR) {
            self.llm.api_key = Some(key);
        }
        if let Some(v) = get("TOP_K_CANDIDATES") {
            self.retrieval.top_k = parse_env("TOP_K_CANDIDATES", &v)?;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("TEMPERATURE") {
            self.llm.temperature = parse_env("TEMPERATURE", &v)?;
        }
        if let Some(v) = get("MAX_OUTPUT_TOKENS") {
            self.llm.max_output_tokens = parse_env("MAX_OUTPUT_TOKENS", &v)?;
        }
        if let Some(v) = get("HIREFLOW_RESUME_DIR") {
            self.resume_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(RagError::Config(msg.to_string()));
        if self.retrieval.top_k == 0 {
            return fail("retrieval.top_k must be at least 1");
        }
        if self.rerank.top_n == 0 {
            return fail("rerank.top_n must be at least 1");
        }
        if !self.rerank.boost_weight.is_finite() || self.rerank.boost_weight < 0.0 {
            return fail("rerank.boost_weight must be a non-negative number");
        }
        let keywords = &self.rerank.keywords;
        if !keywords.is_empty() && keywords.iter().all(|k| k.trim().is_empty()) {
            return fail("rerank.keywords contains only blank entries");
        }
        if self.evaluation.max_concurrency == 0 {
            return fail("evaluation.max_concurrency must be at least 1");
        }
        if self.evaluation.max_attempts == 0 {
            return fail("evaluation.max_attempts must be at least 1");
        }
        if !self.llm.temperature.is_finite() || self.llm.temperature < 0.0 {
            return fail("llm.temperature must be a non-negative number");
        }
        if self.llm.max_output_tokens == 0 {
            return fail("llm.max_output_tokens must be at least 1");
        }
        if self.chat.similarity_top_k == 0 {
            return fail("chat.similarity_top_k must be at least 1");
        }
        if self.ingest.extensions.iter().all(|e| e.trim().is_empty()) {
            return fail("ingest.extensions must name at least one extension");
        }
        if self.embedding.effective_dimensions() == 0 {
            return fail("embedding.dimensions must be at least 1");
        }
        Ok(())
    }

    /// The API key, or a `Config` error naming where to put one.
    pub fn require_api_key(&self) -> Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RagError::Config(format!(
                    "{API_KEY_ENV_VAR} is not set (or set llm.api_key in the config file)"
                ))
            })
    }

    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.llm.temperature,
            max_output_tokens: self.llm.max_output_tokens,
            json_output: false,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.evaluation.max_attempts,
            initial_backoff: self.evaluation.initial_backoff,
            max_backoff: self.evaluation.max_backoff,
        }
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            top_k: self.retrieval.top_k,
        }
    }

    pub fn rerank_policy(&self) -> RerankPolicy {
        let keywords: Vec<&String> = self
            .rerank
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .collect();
        if keywords.is_empty() {
            RerankPolicy::Similarity
        } else {
            RerankPolicy::keyword_boosted(keywords.into_iter().cloned(), self.rerank.boost_weight)
        }
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            max_concurrency: self.evaluation.max_concurrency,
            retry: self.retry_policy(),
            generation: self.generation(),
            max_resume_chars: self.evaluation.max_resume_chars,
        }
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            token_limit: self.chat.token_limit,
            similarity_top_k: self.chat.similarity_top_k,
            generation: self.generation(),
        }
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| RagError::Config(format!("{name}={value:?}: {e}")))
}

/// `Duration` as a humantime string ("500ms", "30s").
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
