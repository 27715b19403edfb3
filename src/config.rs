//! This module provides functionality for loading and validating the application's configuration.
//!
//! [`RagConfig`] is an explicit value handed to the pipeline at construction time. It is
//! resolved in layers, later layers winning:
//!
//! 1. built-in defaults ([`RagConfig::default`]),
//! 2. a YAML file ([`load_config`]),
//! 3. environment variables ([`RagConfig::apply_env`]), including a `.env` file loaded by the binary,
//! 4. command-line flags (applied by `main`).
//!
//! # Examples
//!
//! ```no_run
//! use patient_rag::config::{load_config, RagConfig};
//!
//! let config: RagConfig = load_config("/path/to/config.yaml").unwrap().apply_env().unwrap();
//! println!("{:?}", config.top_k);
//! ```

use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, str::FromStr};
use tracing::debug;

use crate::error::{RagError, Result};

pub const API_KEY_VAR: &str = "GROQ_API_KEY";

/// Which [`VectorIndex`](crate::vector_store::VectorIndex) implementation to open.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Hnsw,
    Flat,
}

impl FromStr for IndexBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hnsw" => Ok(IndexBackend::Hnsw),
            "flat" => Ok(IndexBackend::Flat),
            other => Err(RagError::Config(format!("unknown index backend `{other}`"))),
        }
    }
}

/// Represents the application's configuration.
///
/// Every field has a default except `api_key`, which defaults to empty and is
/// only required by commands that call the completion endpoint.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RagConfig {
    /// Credential for the completion endpoint (`GROQ_API_KEY`).
    pub api_key: String,

    /// Base URL of the OpenAI-compatible completion API.
    pub api_base: String,

    /// Hugging Face model id of the sentence embedder, or `hash`.
    pub embedding_model: String,

    /// Model used for answer generation.
    pub llm_model: String,

    pub collection_name: String,

    /// Must match the embedder's output dimension.
    pub vector_size: usize,

    /// Number of records retrieved per question.
    pub top_k: usize,

    pub temperature: f32,

    pub max_tokens: u32,

    /// JSON file holding the patient records.
    pub patient_data_path: String,

    pub index_backend: IndexBackend,

    /// Name of a prompt template under `<config_dir>/templates`; built-in prompt when unset.
    pub template: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.groq.com/openai/v1".to_string(),
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            llm_model: "mixtral-8x7b-32768".to_string(),
            collection_name: "patient_records".to_string(),
            vector_size: 384,
            top_k: 5,
            temperature: 0.1,
            max_tokens: 500,
            patient_data_path: "data/patients.json".to_string(),
            index_backend: IndexBackend::Hnsw,
            template: None,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RagError::Config(format!("{key}={value:?} is invalid: {e}")))
}

impl RagConfig {
    /// Overlay values from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps a variable name to its value.
    ///
    /// Recognized variables: `GROQ_API_KEY`, `RAG_API_BASE`, `RAG_EMBEDDING_MODEL`,
    /// `RAG_LLM_MODEL`, `RAG_COLLECTION_NAME`, `RAG_VECTOR_SIZE`, `RAG_TOP_K`,
    /// `RAG_TEMPERATURE`, `RAG_MAX_TOKENS`, `RAG_PATIENT_DATA_PATH`,
    /// `RAG_INDEX_BACKEND`, `RAG_TEMPLATE`.
    ///
    /// # Errors
    /// [`RagError::Config`] when a numeric or enum variable does not parse.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(API_KEY_VAR) {
            self.api_key = v;
        }
        if let Some(v) = lookup("RAG_API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = lookup("RAG_EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Some(v) = lookup("RAG_LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = lookup("RAG_COLLECTION_NAME") {
            self.collection_name = v;
        }
        if let Some(v) = lookup("RAG_VECTOR_SIZE") {
            self.vector_size = parse_var("RAG_VECTOR_SIZE", &v)?;
        }
        if let Some(v) = lookup("RAG_TOP_K") {
            self.top_k = parse_var("RAG_TOP_K", &v)?;
        }
        if let Some(v) = lookup("RAG_TEMPERATURE") {
            self.temperature = parse_var("RAG_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("RAG_MAX_TOKENS") {
            self.max_tokens = parse_var("RAG_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("RAG_PATIENT_DATA_PATH") {
            self.patient_data_path = v;
        }
        if let Some(v) = lookup("RAG_INDEX_BACKEND") {
            self.index_backend = v.parse()?;
        }
        if let Some(v) = lookup("RAG_TEMPLATE") {
            self.template = Some(v).filter(|t| !t.is_empty());
        }
        Ok(self)
    }

    /// Structural checks that do not depend on the command being run.
    pub fn validate(&self) -> Result<()> {
        if self.vector_size == 0 {
            return Err(RagError::Config("vector_size must be non-zero".into()));
        }
        if self.collection_name.trim().is_empty() {
            return Err(RagError::Config("collection_name must not be empty".into()));
        }
        Ok(())
    }

    /// The completion credential, or a configuration error when it is missing.
    pub fn require_api_key(&self) -> Result<&str> {
        if self.api_key.trim().is_empty() {
            return Err(RagError::Config(format!(
                "missing API credential; set {API_KEY_VAR} or `api_key` in config.yaml"
            )));
        }
        Ok(&self.api_key)
    }
}

/// Loads the application's configuration from a YAML file.
///
/// Keys missing from the file keep their defaults.
///
/// # Errors
/// - [`RagError::Io`] if the file cannot be read.
/// - [`RagError::Yaml`] if it is not valid YAML for [`RagConfig`].
pub fn load_config(file: impl AsRef<Path>) -> Result<RagConfig> {
    let file = file.as_ref();
    debug!("Loading config from {}", file.display());
    let content = fs::read_to_string(file).map_err(|e| RagError::io(file, e))?;
    let config: RagConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
