//! # Error taxonomy
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error
//! side is [`RagError`]. Variants are grouped by the stage that produced them:
//!
//! - **configuration**: [`RagError::Config`] (fatal at startup)
//! - **ingestion**: [`RagError::Io`], [`RagError::RecordFormat`],
//!   [`RagError::Embedding`], [`RagError::Ingest`]
//! - **retrieval**: [`RagError::Index`], [`RagError::NotIngested`]
//! - **generation**: [`RagError::Completion`], [`RagError::MalformedCompletion`]
//!
//! Nothing here retries; callers decide what to do with a failure.

use async_openai::error::OpenAIError;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Missing credential, dimension mismatch, bad environment value, etc.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record file is not a JSON list of patient records.
    #[error("malformed record file {}: {source}", .path.display())]
    RecordFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The first record that failed during ingestion; nothing was upserted.
    #[error("ingestion aborted at record {ordinal} ({patient_id}): {source}")]
    Ingest {
        ordinal: usize,
        patient_id: String,
        #[source]
        source: Box<RagError>,
    },

    #[error("vector index error: {0}")]
    Index(String),

    #[error("no records have been ingested yet; run ingestion before querying")]
    NotIngested,

    /// Provider error surfaced unchanged (rate limit, timeout, bad request).
    #[error("completion request failed: {0}")]
    Completion(#[from] OpenAIError),

    #[error("malformed completion response: {0}")]
    MalformedCompletion(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<candle_core::Error> for RagError {
    fn from(err: candle_core::Error) -> Self {
        RagError::Embedding(err.to_string())
    }
}

impl RagError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io {
            path: path.into(),
            source,
        }
    }
}
