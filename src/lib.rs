//! # patient_rag (library root)
//!
//! Retrieval-augmented question answering over patient records:
//!
//! 1. records are flattened to text ([`projector`]),
//! 2. embedded ([`embeddings`]) and stored in a vector index ([`vector_store`]),
//! 3. a question is embedded, its nearest records retrieved, and a grounding
//!    prompt ([`template`]) is sent to an OpenAI-compatible completion endpoint ([`api`]).
//!
//! [`pipeline::RetrievalPipeline`] ties the steps together. The embedder, the
//! index and the completer are capability traits, so each can be swapped for a
//! deterministic stand-in (see [`embeddings::HashEmbedder`] and
//! [`vector_store::FlatVectorStore`]).
//!
//! Synthetic datasets come from [`generator`]; runtime settings from [`config`].
//!
//! ## Modules
//! - [`api`], [`commands`], [`config`], [`embeddings`], [`error`], [`generator`],
//!   [`models`], [`pipeline`], [`projector`], [`template`], [`vector_store`]

use directories::ProjectDirs;

pub mod api;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod models;
pub mod pipeline;
pub mod projector;
pub mod template;
pub mod vector_store;

use error::{RagError, Result};

/// Return the per-platform configuration directory.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "patient-rag", "prag")` (e.g. `~/.config/prag` on Linux).
///
/// The directory is **not** created by this function.
///
/// # Errors
/// [`RagError::Config`] if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<std::path::PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "patient-rag", "prag")
        .ok_or_else(|| RagError::Config("unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
