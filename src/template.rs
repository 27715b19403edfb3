//! # Prompt template
//!
//! The grounding prompt sent to the answer generator is assembled from a
//! [`PromptTemplate`] and the retrieved records:
//!
//! ```text
//! <instructions>
//! Patient Records:
//! Patient A1: Patient ID: A1 | Name: ...
//!
//! Patient B2: Patient ID: B2 | Name: ...
//!
//! Question: <query>
//!
//! <closing>
//! ```
//!
//! The built-in template ([`PromptTemplate::default`]) tells the model to use only
//! the supplied records, answer concisely, and cite patient ids. Alternatives
//! live as YAML under the configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! ```yaml
//! instructions: "You are a triage nurse. Use ONLY the records below."
//! closing: "Answer in one sentence, citing patient IDs:"
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::info;

use crate::error::{RagError, Result};
use crate::vector_store::SearchHit;

pub const DEFAULT_TEMPLATE_NAME: &str = "patient_records";

/// Fixed text surrounding the retrieved context and the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Header restricting the model to the supplied records.
    pub instructions: String,
    /// Final line the model continues from.
    pub closing: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            instructions: "You are a healthcare assistant analyzing patient records. \
                Answer the question based ONLY on the provided patient data. \
                Be concise and clinical."
                .to_string(),
            closing: "Answer (be specific and cite patient IDs when relevant):".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Build the prompt for `query` grounded on `hits`, in rank order.
    ///
    /// Zero hits yields an empty context block; the prompt is still well formed.
    pub fn render(&self, query: &str, hits: &[SearchHit]) -> String {
        let context = hits
            .iter()
            .map(|hit| {
                format!(
                    "Patient {}: {}",
                    hit.payload.full_record.patient_id, hit.payload.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{}\nPatient Records:\n{}\n\nQuestion: {}\n\n{}",
            self.instructions, context, query, self.closing
        )
    }
}

/// Load `<dir>/templates/<name>.yaml`.
pub fn load_template_from(dir: &Path, name: &str) -> Result<PromptTemplate> {
    let path = dir.join("templates").join(format!("{name}.yaml"));
    info!("Loading template: {}", path.display());
    if !path.is_file() {
        return Err(RagError::Config(format!(
            "template `{name}` not found at {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(&path).map_err(|e| RagError::io(&path, e))?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Load a named template from the per-platform configuration directory.
pub fn load_template(name: &str) -> Result<PromptTemplate> {
    load_template_from(&crate::config_dir()?, name)
}

/// Resolve the configured template, falling back to the built-in prompt.
pub fn resolve_template(name: Option<&str>) -> Result<PromptTemplate> {
    match name {
        Some(name) => load_template(name),
        None => Ok(PromptTemplate::default()),
    }
}
