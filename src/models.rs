//! # Patient record model
//!
//! Serde types for the record file (`data/patients.json` by default). The field
//! names are the on-disk JSON keys, so a file written by [`save_records`] reads
//! back into identical values with [`load_records`].
//!
//! Records are created once (generated or loaded) and never mutated afterwards.
//! `visit_history` keeps insertion order, which is not necessarily chronological.
//!
//! ```no_run
//! use patient_rag::models::load_records;
//!
//! # fn main() -> patient_rag::error::Result<()> {
//! let records = load_records("data/patients.json")?;
//! println!("{} patients", records.len());
//! # Ok(()) }
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::debug;

use crate::error::{RagError, Result};

/// One patient, as stored in the record file and carried in index payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Opaque identifier, unique within a dataset.
    pub patient_id: String,
    pub demographics: Demographics,
    pub medical_history: MedicalHistory,
    /// Free-text drug and dose strings, e.g. `"Metformin 500mg"`.
    #[serde(default)]
    pub medications: Vec<String>,
    pub current_vitals: Vitals,
    #[serde(default)]
    pub visit_history: Vec<Visit>,
    pub insurance: Insurance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub name: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    pub gender: String,
    pub age: u32,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalHistory {
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub family_history: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// `"systolic/diastolic"`
    pub blood_pressure: String,
    pub heart_rate: u32,
    /// Fahrenheit.
    pub temperature: f64,
    pub weight_kg: u32,
    pub height_cm: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub date: String,
    #[serde(rename = "type")]
    pub visit_type: String,
    pub provider: String,
    pub notes: String,
    pub vitals: Vitals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    pub provider: String,
    pub policy_number: String,
}

impl PatientRecord {
    /// The most recently appended visit, if any.
    pub fn latest_visit(&self) -> Option<&Visit> {
        self.visit_history.last()
    }
}

/// Load every record from a JSON file containing a list of records.
///
/// The whole file is read at once; there is no streaming or partial load.
///
/// # Errors
/// - [`RagError::Io`] if the file cannot be read.
/// - [`RagError::RecordFormat`] if it is not a list of records.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<PatientRecord>> {
    let path = path.as_ref();
    debug!("Loading patient records from {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| RagError::RecordFormat {
        path: path.to_path_buf(),
        source,
    })
}

/// Write records as pretty-printed JSON, creating parent directories as needed.
pub fn save_records(path: impl AsRef<Path>, records: &[PatientRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json).map_err(|e| RagError::io(path, e))?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    fn vitals() -> Vitals {
        Vitals {
            blood_pressure: "128/82".to_string(),
            heart_rate: 72,
            temperature: 98.6,
            weight_kg: 70,
            height_cm: 172,
        }
    }

    /// A patient with a single condition and no visits.
    pub fn patient(id: &str, condition: &str) -> PatientRecord {
        PatientRecord {
            patient_id: id.to_string(),
            demographics: Demographics {
                name: format!("Patient {id}"),
                date_of_birth: "1980-04-12".to_string(),
                gender: "Female".to_string(),
                age: 44,
                phone: "555-0100".to_string(),
                email: "patient@example.com".to_string(),
                address: "1 Main St, Springfield, IL 62701".to_string(),
            },
            medical_history: MedicalHistory {
                conditions: vec![condition.to_string()],
                allergies: vec!["Latex".to_string()],
                family_history: vec!["Diabetes".to_string()],
            },
            medications: vec![],
            current_vitals: vitals(),
            visit_history: vec![],
            insurance: Insurance {
                provider: "Aetna".to_string(),
                policy_number: "0A1B2C3D-4E5".to_string(),
            },
        }
    }

    pub fn visit(notes: &str) -> Visit {
        Visit {
            date: "2024-03-01".to_string(),
            visit_type: "Follow-up".to_string(),
            provider: "Dr. Jane Roe".to_string(),
            notes: notes.to_string(),
            vitals: vitals(),
        }
    }
}
