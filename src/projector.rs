//! Flatten a [`PatientRecord`] into the one-line summary that gets embedded
//! and shown to the model as context.
//!
//! Segments appear in a fixed order and are joined with [`SEGMENT_DELIMITER`]:
//!
//! ```text
//! Patient ID: A1 | Name: Ada | Age: 44, Gender: Female | Medical Conditions: Asthma |
//! Medications: Albuterol Inhaler | Allergies: Latex | Current BP: 128/82 | Heart Rate: 72 bpm
//! ```
//!
//! A trailing `Recent Visit Note: ...` segment is added only when the patient
//! has at least one visit; it carries the note of the last appended visit.

use crate::models::PatientRecord;

pub const SEGMENT_DELIMITER: &str = " | ";

/// Project a record to its text summary. Pure and total: empty lists join to
/// an empty string.
pub fn patient_to_text(patient: &PatientRecord) -> String {
    let demo = &patient.demographics;
    let history = &patient.medical_history;

    let mut segments = vec![
        format!("Patient ID: {}", patient.patient_id),
        format!("Name: {}", demo.name),
        format!("Age: {}, Gender: {}", demo.age, demo.gender),
        format!("Medical Conditions: {}", history.conditions.join(", ")),
        format!("Medications: {}", patient.medications.join(", ")),
        format!("Allergies: {}", history.allergies.join(", ")),
        format!("Current BP: {}", patient.current_vitals.blood_pressure),
        format!("Heart Rate: {} bpm", patient.current_vitals.heart_rate),
    ];

    if let Some(visit) = patient.latest_visit() {
        segments.push(format!("Recent Visit Note: {}", visit.notes));
    }

    segments.join(SEGMENT_DELIMITER)
}
