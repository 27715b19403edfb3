//! Seeded synthetic patient records.
//!
//! Names, contact details and provider names come from `fake`; everything
//! clinical is sampled from the fixed lists below. A generator built with the
//! same seed and reference date yields the same dataset.

use chrono::{Duration, Local, NaiveDate};
use fake::Fake;
use fake::faker::address::en::{CityName, StateAbbr, StreetName, ZipCode};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use crate::models::{
    Demographics, Insurance, MedicalHistory, PatientRecord, Visit, Vitals,
};

pub const DEFAULT_SEED: u64 = 42;

pub const CONDITIONS: &[&str] = &[
    "Type 2 Diabetes Mellitus",
    "Hypertension",
    "Asthma",
    "COPD",
    "Coronary Artery Disease",
    "Chronic Kidney Disease",
    "Osteoarthritis",
    "Depression",
    "Anxiety Disorder",
    "Hyperlipidemia",
];

const VISIT_NOTES: &[&str] = &[
    "Patient reports good adherence to medication regimen. Blood pressure well controlled.",
    "Patient experiencing mild side effects from current medication. Discussed alternatives.",
    "Follow-up visit for chronic condition management. Vitals stable.",
    "Patient reports improvement in symptoms since last visit. Continue current treatment plan.",
    "Discussed lifestyle modifications including diet and exercise.",
    "Ordered lab work to monitor disease progression and medication effectiveness.",
    "Patient educated on warning signs and when to seek immediate care.",
    "Medication dosage adjusted based on recent lab results and symptom control.",
];

const VISIT_TYPES: &[&str] = &["Follow-up", "Annual Physical", "Acute Care"];
const ALLERGIES: &[&str] = &["Penicillin", "Sulfa drugs", "Latex", "None"];
const FAMILY_HISTORY: &[&str] = &["Heart Disease", "Diabetes", "Cancer", "None"];
const INSURERS: &[&str] = &["Blue Cross", "Aetna", "UnitedHealthcare", "Medicare"];

/// Drugs prescribed for `condition`; empty for conditions without a regimen.
pub fn medications_for(condition: &str) -> &'static [&'static str] {
    match condition {
        "Type 2 Diabetes Mellitus" => &["Metformin 500mg", "Insulin Glargine", "Glipizide 5mg"],
        "Hypertension" => &["Lisinopril 10mg", "Amlodipine 5mg", "Hydrochlorothiazide 25mg"],
        "Asthma" => &["Albuterol Inhaler", "Fluticasone Inhaler", "Montelukast 10mg"],
        "COPD" => &["Tiotropium Inhaler", "Albuterol Inhaler", "Prednisone 10mg"],
        "Coronary Artery Disease" => &["Aspirin 81mg", "Atorvastatin 40mg", "Metoprolol 50mg"],
        "Hyperlipidemia" => &["Atorvastatin 20mg", "Simvastatin 40mg", "Ezetimibe 10mg"],
        _ => &[],
    }
}

fn pick_n(rng: &mut StdRng, pool: &[&str], n: usize) -> Vec<String> {
    pool.choose_multiple(rng, n).map(|s| s.to_string()).collect()
}

fn pick(rng: &mut StdRng, pool: &[&str]) -> String {
    pool.choose(rng).map(|s| s.to_string()).unwrap_or_default()
}

pub struct PatientGenerator {
    rng: StdRng,
    today: NaiveDate,
    issued_ids: HashSet<String>,
}

impl PatientGenerator {
    pub fn new(seed: u64) -> Self {
        Self::with_today(seed, Local::now().date_naive())
    }

    /// Generator whose visit dates and birthdays are relative to `today`.
    pub fn with_today(seed: u64, today: NaiveDate) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            today,
            issued_ids: HashSet::new(),
        }
    }

    pub fn generate(&mut self, count: usize) -> Vec<PatientRecord> {
        (0..count).map(|_| self.generate_record()).collect()
    }

    pub fn generate_record(&mut self) -> PatientRecord {
        let patient_id = self.unique_id();
        let gender = pick(&mut self.rng, &["Male", "Female"]);
        let age: u32 = self.rng.random_range(25..=85);

        let num_conditions = self.rng.random_range(1..=3);
        let conditions = pick_n(&mut self.rng, CONDITIONS, num_conditions);

        let mut medications = Vec::new();
        for condition in &conditions {
            let regimen = medications_for(condition);
            if !regimen.is_empty() {
                let n = self.rng.random_range(1..=2);
                medications.extend(pick_n(&mut self.rng, regimen, n));
            }
        }

        let vitals = self.vitals();
        let visit_history = self.visits(&vitals);
        let demographics = self.demographics(gender, age);

        PatientRecord {
            patient_id,
            demographics,
            medical_history: MedicalHistory {
                conditions,
                allergies: pick_n(&mut self.rng, ALLERGIES, 1),
                family_history: pick_n(&mut self.rng, FAMILY_HISTORY, 2),
            },
            medications,
            current_vitals: vitals,
            visit_history,
            insurance: Insurance {
                provider: pick(&mut self.rng, INSURERS),
                policy_number: self.policy_number(),
            },
        }
    }

    fn unique_id(&mut self) -> String {
        loop {
            let id = format!("{:08x}", self.rng.random::<u32>());
            if self.issued_ids.insert(id.clone()) {
                return id;
            }
        }
    }

    fn policy_number(&mut self) -> String {
        let head: u32 = self.rng.random();
        let tail: u16 = self.rng.random_range(0..0x1000);
        format!("{head:08X}-{tail:03X}")
    }

    fn vitals(&mut self) -> Vitals {
        let temperature: f64 = self.rng.random_range(97.0..=99.5);
        Vitals {
            blood_pressure: format!(
                "{}/{}",
                self.rng.random_range(110..=160),
                self.rng.random_range(70..=100)
            ),
            heart_rate: self.rng.random_range(60..=100),
            temperature: (temperature * 10.0).round() / 10.0,
            weight_kg: self.rng.random_range(50..=120),
            height_cm: self.rng.random_range(150..=190),
        }
    }

    fn visits(&mut self, vitals: &Vitals) -> Vec<Visit> {
        let count = self.rng.random_range(2..=5);
        let base_date = self.today - Duration::days(365);
        (0..count)
            .map(|i| {
                let offset = self.rng.random_range(30..=90) * i as i64;
                Visit {
                    date: (base_date + Duration::days(offset))
                        .format("%Y-%m-%d")
                        .to_string(),
                    visit_type: pick(&mut self.rng, VISIT_TYPES),
                    provider: Name().fake_with_rng(&mut self.rng),
                    notes: pick(&mut self.rng, VISIT_NOTES),
                    vitals: vitals.clone(),
                }
            })
            .collect()
    }

    fn demographics(&mut self, gender: String, age: u32) -> Demographics {
        let days_old = age as i64 * 365 + self.rng.random_range(0..365);
        let date_of_birth = (self.today - Duration::days(days_old))
            .format("%Y-%m-%d")
            .to_string();

        let street_number: u32 = self.rng.random_range(1..=9999);
        let street: String = StreetName().fake_with_rng(&mut self.rng);
        let city: String = CityName().fake_with_rng(&mut self.rng);
        let state: String = StateAbbr().fake_with_rng(&mut self.rng);
        let zip: String = ZipCode().fake_with_rng(&mut self.rng);

        Demographics {
            name: Name().fake_with_rng(&mut self.rng),
            date_of_birth,
            gender,
            age,
            phone: PhoneNumber().fake_with_rng(&mut self.rng),
            email: SafeEmail().fake_with_rng(&mut self.rng),
            address: format!("{street_number} {street}, {city}, {state} {zip}"),
        }
    }
}
