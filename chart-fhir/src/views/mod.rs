//! Derived views over an indexed [`Patient`].
//!
//! Every view is a pure function of the patient: nothing is cached and the
//! patient is never modified. [`render_view`] dispatches a [`ViewRequest`]
//! and serializes the result for JavaScript callers and the CLI.

use chart_core::{NotesConfig, Patient};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod clinical;
pub mod history;
pub mod measures;
pub mod notes;
pub mod observations;

pub use clinical::*;
pub use history::*;
pub use measures::*;
pub use notes::*;
pub use observations::*;

/// LOINC codes the views look up.
pub mod loinc {
    pub const BODY_WEIGHT: &str = "29463-7";
    pub const BODY_HEIGHT: &str = "8302-2";
    pub const CREATININE: &str = "2160-0";
    pub const SYSTOLIC_BLOOD_PRESSURE: &str = "8480-6";
    pub const DIASTOLIC_BLOOD_PRESSURE: &str = "8462-4";
}

/// A view name plus its parameter, as sent by the JS bridge or the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum ViewRequest {
    Vitals,
    LabResults,
    ObservationsByCategory {
        category: String,
    },
    VitalTrend {
        query: String,
    },
    ObservationTrend {
        code: String,
    },
    BloodPressureTrend,
    LatestObservation {
        code: String,
    },
    LatestVital {
        query: String,
    },
    Age,
    Bmi,
    Egfr,
    ActiveConditions,
    ActiveMedications,
    ActiveCarePlans,
    RelatedResources {
        id: String,
        #[serde(default)]
        relationship: Option<String>,
    },
    EventHistory,
    ClinicalNotes {
        #[serde(default = "decode_by_default")]
        decode: bool,
    },
    EncounterTimeline,
    ConditionTimeline,
    ImmunizationHistory,
    MedicationAdherence,
    ClaimCosts,
}

fn decode_by_default() -> bool {
    NotesConfig::default().decode
}

/// Computes the requested view and serializes it to JSON.
///
/// `today` anchors the age-dependent views so callers control the clock.
pub fn render_view(
    patient: &Patient,
    request: &ViewRequest,
    today: NaiveDate,
) -> serde_json::Result<Value> {
    match request {
        ViewRequest::Vitals => serde_json::to_value(vitals(patient)),
        ViewRequest::LabResults => serde_json::to_value(lab_results(patient)),
        ViewRequest::ObservationsByCategory { category } => {
            serde_json::to_value(observations_by_category(patient, category))
        }
        ViewRequest::VitalTrend { query } => serde_json::to_value(vital_trend(patient, query)),
        ViewRequest::ObservationTrend { code } => {
            serde_json::to_value(observation_trend(patient, code))
        }
        ViewRequest::BloodPressureTrend => serde_json::to_value(blood_pressure_trend(patient)),
        ViewRequest::LatestObservation { code } => {
            serde_json::to_value(latest_observation(patient, code))
        }
        ViewRequest::LatestVital { query } => serde_json::to_value(latest_vital(patient, query)),
        ViewRequest::Age => serde_json::to_value(age_on(patient, today)),
        ViewRequest::Bmi => serde_json::to_value(bmi(patient)),
        ViewRequest::Egfr => serde_json::to_value(egfr_on(patient, today)),
        ViewRequest::ActiveConditions => serde_json::to_value(active_conditions(patient)),
        ViewRequest::ActiveMedications => serde_json::to_value(active_medications(patient)),
        ViewRequest::ActiveCarePlans => serde_json::to_value(active_care_plans(patient)),
        ViewRequest::RelatedResources { id, relationship } => serde_json::to_value(
            related_resources(patient, id, relationship.as_deref()),
        ),
        ViewRequest::EventHistory => serde_json::to_value(event_history(patient)),
        ViewRequest::ClinicalNotes { decode } => serde_json::to_value(clinical_notes(
            patient,
            &NotesConfig { decode: *decode },
        )),
        ViewRequest::EncounterTimeline => serde_json::to_value(encounter_timeline(patient)),
        ViewRequest::ConditionTimeline => serde_json::to_value(condition_timeline(patient)),
        ViewRequest::ImmunizationHistory => serde_json::to_value(immunization_history(patient)),
        ViewRequest::MedicationAdherence => serde_json::to_value(medication_adherence(patient)),
        ViewRequest::ClaimCosts => serde_json::to_value(claim_costs(patient)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::*;

    #[test]
    fn view_requests_deserialize_from_tagged_json() {
        let request: ViewRequest =
            serde_json::from_str(r#"{"view": "vitalTrend", "query": "weight"}"#).unwrap();
        assert_eq!(
            request,
            ViewRequest::VitalTrend {
                query: "weight".to_string()
            }
        );

        let notes: ViewRequest = serde_json::from_str(r#"{"view": "clinicalNotes"}"#).unwrap();
        assert_eq!(notes, ViewRequest::ClinicalNotes { decode: true });
    }

    #[test]
    fn render_keeps_sentinel_and_null_shapes() {
        let patient = patient_with_observations(vec![vital(
            "w",
            "Body Weight",
            "29463-7",
            "2020-01-01",
            70.0,
            "kg",
        )]);
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        assert_eq!(
            render_view(&patient, &ViewRequest::Bmi, today).unwrap(),
            Value::Null
        );
        assert_eq!(
            render_view(&patient, &ViewRequest::Egfr, today).unwrap(),
            serde_json::json!(0.0)
        );

        let trend = render_view(
            &patient,
            &ViewRequest::VitalTrend {
                query: "weight".to_string(),
            },
            today,
        )
        .unwrap();
        assert_eq!(trend[0]["value"], 70.0);
        assert_eq!(trend[0]["unit"], "kg");
    }
}
