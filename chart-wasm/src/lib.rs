//! Framework-neutral WASM <-> JavaScript bridge.

use std::collections::BTreeMap;

use chart_core::{ChartError, NotesConfig, Patient};
use chart_fhir::views::{self, ViewRequest};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
struct JsNotesConfig {
    #[serde(default)]
    decode: Option<bool>,
}

impl From<JsNotesConfig> for NotesConfig {
    fn from(cfg: JsNotesConfig) -> Self {
        let mut base = NotesConfig::default();
        if let Some(decode) = cfg.decode {
            base.decode = decode;
        }
        base
    }
}

/// Headline numbers for a patient card.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<u32>,
    pub bmi: Option<f64>,
    pub egfr: f64,
    pub active_conditions: usize,
    pub active_medications: usize,
    pub events: usize,
    pub resource_counts: BTreeMap<&'static str, usize>,
}

impl PatientSummary {
    /// JSON form handed to JS; `resourceCounts` is a plain object.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn of(patient: &Patient, today: NaiveDate) -> Self {
        let mut resource_counts = BTreeMap::new();
        for resource in patient.resources() {
            *resource_counts.entry(resource.kind().as_str()).or_insert(0) += 1;
        }

        Self {
            id: patient.id.clone(),
            name: patient.display_name(),
            gender: patient.gender.map(|gender| gender.as_str().to_string()),
            birth_date: patient.birth_date,
            age: views::age_on(patient, today),
            bmi: views::bmi(patient),
            egfr: views::egfr_on(patient, today),
            active_conditions: views::active_conditions(patient).len(),
            active_medications: views::active_medications(patient).len(),
            events: views::event_history(patient).len(),
            resource_counts,
        }
    }
}

#[wasm_bindgen(js_name = buildPatient)]
pub fn build_patient(input_bundle: JsValue) -> Result<JsValue, JsValue> {
    set_panic_hook();

    let patient = patient_from_bundle(input_bundle)?;
    to_value(&patient).map_err(|err| JsValue::from_str(&format!("Cannot serialize patient: {err}")))
}

/// Computes one view over a patient previously returned by `buildPatient`.
///
/// `today` (`YYYY-MM-DD`) anchors age-dependent views; defaults to the
/// current UTC date.
#[wasm_bindgen(js_name = computeView)]
pub fn compute_view(
    patient: JsValue,
    request: JsValue,
    today: Option<String>,
) -> Result<JsValue, JsValue> {
    set_panic_hook();

    let patient: Patient = from_value(patient)
        .map_err(|err| JsValue::from_str(&format!("Cannot read patient: {err}")))?;
    let request: ViewRequest = from_value(request)
        .map_err(|err| JsValue::from_str(&format!("Cannot read view request: {err}")))?;
    let today = resolve_today(today.as_deref())?;

    let view = chart_fhir::render_view(&patient, &request, today)
        .map_err(|err| JsValue::from_str(&format!("Cannot serialize view: {err}")))?;
    to_js(&view)
}

#[wasm_bindgen(js_name = clinicalNotes)]
pub fn clinical_notes(patient: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    set_panic_hook();

    let patient: Patient = from_value(patient)
        .map_err(|err| JsValue::from_str(&format!("Cannot read patient: {err}")))?;
    let cfg = match config {
        Some(js_cfg) => {
            let cfg: JsNotesConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Cannot read config: {err}")))?;
            NotesConfig::from(cfg)
        }
        None => NotesConfig::default(),
    };

    to_value(&views::clinical_notes(&patient, &cfg))
        .map_err(|err| JsValue::from_str(&format!("Cannot serialize notes: {err}")))
}

#[wasm_bindgen(js_name = patientSummary)]
pub fn patient_summary(input_bundle: JsValue) -> Result<JsValue, JsValue> {
    set_panic_hook();

    let patient = patient_from_bundle(input_bundle)?;
    let summary = PatientSummary::of(&patient, Utc::now().date_naive())
        .to_json()
        .map_err(|err| JsValue::from_str(&format!("Cannot serialize summary: {err}")))?;
    to_js(&summary)
}

fn patient_from_bundle(input_bundle: JsValue) -> Result<Patient, JsValue> {
    let bundle_value = from_value::<serde_json::Value>(input_bundle)
        .map_err(|err| JsValue::from_str(&format!("Cannot read JSON bundle: {err}")))?;
    chart_fhir::build_patient(&bundle_value).map_err(|err| JsValue::from_str(&format_chart_error(err)))
}

fn resolve_today(today: Option<&str>) -> Result<NaiveDate, JsValue> {
    match today {
        Some(text) => chart_fhir::parse_date(text)
            .ok_or_else(|| JsValue::from_str(&format!("Invalid date: {text}"))),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Maps become plain JS objects rather than `Map`s.
fn to_js(value: &serde_json::Value) -> Result<JsValue, JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value
        .serialize(&serializer)
        .map_err(|err| JsValue::from_str(&format!("Cannot serialize value: {err}")))
}

fn format_chart_error(err: ChartError) -> String {
    format!("Chart error: {err}")
}

fn set_panic_hook() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_notes_config_keeps_defaults() {
        let cfg: JsNotesConfig = serde_json::from_value(json!({})).unwrap();
        assert!(NotesConfig::from(cfg).decode);

        let cfg: JsNotesConfig = serde_json::from_value(json!({"decode": false})).unwrap();
        assert!(!NotesConfig::from(cfg).decode);
    }

    #[test]
    fn summary_counts_resources_by_type() {
        let bundle = json!({
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "p", "gender": "male", "birthDate": "1970-01-01"}},
                {"resource": {"resourceType": "Condition", "id": "c1",
                    "clinicalStatus": {"coding": [{"system": "http://terminology.hl7.org/CodeSystem/condition-clinical", "code": "active"}]},
                    "onsetDateTime": "2010-01-01"}},
                {"resource": {"resourceType": "Condition", "id": "c2"}}
            ]
        });
        let patient = chart_fhir::build_patient(&bundle).unwrap();
        let today = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();

        let summary = PatientSummary::of(&patient, today);
        assert_eq!(summary.age, Some(50));
        assert_eq!(summary.gender.as_deref(), Some("male"));
        assert_eq!(summary.resource_counts.get("Condition"), Some(&2));
        assert_eq!(summary.active_conditions, 1);
        assert_eq!(summary.events, 1);
        assert_eq!(summary.egfr, 0.0);

        let json = summary.to_json().unwrap();
        assert_eq!(json["resourceCounts"], json!({"Condition": 2}));
        assert_eq!(json["activeConditions"], 1);
    }
}
