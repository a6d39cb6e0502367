//! FHIR bundle indexing and derived chart views.
//!
//! [`build_patient`] turns a parsed Bundle into a [`Patient`] with every
//! related resource partitioned by type. The [`views`] module computes the
//! chart-ready projections on demand.

use chart_core::{ChartError, Patient, ResourceKind};
use serde_json::Value;

mod decode;
pub mod views;

pub use decode::{parse_date, parse_datetime};
pub use views::{render_view, ViewRequest};

/// Build a patient from a bundle JSON string.
pub fn build_patient_str(bundle_json: &str) -> Result<Patient, ChartError> {
    let value: Value =
        serde_json::from_str(bundle_json).map_err(|err| ChartError::Parse(err.to_string()))?;
    build_patient(&value)
}

/// Build a patient from a parsed bundle.
///
/// The first `Patient` entry supplies the demographics; every other known
/// resource is appended to its collection in bundle order. Unknown resource
/// types are skipped.
pub fn build_patient(bundle: &Value) -> Result<Patient, ChartError> {
    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let resources = entries
        .iter()
        .filter_map(|entry| entry.get("resource"))
        .filter(|resource| resource.is_object());

    let Some(root) = resources
        .clone()
        .find(|resource| decode::resource_type(resource) == Some("Patient"))
    else {
        tracing::warn!(entries = entries.len(), "bundle has no Patient resource");
        return Err(ChartError::MissingPatientResource);
    };

    let mut patient = decode::patient(root);
    let mut patient_entries = 0usize;
    let mut skipped = 0usize;

    for resource in resources {
        let Some(resource_type) = decode::resource_type(resource) else {
            skipped += 1;
            continue;
        };

        let Some(kind) = ResourceKind::from_resource_type(resource_type) else {
            tracing::trace!(resource_type, "skipping unsupported resource type");
            skipped += 1;
            continue;
        };

        match kind {
            ResourceKind::Patient => patient_entries += 1,
            ResourceKind::Encounter => patient.encounters.push(decode::encounter(resource)),
            ResourceKind::Condition => patient.conditions.push(decode::condition(resource)),
            ResourceKind::Observation => patient.observations.push(decode::observation(resource)),
            ResourceKind::Immunization => {
                patient.immunizations.push(decode::immunization(resource))
            }
            ResourceKind::DiagnosticReport => patient
                .diagnostic_reports
                .push(decode::diagnostic_report(resource)),
            ResourceKind::DocumentReference => patient
                .document_references
                .push(decode::document_reference(resource)),
            ResourceKind::Claim => patient.claims.push(decode::claim(resource)),
            ResourceKind::ExplanationOfBenefit => patient
                .explanation_of_benefits
                .push(decode::explanation_of_benefit(resource)),
            ResourceKind::Procedure => patient.procedures.push(decode::procedure(resource)),
            ResourceKind::MedicationRequest => patient
                .medication_requests
                .push(decode::medication_request(resource)),
            ResourceKind::CareTeam => patient.care_teams.push(decode::care_team(resource)),
            ResourceKind::CarePlan => patient.care_plans.push(decode::care_plan(resource)),
            ResourceKind::Provenance => patient.provenances.push(decode::provenance(resource)),
            ResourceKind::Device => patient.devices.push(decode::device(resource)),
            ResourceKind::SupplyDelivery => patient
                .supply_deliveries
                .push(decode::supply_delivery(resource)),
            ResourceKind::Medication => patient.medications.push(decode::medication(resource)),
            ResourceKind::MedicationAdministration => patient
                .medication_administrations
                .push(decode::medication_administration(resource)),
        }
    }

    if patient_entries > 1 {
        tracing::warn!(
            patient_id = patient.id.as_deref().unwrap_or("-"),
            patient_entries,
            "bundle has several Patient entries, using the first"
        );
    }

    tracing::debug!(
        patient_id = patient.id.as_deref().unwrap_or("-"),
        entries = entries.len(),
        indexed = patient.resource_count(),
        skipped,
        "indexed bundle"
    );

    Ok(patient)
}
