//! Unified, time-ordered event history across clinical resource types.

use chart_core::{
    CarePlan, CodeableConcept, Condition, DiagnosticReport, DocumentReference, Encounter,
    EventMetadata, EventRecord, EventType, Immunization, MedicationRequest, Observation, Patient,
    Procedure, Reference, ResourceKind, ResourceRef,
};
use chrono::{DateTime, Utc};

use super::{clinical::request_medication, observations::category_code};

const CLINICAL_NOTE: &str = "clinical-note";

/// Merges the patient's clinical resources into one list sorted by start.
///
/// Entries without a start timestamp are left out. Equal starts keep the
/// order in which the resource types are listed here.
pub fn event_history(patient: &Patient) -> Vec<EventRecord> {
    let mut events: Vec<EventRecord> = Vec::new();

    events.extend(patient.encounters.iter().filter_map(encounter_event));
    events.extend(patient.procedures.iter().filter_map(procedure_event));
    events.extend(patient.conditions.iter().filter_map(condition_event));
    events.extend(
        patient
            .document_references
            .iter()
            .filter(|document| is_clinical_note(document))
            .filter_map(note_event),
    );
    events.extend(
        patient
            .diagnostic_reports
            .iter()
            .filter_map(|report| report_event(patient, report)),
    );
    events.extend(patient.observations.iter().filter_map(observation_event));
    events.extend(
        patient
            .medication_requests
            .iter()
            .filter_map(|request| medication_event(patient, request)),
    );
    events.extend(patient.immunizations.iter().filter_map(immunization_event));
    events.extend(patient.care_plans.iter().filter_map(care_plan_event));

    events.sort_by_key(|event| event.start);
    events
}

pub fn is_clinical_note(document: &DocumentReference) -> bool {
    document
        .category
        .iter()
        .any(|category| category.has_code(CLINICAL_NOTE))
}

fn encounter_event(encounter: &Encounter) -> Option<EventRecord> {
    let label = first_text(&encounter.types)
        .or_else(|| first_text(&encounter.class))
        .unwrap_or("Encounter");

    record(
        encounter.period.start,
        encounter.period.end,
        EventType::Encounter,
        label,
        ResourceKind::Encounter,
        &encounter.id,
        EventMetadata {
            status: encounter.status.clone(),
            code: first_code(&encounter.types),
            category: first_code(&encounter.class),
            reason: first_text(&encounter.reason).map(str::to_string),
            ..EventMetadata::default()
        },
    )
}

fn procedure_event(procedure: &Procedure) -> Option<EventRecord> {
    record(
        procedure.performed.start,
        procedure.performed.end,
        EventType::Procedure,
        text_or(procedure.code.as_ref(), "Procedure"),
        ResourceKind::Procedure,
        &procedure.id,
        EventMetadata {
            status: procedure.status.clone(),
            code: code_of(procedure.code.as_ref()),
            reason: first_text(&procedure.reason).map(str::to_string),
            encounter: reference_of(procedure.encounter.as_ref()),
            ..EventMetadata::default()
        },
    )
}

fn condition_event(condition: &Condition) -> Option<EventRecord> {
    record(
        condition.onset.or(condition.recorded_date),
        condition.abatement,
        EventType::Condition,
        text_or(condition.code.as_ref(), "Condition"),
        ResourceKind::Condition,
        &condition.id,
        EventMetadata {
            status: code_of(condition.clinical_status.as_ref()),
            code: code_of(condition.code.as_ref()),
            category: first_text(&condition.category).map(str::to_string),
            encounter: reference_of(condition.encounter.as_ref()),
            ..EventMetadata::default()
        },
    )
}

fn note_event(document: &DocumentReference) -> Option<EventRecord> {
    record(
        document.date.or(document.period.start),
        document.period.end,
        EventType::Note,
        text_or(document.doc_type.as_ref(), "Clinical note"),
        ResourceKind::DocumentReference,
        &document.id,
        EventMetadata {
            status: document.status.clone(),
            code: code_of(document.doc_type.as_ref()),
            category: Some(CLINICAL_NOTE.to_string()),
            encounter: reference_of(document.encounters.first()),
            ..EventMetadata::default()
        },
    )
}

/// Reports carry the value of their first result that resolves to an
/// Observation in the bundle.
fn report_event(patient: &Patient, report: &DiagnosticReport) -> Option<EventRecord> {
    let paired = report
        .results
        .iter()
        .filter_map(|result| match patient.resolve(result) {
            Some(ResourceRef::Observation(observation)) => Some(observation),
            _ => None,
        })
        .find_map(|observation| {
            let value = observation.value.as_ref()?.display()?;
            Some(match observation.label() {
                Some(label) => format!("{label}: {value}"),
                None => value,
            })
        });

    record(
        report.effective.or(report.issued),
        None,
        EventType::DiagnosticReport,
        text_or(report.code.as_ref(), "Diagnostic report"),
        ResourceKind::DiagnosticReport,
        &report.id,
        EventMetadata {
            status: report.status.clone(),
            code: code_of(report.code.as_ref()),
            category: first_text(&report.category).map(str::to_string),
            value: paired,
            encounter: reference_of(report.encounter.as_ref()),
            ..EventMetadata::default()
        },
    )
}

/// Only observations tagged with an observation-category take part.
fn observation_event(observation: &Observation) -> Option<EventRecord> {
    let category = category_code(observation)?;

    record(
        observation.effective.or(observation.issued),
        None,
        EventType::Observation,
        observation.label().unwrap_or("Observation"),
        ResourceKind::Observation,
        &observation.id,
        EventMetadata {
            status: observation.status.clone(),
            code: code_of(observation.code.as_ref()),
            category: Some(category.to_string()),
            value: observation.value.as_ref().and_then(|value| value.display()),
            encounter: reference_of(observation.encounter.as_ref()),
            ..EventMetadata::default()
        },
    )
}

fn medication_event(patient: &Patient, request: &MedicationRequest) -> Option<EventRecord> {
    let medication = request_medication(patient, request);

    record(
        request.authored_on,
        None,
        EventType::Medication,
        text_or(medication, "Medication"),
        ResourceKind::MedicationRequest,
        &request.id,
        EventMetadata {
            status: request.status.clone(),
            code: code_of(medication),
            value: request.dosage.first().cloned(),
            reason: first_text(&request.reason).map(str::to_string),
            encounter: reference_of(request.encounter.as_ref()),
            ..EventMetadata::default()
        },
    )
}

fn immunization_event(immunization: &Immunization) -> Option<EventRecord> {
    record(
        immunization.occurrence,
        None,
        EventType::Immunization,
        text_or(immunization.vaccine_code.as_ref(), "Immunization"),
        ResourceKind::Immunization,
        &immunization.id,
        EventMetadata {
            status: immunization.status.clone(),
            code: code_of(immunization.vaccine_code.as_ref()),
            encounter: reference_of(immunization.encounter.as_ref()),
            ..EventMetadata::default()
        },
    )
}

fn care_plan_event(plan: &CarePlan) -> Option<EventRecord> {
    record(
        plan.period.start,
        plan.period.end,
        EventType::CarePlan,
        plan.label().unwrap_or("Care plan"),
        ResourceKind::CarePlan,
        &plan.id,
        EventMetadata {
            status: plan.status.clone(),
            code: first_code(&plan.category),
            category: first_text(&plan.category).map(str::to_string),
            ..EventMetadata::default()
        },
    )
}

fn record(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    event_type: EventType,
    label: &str,
    resource_type: ResourceKind,
    id: &Option<String>,
    metadata: EventMetadata,
) -> Option<EventRecord> {
    Some(EventRecord {
        start: start?,
        end,
        event_type,
        label: label.to_string(),
        resource_type,
        id: id.clone(),
        metadata: metadata.into_option(),
    })
}

fn first_text(concepts: &[CodeableConcept]) -> Option<&str> {
    concepts.iter().find_map(CodeableConcept::display_text)
}

fn first_code(concepts: &[CodeableConcept]) -> Option<String> {
    concepts
        .iter()
        .find_map(CodeableConcept::first_code)
        .map(str::to_string)
}

fn text_or<'a>(concept: Option<&'a CodeableConcept>, fallback: &'a str) -> &'a str {
    concept
        .and_then(CodeableConcept::display_text)
        .unwrap_or(fallback)
}

fn code_of(concept: Option<&CodeableConcept>) -> Option<String> {
    concept
        .and_then(CodeableConcept::first_code)
        .map(str::to_string)
}

fn reference_of(reference: Option<&Reference>) -> Option<String> {
    reference.and_then(|reference| reference.reference.clone())
}
