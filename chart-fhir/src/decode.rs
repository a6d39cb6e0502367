//! Defensive decoding of FHIR JSON into the typed model.
//!
//! Fields of the wrong shape are treated as absent. R4 and R5 spellings of
//! the fields the views use are both accepted.

use chart_core::*;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

pub(crate) fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

pub(crate) fn patient(resource: &Value) -> Patient {
    Patient {
        id: string(resource, "id"),
        identifiers: list(resource.get("identifier"))
            .map(|item| Identifier {
                system: string(item, "system"),
                value: string(item, "value"),
            })
            .collect(),
        names: list(resource.get("name")).map(human_name).collect(),
        gender: resource
            .get("gender")
            .and_then(Value::as_str)
            .and_then(AdministrativeGender::from_code),
        birth_date: resource
            .get("birthDate")
            .and_then(Value::as_str)
            .and_then(parse_date),
        deceased: datetime(resource.get("deceasedDateTime")),
        marital_status: codeable(resource.get("maritalStatus")),
        ..Patient::default()
    }
}

pub(crate) fn encounter(resource: &Value) -> Encounter {
    Encounter {
        id: string(resource, "id"),
        status: string(resource, "status"),
        class: codeable_list(resource.get("class")),
        types: codeable_list(resource.get("type")),
        period: first_period(resource, &["actualPeriod", "period"]),
        reason: reasons(resource),
        service_provider: reference(resource.get("serviceProvider")),
    }
}

pub(crate) fn condition(resource: &Value) -> Condition {
    Condition {
        id: string(resource, "id"),
        clinical_status: codeable(resource.get("clinicalStatus")),
        verification_status: codeable(resource.get("verificationStatus")),
        category: codeable_list(resource.get("category")),
        code: codeable(resource.get("code")),
        onset: first_period(resource, &["onsetDateTime", "onsetPeriod"]).start,
        abatement: first_period(resource, &["abatementDateTime", "abatementPeriod"]).start,
        recorded_date: datetime(resource.get("recordedDate")),
        encounter: reference(resource.get("encounter")),
    }
}

pub(crate) fn observation(resource: &Value) -> Observation {
    Observation {
        id: string(resource, "id"),
        status: string(resource, "status"),
        category: codeable_list(resource.get("category")),
        code: codeable(resource.get("code")),
        effective: first_period(
            resource,
            &["effectiveDateTime", "effectiveInstant", "effectivePeriod"],
        )
        .start,
        issued: datetime(resource.get("issued")),
        value: observation_value(resource),
        components: list(resource.get("component"))
            .map(|component| ObservationComponent {
                code: codeable(component.get("code")),
                value: observation_value(component),
            })
            .collect(),
        encounter: reference(resource.get("encounter")),
    }
}

pub(crate) fn immunization(resource: &Value) -> Immunization {
    Immunization {
        id: string(resource, "id"),
        status: string(resource, "status"),
        vaccine_code: codeable(resource.get("vaccineCode")),
        occurrence: datetime(resource.get("occurrenceDateTime")),
        encounter: reference(resource.get("encounter")),
    }
}

pub(crate) fn diagnostic_report(resource: &Value) -> DiagnosticReport {
    DiagnosticReport {
        id: string(resource, "id"),
        status: string(resource, "status"),
        category: codeable_list(resource.get("category")),
        code: codeable(resource.get("code")),
        effective: first_period(resource, &["effectiveDateTime", "effectivePeriod"]).start,
        issued: datetime(resource.get("issued")),
        results: references(resource.get("result")),
        encounter: reference(resource.get("encounter")),
        presented_form: list(resource.get("presentedForm")).map(attachment).collect(),
    }
}

pub(crate) fn document_reference(resource: &Value) -> DocumentReference {
    // R4 nests encounter and period under `context`, R5 makes `context` the reference list.
    let context = resource.get("context");
    let encounters = match context {
        Some(Value::Array(_)) => references(context),
        Some(context) => references(context.get("encounter")),
        None => Vec::new(),
    };
    let period = resource
        .get("period")
        .or_else(|| context.and_then(|context| context.get("period")))
        .map(period)
        .unwrap_or_default();

    DocumentReference {
        id: string(resource, "id"),
        status: string(resource, "status"),
        doc_type: codeable(resource.get("type")),
        category: codeable_list(resource.get("category")),
        date: datetime(resource.get("date")),
        authors: references(resource.get("author")),
        content: list(resource.get("content"))
            .filter_map(|content| content.get("attachment"))
            .map(attachment)
            .collect(),
        encounters,
        period,
    }
}

pub(crate) fn claim(resource: &Value) -> Claim {
    Claim {
        id: string(resource, "id"),
        status: string(resource, "status"),
        use_: string(resource, "use"),
        created: datetime(resource.get("created")),
        billable_period: resource
            .get("billablePeriod")
            .map(period)
            .unwrap_or_default(),
        total: money(resource.get("total")),
        provider: reference(resource.get("provider")),
        items: list(resource.get("item"))
            .filter_map(|item| codeable(item.get("productOrService")))
            .collect(),
    }
}

pub(crate) fn explanation_of_benefit(resource: &Value) -> ExplanationOfBenefit {
    ExplanationOfBenefit {
        id: string(resource, "id"),
        status: string(resource, "status"),
        created: datetime(resource.get("created")),
        billable_period: resource
            .get("billablePeriod")
            .map(period)
            .unwrap_or_default(),
        claim: reference(resource.get("claim")),
        totals: list(resource.get("total"))
            .filter_map(|total| money(total.get("amount")))
            .collect(),
        payment: resource
            .get("payment")
            .and_then(|payment| money(payment.get("amount"))),
    }
}

pub(crate) fn procedure(resource: &Value) -> Procedure {
    Procedure {
        id: string(resource, "id"),
        status: string(resource, "status"),
        code: codeable(resource.get("code")),
        performed: first_period(
            resource,
            &[
                "occurrencePeriod",
                "occurrenceDateTime",
                "performedPeriod",
                "performedDateTime",
            ],
        ),
        reason: reasons(resource),
        encounter: reference(resource.get("encounter")),
    }
}

pub(crate) fn medication_request(resource: &Value) -> MedicationRequest {
    let (medication, medication_reference) = medication_fields(resource);
    MedicationRequest {
        id: string(resource, "id"),
        status: string(resource, "status"),
        intent: string(resource, "intent"),
        medication,
        medication_reference,
        authored_on: datetime(resource.get("authoredOn")),
        requester: reference(resource.get("requester")),
        reason: reasons(resource),
        dosage: list(resource.get("dosageInstruction"))
            .filter_map(|dosage| string(dosage, "text"))
            .collect(),
        encounter: reference(resource.get("encounter")),
    }
}

pub(crate) fn care_team(resource: &Value) -> CareTeam {
    CareTeam {
        id: string(resource, "id"),
        status: string(resource, "status"),
        name: string(resource, "name"),
        period: resource.get("period").map(period).unwrap_or_default(),
        members: list(resource.get("participant"))
            .filter_map(|participant| reference(participant.get("member")))
            .collect(),
        reason: reasons(resource),
    }
}

pub(crate) fn care_plan(resource: &Value) -> CarePlan {
    CarePlan {
        id: string(resource, "id"),
        status: string(resource, "status"),
        intent: string(resource, "intent"),
        title: string(resource, "title"),
        category: codeable_list(resource.get("category")),
        period: resource.get("period").map(period).unwrap_or_default(),
        activities: list(resource.get("activity"))
            .filter_map(|activity| activity.get("detail"))
            .filter_map(|detail| codeable(detail.get("code")))
            .collect(),
        addresses: references(resource.get("addresses")),
    }
}

pub(crate) fn provenance(resource: &Value) -> Provenance {
    Provenance {
        id: string(resource, "id"),
        targets: references(resource.get("target")),
        recorded: datetime(resource.get("recorded")),
        agents: list(resource.get("agent"))
            .map(|agent| ProvenanceAgent {
                agent_type: codeable(agent.get("type")),
                who: reference(agent.get("who")),
                on_behalf_of: reference(agent.get("onBehalfOf")),
            })
            .collect(),
    }
}

pub(crate) fn device(resource: &Value) -> Device {
    Device {
        id: string(resource, "id"),
        status: string(resource, "status"),
        device_type: codeable_list(resource.get("type")).into_iter().next(),
        distinct_identifier: string(resource, "distinctIdentifier"),
        manufacture_date: datetime(resource.get("manufactureDate")),
        expiration_date: datetime(resource.get("expirationDate")),
        lot_number: string(resource, "lotNumber"),
    }
}

pub(crate) fn supply_delivery(resource: &Value) -> SupplyDelivery {
    // R4 has a single `suppliedItem`, R5 a list of them.
    let supplied = list(resource.get("suppliedItem")).next();
    SupplyDelivery {
        id: string(resource, "id"),
        status: string(resource, "status"),
        item: supplied.and_then(|item| codeable(item.get("itemCodeableConcept"))),
        quantity: supplied.and_then(|item| quantity(item.get("quantity"))),
        occurrence: first_period(resource, &["occurrenceDateTime", "occurrencePeriod"]).start,
    }
}

pub(crate) fn medication(resource: &Value) -> Medication {
    Medication {
        id: string(resource, "id"),
        status: string(resource, "status"),
        code: codeable(resource.get("code")),
    }
}

pub(crate) fn medication_administration(resource: &Value) -> MedicationAdministration {
    MedicationAdministration {
        id: string(resource, "id"),
        status: string(resource, "status"),
        medication: medication_fields(resource).0,
        effective: first_period(
            resource,
            &[
                "occurenceDateTime",
                "occurrenceDateTime",
                "occurencePeriod",
                "occurrencePeriod",
                "effectiveDateTime",
                "effectivePeriod",
            ],
        ),
        request: reference(resource.get("request")),
        encounter: reference(resource.get("encounter"))
            .or_else(|| reference(resource.get("context"))),
    }
}

/// Parses FHIR `dateTime`/`instant`/`date` values, including partial dates.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    parse_date(value)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parses `YYYY-MM-DD`, `YYYY-MM` and `YYYY`, the latter two as the first day.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    match value.len() {
        4 => NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d").ok(),
        7 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
    }
}

fn string(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Iterates an array field; a lone object counts as a one-element list.
fn list(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    let items: &[Value] = match value {
        Some(Value::Array(items)) => items,
        Some(single @ Value::Object(_)) => std::slice::from_ref(single),
        _ => &[],
    };
    items.iter()
}

fn datetime(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value.and_then(Value::as_str).and_then(parse_datetime)
}

fn period(value: &Value) -> Period {
    Period {
        start: datetime(value.get("start")),
        end: datetime(value.get("end")),
    }
}

/// First field present among `fields`; strings become instants, objects periods.
fn first_period(resource: &Value, fields: &[&str]) -> Period {
    for field in fields {
        match resource.get(*field) {
            Some(Value::String(text)) => {
                if let Some(at) = parse_datetime(text) {
                    return Period::instant(at);
                }
            }
            Some(object @ Value::Object(_)) => {
                let found = period(object);
                if found.start.is_some() || found.end.is_some() {
                    return found;
                }
            }
            _ => {}
        }
    }
    Period::default()
}

fn coding(value: &Value) -> Option<Coding> {
    let coding = Coding {
        system: string(value, "system"),
        code: string(value, "code"),
        display: string(value, "display"),
    };
    if coding.system.is_none() && coding.code.is_none() && coding.display.is_none() {
        None
    } else {
        Some(coding)
    }
}

/// A CodeableConcept, or a bare Coding (R4 `Encounter.class`) promoted to one.
fn codeable(value: Option<&Value>) -> Option<CodeableConcept> {
    let value = value.filter(|value| value.is_object())?;
    let concept = if value.get("coding").is_some() || value.get("text").is_some() {
        CodeableConcept {
            coding: list(value.get("coding")).filter_map(coding).collect(),
            text: string(value, "text"),
        }
    } else {
        CodeableConcept {
            coding: coding(value).into_iter().collect(),
            text: None,
        }
    };

    if concept.coding.is_empty() && concept.text.is_none() {
        None
    } else {
        Some(concept)
    }
}

fn codeable_list(value: Option<&Value>) -> Vec<CodeableConcept> {
    list(value).filter_map(|item| codeable(Some(item))).collect()
}

/// A Reference, unwrapping the R5 CodeableReference form.
fn reference(value: Option<&Value>) -> Option<Reference> {
    let value = value.filter(|value| value.is_object())?;
    match value.get("reference") {
        Some(inner @ Value::Object(_)) => reference(Some(inner)),
        _ => {
            let found = Reference {
                reference: string(value, "reference"),
                display: string(value, "display"),
            };
            if found.reference.is_none() && found.display.is_none() {
                None
            } else {
                Some(found)
            }
        }
    }
}

fn references(value: Option<&Value>) -> Vec<Reference> {
    list(value).filter_map(|item| reference(Some(item))).collect()
}

/// `reasonCode` (R4) plus the concepts of `reason` (R5 CodeableReference, or
/// Encounter's `reason[].value[]`).
fn reasons(resource: &Value) -> Vec<CodeableConcept> {
    let mut found = codeable_list(resource.get("reasonCode"));
    for reason in list(resource.get("reason")) {
        if let Some(concept) = codeable(reason.get("concept")) {
            found.push(concept);
        }
        for value in list(reason.get("value")) {
            if let Some(concept) = codeable(value.get("concept")) {
                found.push(concept);
            }
        }
    }
    found
}

fn medication_fields(resource: &Value) -> (Option<CodeableConcept>, Option<Reference>) {
    if let Some(concept) = codeable(resource.get("medicationCodeableConcept")) {
        return (Some(concept), None);
    }
    if let Some(reference) = reference(resource.get("medicationReference")) {
        return (None, Some(reference));
    }
    match resource.get("medication") {
        Some(medication) => (
            codeable(medication.get("concept")),
            reference(medication.get("reference")),
        ),
        None => (None, None),
    }
}

fn quantity(value: Option<&Value>) -> Option<Quantity> {
    let value = value?;
    let found = Quantity {
        value: value.get("value").and_then(Value::as_f64),
        unit: string(value, "unit"),
        system: string(value, "system"),
        code: string(value, "code"),
    };
    if found.value.is_none() && found.unit.is_none() {
        None
    } else {
        Some(found)
    }
}

fn money(value: Option<&Value>) -> Option<Money> {
    let value = value?;
    let amount = value.get("value").and_then(Value::as_f64)?;
    Some(Money {
        value: Some(amount),
        currency: string(value, "currency"),
    })
}

fn attachment(value: &Value) -> Attachment {
    Attachment {
        content_type: string(value, "contentType"),
        data: string(value, "data"),
        url: string(value, "url"),
        title: string(value, "title"),
    }
}

fn human_name(value: &Value) -> HumanName {
    let strings = |field: &str| -> Vec<String> {
        value
            .get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    HumanName {
        use_: string(value, "use"),
        text: string(value, "text"),
        family: string(value, "family"),
        given: strings("given"),
        prefix: strings("prefix"),
    }
}

fn observation_value(value: &Value) -> Option<ObservationValue> {
    if let Some(found) = quantity(value.get("valueQuantity")) {
        return Some(ObservationValue::Quantity(found));
    }
    if let Some(concept) = codeable(value.get("valueCodeableConcept")) {
        return Some(ObservationValue::CodeableConcept(concept));
    }
    if let Some(text) = string(value, "valueString") {
        return Some(ObservationValue::String(text));
    }
    if let Some(flag) = value.get("valueBoolean").and_then(Value::as_bool) {
        return Some(ObservationValue::Boolean(flag));
    }
    if let Some(number) = value.get("valueInteger").and_then(Value::as_i64) {
        return Some(ObservationValue::Integer(number));
    }
    datetime(value.get("valueDateTime")).map(ObservationValue::DateTime)
}
