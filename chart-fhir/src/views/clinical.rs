//! Status filters, provenance relations and per-resource timelines.

use std::collections::{HashMap, HashSet};

use chart_core::{
    CarePlan, CodeableConcept, Condition, ConditionSpan, CostKind, CostPoint, EncounterSpan,
    ImmunizationSeries, MedicationAdherence, MedicationRequest, Patient, Reference, ResourceRef,
};

const CLINICAL_STATUS_SYSTEM: &str = "condition-clinical";
const ACTIVE_CLINICAL_STATUSES: [&str; 3] = ["active", "recurrence", "relapse"];
const ACTIVE_STATUSES: [&str; 2] = ["active", "on-hold"];

pub fn is_active_condition(condition: &Condition) -> bool {
    condition.clinical_status.as_ref().is_some_and(|status| {
        ACTIVE_CLINICAL_STATUSES
            .iter()
            .any(|code| status.has_coding(CLINICAL_STATUS_SYSTEM, code))
    })
}

fn is_active_status(status: Option<&str>) -> bool {
    status.is_some_and(|status| ACTIVE_STATUSES.contains(&status))
}

pub fn active_conditions(patient: &Patient) -> Vec<&Condition> {
    patient
        .conditions
        .iter()
        .filter(|condition| is_active_condition(condition))
        .collect()
}

pub fn active_medications(patient: &Patient) -> Vec<&MedicationRequest> {
    patient
        .medication_requests
        .iter()
        .filter(|request| is_active_status(request.status.as_deref()))
        .collect()
}

pub fn active_care_plans(patient: &Patient) -> Vec<&CarePlan> {
    patient
        .care_plans
        .iter()
        .filter(|plan| is_active_status(plan.status.as_deref()))
        .collect()
}

/// Resources linked to `id` through Provenance.
///
/// A Provenance links `id` when one of its targets ends with it; when
/// `relationship` is given, one of its agents must also carry that type
/// code. The other targets of each linking Provenance are resolved against
/// the patient's collections and returned once each.
pub fn related_resources<'a>(
    patient: &'a Patient,
    id: &str,
    relationship: Option<&str>,
) -> Vec<ResourceRef<'a>> {
    let mut related = Vec::new();
    let mut seen = HashSet::new();

    for provenance in &patient.provenances {
        if !provenance.targets.iter().any(|target| target.points_to(id)) {
            continue;
        }

        if let Some(code) = relationship {
            let agent_matches = provenance.agents.iter().any(|agent| {
                agent
                    .agent_type
                    .as_ref()
                    .is_some_and(|agent_type| agent_type.has_code(code))
            });
            if !agent_matches {
                continue;
            }
        }

        for target in provenance.targets.iter().filter(|target| !target.points_to(id)) {
            let Some(resource) = patient.resolve(target) else {
                continue;
            };
            if seen.insert((resource.kind(), resource.id())) {
                related.push(resource);
            }
        }
    }

    related
}

pub fn encounter_timeline(patient: &Patient) -> Vec<EncounterSpan> {
    let mut spans: Vec<EncounterSpan> = patient
        .encounters
        .iter()
        .filter_map(|encounter| {
            Some(EncounterSpan {
                id: encounter.id.clone(),
                start: encounter.period.start?,
                end: encounter.period.end,
                class: first_label(&encounter.class),
                encounter_type: first_label(&encounter.types),
                reason: first_label(&encounter.reason),
                status: encounter.status.clone(),
            })
        })
        .collect();

    spans.sort_by_key(|span| span.start);
    spans
}

/// Onset to abatement spans; conditions without an onset fall back to the
/// recorded date.
pub fn condition_timeline(patient: &Patient) -> Vec<ConditionSpan> {
    let mut spans: Vec<ConditionSpan> = patient
        .conditions
        .iter()
        .filter_map(|condition| {
            Some(ConditionSpan {
                id: condition.id.clone(),
                label: label_or(condition.code.as_ref(), "Condition"),
                onset: condition.onset.or(condition.recorded_date)?,
                abatement: condition.abatement,
                active: is_active_condition(condition),
            })
        })
        .collect();

    spans.sort_by_key(|span| span.onset);
    spans
}

/// Administered vaccines grouped by name, in order of first appearance.
pub fn immunization_history(patient: &Patient) -> Vec<ImmunizationSeries> {
    let mut series: Vec<ImmunizationSeries> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for immunization in &patient.immunizations {
        let vaccine = label_or(immunization.vaccine_code.as_ref(), "Immunization");
        let slot = *index.entry(vaccine.clone()).or_insert_with(|| {
            series.push(ImmunizationSeries {
                vaccine,
                code: immunization
                    .vaccine_code
                    .as_ref()
                    .and_then(CodeableConcept::first_code)
                    .map(str::to_string),
                dates: Vec::new(),
            });
            series.len() - 1
        });

        if let Some(at) = immunization.occurrence {
            series[slot].dates.push(at);
        }
    }

    for entry in &mut series {
        entry.dates.sort();
    }
    series
}

/// Prescriptions per medication next to the administrations recorded for it.
pub fn medication_adherence(patient: &Patient) -> Vec<MedicationAdherence> {
    let mut rows: Vec<MedicationAdherence> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut request_keys: HashMap<&str, String> = HashMap::new();

    for request in &patient.medication_requests {
        let Some(concept) = request_medication(patient, request) else {
            continue;
        };
        let Some(key) = medication_key(concept) else {
            continue;
        };
        if let Some(id) = request.id.as_deref() {
            request_keys.insert(id, key.clone());
        }

        let slot = *index.entry(key).or_insert_with(|| {
            rows.push(MedicationAdherence {
                medication: label_or(Some(concept), "Medication"),
                code: concept.first_code().map(str::to_string),
                prescriptions: 0,
                administrations: 0,
                first_prescribed: None,
                last_prescribed: None,
                active: false,
                adherence: None,
            });
            rows.len() - 1
        });

        let row = &mut rows[slot];
        row.prescriptions += 1;
        row.active |= is_active_status(request.status.as_deref());
        if let Some(at) = request.authored_on {
            row.first_prescribed = Some(row.first_prescribed.map_or(at, |first| first.min(at)));
            row.last_prescribed = Some(row.last_prescribed.map_or(at, |last| last.max(at)));
        }
    }

    for administration in &patient.medication_administrations {
        let key = administration
            .medication
            .as_ref()
            .and_then(medication_key)
            .or_else(|| {
                administration
                    .request
                    .as_ref()
                    .and_then(Reference::target_id)
                    .and_then(|id| request_keys.get(id).cloned())
            });

        if let Some(slot) = key.and_then(|key| index.get(&key).copied()) {
            rows[slot].administrations += 1;
        }
    }

    for row in &mut rows {
        if row.prescriptions > 0 {
            let ratio = row.administrations as f64 / row.prescriptions as f64;
            row.adherence = Some((ratio * 100.0).round() / 100.0);
        }
    }
    rows
}

/// Claim totals and EOB payments as dated amounts, oldest first.
pub fn claim_costs(patient: &Patient) -> Vec<CostPoint> {
    let claims = patient.claims.iter().filter_map(|claim| {
        let total = claim.total.as_ref()?;
        Some(CostPoint {
            date: claim.created.or(claim.billable_period.start)?,
            amount: total.value?,
            currency: total.currency.clone(),
            kind: CostKind::Claim,
            id: claim.id.clone(),
        })
    });

    let payments = patient.explanation_of_benefits.iter().filter_map(|eob| {
        let amount = eob.payment.as_ref().or_else(|| eob.totals.first())?;
        Some(CostPoint {
            date: eob.created.or(eob.billable_period.start)?,
            amount: amount.value?,
            currency: amount.currency.clone(),
            kind: CostKind::Payment,
            id: eob.id.clone(),
        })
    });

    let mut points: Vec<CostPoint> = claims.chain(payments).collect();
    points.sort_by_key(|point| point.date);
    points
}

/// Medication concept of a request, following `medicationReference` into
/// the bundle's Medication resources when needed.
pub(crate) fn request_medication<'a>(
    patient: &'a Patient,
    request: &'a MedicationRequest,
) -> Option<&'a CodeableConcept> {
    if let Some(concept) = request.medication.as_ref() {
        return Some(concept);
    }
    match patient.resolve(request.medication_reference.as_ref()?)? {
        ResourceRef::Medication(medication) => medication.code.as_ref(),
        _ => None,
    }
}

fn medication_key(concept: &CodeableConcept) -> Option<String> {
    concept
        .first_code()
        .or_else(|| concept.display_text())
        .map(str::to_lowercase)
}

fn first_label(concepts: &[CodeableConcept]) -> Option<String> {
    concepts
        .iter()
        .find_map(CodeableConcept::display_text)
        .map(str::to_string)
}

fn label_or(concept: Option<&CodeableConcept>, fallback: &str) -> String {
    concept
        .and_then(CodeableConcept::display_text)
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::*;
    use chart_core::*;

    fn condition_with_status(id: &str, status: &str) -> Condition {
        Condition {
            id: Some(id.to_string()),
            clinical_status: Some(coded(
                "http://terminology.hl7.org/CodeSystem/condition-clinical",
                status,
                status,
            )),
            onset: Some(at("2020-01-01")),
            ..Condition::default()
        }
    }

    #[test]
    fn active_conditions_follow_clinical_status() {
        let patient = Patient {
            conditions: vec![
                condition_with_status("a", "active"),
                condition_with_status("b", "resolved"),
                condition_with_status("c", "recurrence"),
                condition_with_status("d", "inactive"),
                condition_with_status("e", "relapse"),
                Condition::default(),
            ],
            ..Patient::default()
        };

        let ids: Vec<_> = active_conditions(&patient)
            .iter()
            .map(|c| c.id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "c", "e"]);
    }

    #[test]
    fn active_status_covers_on_hold() {
        let request = |id: &str, status: &str| MedicationRequest {
            id: Some(id.to_string()),
            status: Some(status.to_string()),
            ..MedicationRequest::default()
        };
        let plan = |status: &str| CarePlan {
            status: Some(status.to_string()),
            ..CarePlan::default()
        };
        let patient = Patient {
            medication_requests: vec![
                request("m1", "active"),
                request("m2", "stopped"),
                request("m3", "on-hold"),
            ],
            care_plans: vec![plan("completed"), plan("active")],
            ..Patient::default()
        };

        assert_eq!(active_medications(&patient).len(), 2);
        assert_eq!(active_care_plans(&patient).len(), 1);
    }

    #[test]
    fn related_resources_follow_provenance_targets() {
        let reference = |r: &str| Reference {
            reference: Some(r.to_string()),
            display: None,
        };
        let agent = |code: &str| ProvenanceAgent {
            agent_type: Some(coded(
                "http://terminology.hl7.org/CodeSystem/provenance-participant-type",
                code,
                code,
            )),
            ..ProvenanceAgent::default()
        };

        let patient = Patient {
            encounters: vec![Encounter {
                id: Some("enc-1".to_string()),
                ..Encounter::default()
            }],
            procedures: vec![Procedure {
                id: Some("proc-1".to_string()),
                ..Procedure::default()
            }],
            observations: vec![Observation {
                id: Some("obs-1".to_string()),
                ..Observation::default()
            }],
            provenances: vec![
                Provenance {
                    targets: vec![
                        reference("urn:uuid:enc-1"),
                        reference("urn:uuid:proc-1"),
                        reference("urn:uuid:missing"),
                    ],
                    agents: vec![agent("author")],
                    ..Provenance::default()
                },
                Provenance {
                    targets: vec![
                        reference("Encounter/enc-1"),
                        reference("Observation/obs-1"),
                        reference("Procedure/proc-1"),
                    ],
                    agents: vec![agent("transmitter")],
                    ..Provenance::default()
                },
            ],
            ..Patient::default()
        };

        let all: Vec<_> = related_resources(&patient, "enc-1", None)
            .iter()
            .map(|r| r.reference().unwrap())
            .collect();
        assert_eq!(all, vec!["Procedure/proc-1", "Observation/obs-1"]);

        let authored: Vec<_> = related_resources(&patient, "enc-1", Some("author"))
            .iter()
            .map(|r| r.reference().unwrap())
            .collect();
        assert_eq!(authored, vec!["Procedure/proc-1"]);

        assert!(related_resources(&patient, "nothing", None).is_empty());
    }

    #[test]
    fn adherence_counts_administrations_by_code_and_request() {
        let metformin = coded("http://www.nlm.nih.gov/research/umls/rxnorm", "860975", "Metformin");
        let patient = Patient {
            medication_requests: vec![
                MedicationRequest {
                    id: Some("rx-1".to_string()),
                    status: Some("completed".to_string()),
                    medication: Some(metformin.clone()),
                    authored_on: Some(at("2020-01-01")),
                    ..MedicationRequest::default()
                },
                MedicationRequest {
                    id: Some("rx-2".to_string()),
                    status: Some("active".to_string()),
                    medication: Some(metformin.clone()),
                    authored_on: Some(at("2021-01-01")),
                    ..MedicationRequest::default()
                },
            ],
            medication_administrations: vec![
                MedicationAdministration {
                    medication: Some(metformin),
                    ..MedicationAdministration::default()
                },
                MedicationAdministration {
                    request: Some(Reference {
                        reference: Some("MedicationRequest/rx-1".to_string()),
                        display: None,
                    }),
                    ..MedicationAdministration::default()
                },
            ],
            ..Patient::default()
        };

        let rows = medication_adherence(&patient);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.medication, "Metformin");
        assert_eq!((row.prescriptions, row.administrations), (2, 2));
        assert!(row.active);
        assert_eq!(row.first_prescribed, Some(at("2020-01-01")));
        assert_eq!(row.last_prescribed, Some(at("2021-01-01")));
        assert_eq!(row.adherence, Some(1.0));
    }

    #[test]
    fn immunizations_group_by_vaccine() {
        let flu = coded("http://hl7.org/fhir/sid/cvx", "140", "Influenza");
        let shot = |date: &str| Immunization {
            vaccine_code: Some(flu.clone()),
            occurrence: Some(at(date)),
            ..Immunization::default()
        };
        let patient = Patient {
            immunizations: vec![shot("2021-10-01"), shot("2019-10-01")],
            ..Patient::default()
        };

        let series = immunization_history(&patient);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].code.as_deref(), Some("140"));
        assert_eq!(series[0].dates, vec![at("2019-10-01"), at("2021-10-01")]);
    }

    #[test]
    fn costs_merge_claims_and_payments() {
        let patient = Patient {
            claims: vec![Claim {
                id: Some("cl-1".to_string()),
                created: Some(at("2020-02-01")),
                total: Some(Money {
                    value: Some(125.5),
                    currency: Some("USD".to_string()),
                }),
                ..Claim::default()
            }],
            explanation_of_benefits: vec![ExplanationOfBenefit {
                id: Some("eob-1".to_string()),
                created: Some(at("2020-01-15")),
                payment: Some(Money {
                    value: Some(100.0),
                    currency: Some("USD".to_string()),
                }),
                ..ExplanationOfBenefit::default()
            }],
            ..Patient::default()
        };

        let points = claim_costs(&patient);
        let kinds: Vec<_> = points.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![CostKind::Payment, CostKind::Claim]);
    }

    #[test]
    fn condition_timeline_marks_active_spans() {
        let mut resolved = condition_with_status("b", "resolved");
        resolved.abatement = Some(at("2020-06-01"));
        let patient = Patient {
            conditions: vec![condition_with_status("a", "active"), resolved],
            ..Patient::default()
        };

        let spans = condition_timeline(&patient);
        assert_eq!(spans.len(), 2);
        assert!(spans[0].active);
        assert!(!spans[1].active);
        assert_eq!(spans[1].abatement, Some(at("2020-06-01")));
    }
}
