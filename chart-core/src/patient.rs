//! The indexed patient record and the tagged view over its resources.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::*;

/// Resource types the indexer knows about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Patient,
    Encounter,
    Condition,
    Observation,
    Immunization,
    DiagnosticReport,
    DocumentReference,
    Claim,
    ExplanationOfBenefit,
    Procedure,
    MedicationRequest,
    CareTeam,
    CarePlan,
    Provenance,
    Device,
    SupplyDelivery,
    Medication,
    MedicationAdministration,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 18] = [
        Self::Patient,
        Self::Encounter,
        Self::Condition,
        Self::Observation,
        Self::Immunization,
        Self::DiagnosticReport,
        Self::DocumentReference,
        Self::Claim,
        Self::ExplanationOfBenefit,
        Self::Procedure,
        Self::MedicationRequest,
        Self::CareTeam,
        Self::CarePlan,
        Self::Provenance,
        Self::Device,
        Self::SupplyDelivery,
        Self::Medication,
        Self::MedicationAdministration,
    ];

    /// The FHIR `resourceType` string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "Patient",
            Self::Encounter => "Encounter",
            Self::Condition => "Condition",
            Self::Observation => "Observation",
            Self::Immunization => "Immunization",
            Self::DiagnosticReport => "DiagnosticReport",
            Self::DocumentReference => "DocumentReference",
            Self::Claim => "Claim",
            Self::ExplanationOfBenefit => "ExplanationOfBenefit",
            Self::Procedure => "Procedure",
            Self::MedicationRequest => "MedicationRequest",
            Self::CareTeam => "CareTeam",
            Self::CarePlan => "CarePlan",
            Self::Provenance => "Provenance",
            Self::Device => "Device",
            Self::SupplyDelivery => "SupplyDelivery",
            Self::Medication => "Medication",
            Self::MedicationAdministration => "MedicationAdministration",
        }
    }

    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == resource_type)
    }
}

/// Demographics plus every related resource found in the same bundle.
///
/// Built once by the indexer and read-only afterwards. Collections keep
/// bundle order and are empty when nothing matched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Patient {
    pub id: Option<String>,
    pub identifiers: Vec<Identifier>,
    pub names: Vec<HumanName>,
    pub gender: Option<AdministrativeGender>,
    pub birth_date: Option<NaiveDate>,
    pub deceased: Option<DateTime<Utc>>,
    pub marital_status: Option<CodeableConcept>,

    pub encounters: Vec<Encounter>,
    pub conditions: Vec<Condition>,
    pub observations: Vec<Observation>,
    pub immunizations: Vec<Immunization>,
    pub diagnostic_reports: Vec<DiagnosticReport>,
    pub document_references: Vec<DocumentReference>,
    pub claims: Vec<Claim>,
    pub explanation_of_benefits: Vec<ExplanationOfBenefit>,
    pub procedures: Vec<Procedure>,
    pub medication_requests: Vec<MedicationRequest>,
    pub care_teams: Vec<CareTeam>,
    pub care_plans: Vec<CarePlan>,
    pub provenances: Vec<Provenance>,
    pub devices: Vec<Device>,
    pub supply_deliveries: Vec<SupplyDelivery>,
    pub medications: Vec<Medication>,
    pub medication_administrations: Vec<MedicationAdministration>,
}

impl Patient {
    /// Full text of the first name that has any content.
    pub fn display_name(&self) -> Option<String> {
        self.names.iter().find_map(HumanName::full_name)
    }

    /// Every indexed resource, collection by collection, in bundle order.
    pub fn resources(&self) -> impl Iterator<Item = ResourceRef<'_>> {
        self.encounters
            .iter()
            .map(ResourceRef::Encounter)
            .chain(self.conditions.iter().map(ResourceRef::Condition))
            .chain(self.observations.iter().map(ResourceRef::Observation))
            .chain(self.immunizations.iter().map(ResourceRef::Immunization))
            .chain(self.diagnostic_reports.iter().map(ResourceRef::DiagnosticReport))
            .chain(self.document_references.iter().map(ResourceRef::DocumentReference))
            .chain(self.claims.iter().map(ResourceRef::Claim))
            .chain(
                self.explanation_of_benefits
                    .iter()
                    .map(ResourceRef::ExplanationOfBenefit),
            )
            .chain(self.procedures.iter().map(ResourceRef::Procedure))
            .chain(self.medication_requests.iter().map(ResourceRef::MedicationRequest))
            .chain(self.care_teams.iter().map(ResourceRef::CareTeam))
            .chain(self.care_plans.iter().map(ResourceRef::CarePlan))
            .chain(self.provenances.iter().map(ResourceRef::Provenance))
            .chain(self.devices.iter().map(ResourceRef::Device))
            .chain(self.supply_deliveries.iter().map(ResourceRef::SupplyDelivery))
            .chain(self.medications.iter().map(ResourceRef::Medication))
            .chain(
                self.medication_administrations
                    .iter()
                    .map(ResourceRef::MedicationAdministration),
            )
    }

    /// Looks a resource up by its exact `id`.
    pub fn find(&self, id: &str) -> Option<ResourceRef<'_>> {
        self.resources().find(|resource| resource.id() == Some(id))
    }

    /// Resolves a reference (`Observation/abc`, `urn:uuid:abc`) to an indexed resource.
    pub fn resolve(&self, reference: &Reference) -> Option<ResourceRef<'_>> {
        reference.target_id().and_then(|id| self.find(id))
    }

    pub fn resource_count(&self) -> usize {
        self.resources().count()
    }
}

/// A borrowed resource of any known kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceRef<'a> {
    Encounter(&'a Encounter),
    Condition(&'a Condition),
    Observation(&'a Observation),
    Immunization(&'a Immunization),
    DiagnosticReport(&'a DiagnosticReport),
    DocumentReference(&'a DocumentReference),
    Claim(&'a Claim),
    ExplanationOfBenefit(&'a ExplanationOfBenefit),
    Procedure(&'a Procedure),
    MedicationRequest(&'a MedicationRequest),
    CareTeam(&'a CareTeam),
    CarePlan(&'a CarePlan),
    Provenance(&'a Provenance),
    Device(&'a Device),
    SupplyDelivery(&'a SupplyDelivery),
    Medication(&'a Medication),
    MedicationAdministration(&'a MedicationAdministration),
}

impl<'a> ResourceRef<'a> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Encounter(_) => ResourceKind::Encounter,
            Self::Condition(_) => ResourceKind::Condition,
            Self::Observation(_) => ResourceKind::Observation,
            Self::Immunization(_) => ResourceKind::Immunization,
            Self::DiagnosticReport(_) => ResourceKind::DiagnosticReport,
            Self::DocumentReference(_) => ResourceKind::DocumentReference,
            Self::Claim(_) => ResourceKind::Claim,
            Self::ExplanationOfBenefit(_) => ResourceKind::ExplanationOfBenefit,
            Self::Procedure(_) => ResourceKind::Procedure,
            Self::MedicationRequest(_) => ResourceKind::MedicationRequest,
            Self::CareTeam(_) => ResourceKind::CareTeam,
            Self::CarePlan(_) => ResourceKind::CarePlan,
            Self::Provenance(_) => ResourceKind::Provenance,
            Self::Device(_) => ResourceKind::Device,
            Self::SupplyDelivery(_) => ResourceKind::SupplyDelivery,
            Self::Medication(_) => ResourceKind::Medication,
            Self::MedicationAdministration(_) => ResourceKind::MedicationAdministration,
        }
    }

    pub fn id(&self) -> Option<&'a str> {
        let id = match self {
            Self::Encounter(r) => &r.id,
            Self::Condition(r) => &r.id,
            Self::Observation(r) => &r.id,
            Self::Immunization(r) => &r.id,
            Self::DiagnosticReport(r) => &r.id,
            Self::DocumentReference(r) => &r.id,
            Self::Claim(r) => &r.id,
            Self::ExplanationOfBenefit(r) => &r.id,
            Self::Procedure(r) => &r.id,
            Self::MedicationRequest(r) => &r.id,
            Self::CareTeam(r) => &r.id,
            Self::CarePlan(r) => &r.id,
            Self::Provenance(r) => &r.id,
            Self::Device(r) => &r.id,
            Self::SupplyDelivery(r) => &r.id,
            Self::Medication(r) => &r.id,
            Self::MedicationAdministration(r) => &r.id,
        };
        id.as_deref()
    }

    /// `Type/id` form used when a view needs to point back at its source.
    pub fn reference(&self) -> Option<String> {
        self.id().map(|id| format!("{}/{id}", self.kind().as_str()))
    }
}

impl Serialize for ResourceRef<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = self.kind();
        match self {
            Self::Encounter(r) => tagged(kind, *r, serializer),
            Self::Condition(r) => tagged(kind, *r, serializer),
            Self::Observation(r) => tagged(kind, *r, serializer),
            Self::Immunization(r) => tagged(kind, *r, serializer),
            Self::DiagnosticReport(r) => tagged(kind, *r, serializer),
            Self::DocumentReference(r) => tagged(kind, *r, serializer),
            Self::Claim(r) => tagged(kind, *r, serializer),
            Self::ExplanationOfBenefit(r) => tagged(kind, *r, serializer),
            Self::Procedure(r) => tagged(kind, *r, serializer),
            Self::MedicationRequest(r) => tagged(kind, *r, serializer),
            Self::CareTeam(r) => tagged(kind, *r, serializer),
            Self::CarePlan(r) => tagged(kind, *r, serializer),
            Self::Provenance(r) => tagged(kind, *r, serializer),
            Self::Device(r) => tagged(kind, *r, serializer),
            Self::SupplyDelivery(r) => tagged(kind, *r, serializer),
            Self::Medication(r) => tagged(kind, *r, serializer),
            Self::MedicationAdministration(r) => tagged(kind, *r, serializer),
        }
    }
}

fn tagged<S, T>(kind: ResourceKind, resource: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: Serialize,
{
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Tagged<'r, T: Serialize> {
        resource_type: ResourceKind,
        #[serde(flatten)]
        resource: &'r T,
    }

    Tagged {
        resource_type: kind,
        resource,
    }
    .serialize(serializer)
}
