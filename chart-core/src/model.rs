//! Typed FHIR resources, reduced to the fields the chart views read.
//!
//! Every field is optional or a possibly-empty list. The decoder in
//! `chart-fhir` fills what it finds and leaves the rest empty, so view code
//! never has to check the shape of the JSON again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Coding {
    pub system: Option<String>,
    pub code: Option<String>,
    pub display: Option<String>,
}

impl Coding {
    /// True when the system ends with `system_suffix` and the code matches exactly.
    pub fn is(&self, system_suffix: &str, code: &str) -> bool {
        self.system
            .as_deref()
            .is_some_and(|system| system.ends_with(system_suffix))
            && self.code.as_deref() == Some(code)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
    pub text: Option<String>,
}

impl CodeableConcept {
    /// Human readable label: `text`, then the first coding display, then the first code.
    pub fn display_text(&self) -> Option<&str> {
        fn non_blank(value: &Option<String>) -> Option<&str> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
        }

        non_blank(&self.text)
            .or_else(|| self.coding.iter().find_map(|coding| non_blank(&coding.display)))
            .or_else(|| self.coding.iter().find_map(|coding| non_blank(&coding.code)))
    }

    pub fn has_coding(&self, system_suffix: &str, code: &str) -> bool {
        self.coding.iter().any(|coding| coding.is(system_suffix, code))
    }

    /// Any coding carries `code`, whatever its system.
    pub fn has_code(&self, code: &str) -> bool {
        self.coding
            .iter()
            .any(|coding| coding.code.as_deref() == Some(code))
    }

    pub fn first_code(&self) -> Option<&str> {
        self.coding.iter().find_map(|coding| coding.code.as_deref())
    }

    /// Case-insensitive substring match over `text` and every coding display.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.text
            .iter()
            .chain(self.coding.iter().filter_map(|coding| coding.display.as_ref()))
            .any(|text| text.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Reference {
    pub reference: Option<String>,
    pub display: Option<String>,
}

impl Reference {
    /// True when the reference string ends with `id`.
    pub fn points_to(&self, id: &str) -> bool {
        !id.is_empty()
            && self
                .reference
                .as_deref()
                .is_some_and(|reference| reference.ends_with(id))
    }

    /// Last segment of the reference: `abc` for `Observation/abc` or `urn:uuid:abc`.
    pub fn target_id(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|reference| reference.rsplit(['/', ':']).next())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Period {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Period {
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self {
            start: Some(at),
            end: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Quantity {
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub system: Option<String>,
    pub code: Option<String>,
}

impl Quantity {
    /// `value` followed by the unit when there is one, e.g. `72 kg`.
    pub fn format(&self) -> Option<String> {
        let number = format_numeric(self.value?);
        match self.unit.as_deref().filter(|unit| !unit.is_empty()) {
            Some(unit) => Some(format!("{number} {unit}")),
            None => Some(number),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Money {
    pub value: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HumanName {
    #[serde(rename = "use")]
    pub use_: Option<String>,
    pub text: Option<String>,
    pub family: Option<String>,
    pub given: Vec<String>,
    pub prefix: Vec<String>,
}

impl HumanName {
    pub fn full_name(&self) -> Option<String> {
        if let Some(text) = self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(text.trim().to_string());
        }

        let parts: Vec<&str> = self
            .prefix
            .iter()
            .chain(self.given.iter())
            .map(String::as_str)
            .chain(self.family.as_deref())
            .filter(|part| !part.trim().is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Identifier {
    pub system: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: Option<String>,
    pub data: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// `Patient.gender`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdministrativeGender {
    Male,
    Female,
    Other,
    Unknown,
}

impl AdministrativeGender {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

/// `Observation.value[x]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ObservationValue {
    Quantity(Quantity),
    CodeableConcept(CodeableConcept),
    String(String),
    Boolean(bool),
    Integer(i64),
    DateTime(DateTime<Utc>),
}

impl ObservationValue {
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Self::Quantity(quantity) => quantity.value,
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::Quantity(quantity) => quantity.unit.as_deref(),
            _ => None,
        }
    }

    pub fn display(&self) -> Option<String> {
        match self {
            Self::Quantity(quantity) => quantity.format(),
            Self::CodeableConcept(concept) => concept.display_text().map(str::to_string),
            Self::String(text) if !text.is_empty() => Some(text.clone()),
            Self::String(_) => None,
            Self::Boolean(flag) => Some(flag.to_string()),
            Self::Integer(value) => Some(value.to_string()),
            Self::DateTime(at) => Some(at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservationComponent {
    pub code: Option<CodeableConcept>,
    pub value: Option<ObservationValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Encounter {
    pub id: Option<String>,
    pub status: Option<String>,
    pub class: Vec<CodeableConcept>,
    #[serde(rename = "type")]
    pub types: Vec<CodeableConcept>,
    pub period: Period,
    pub reason: Vec<CodeableConcept>,
    pub service_provider: Option<Reference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Condition {
    pub id: Option<String>,
    pub clinical_status: Option<CodeableConcept>,
    pub verification_status: Option<CodeableConcept>,
    pub category: Vec<CodeableConcept>,
    pub code: Option<CodeableConcept>,
    pub onset: Option<DateTime<Utc>>,
    pub abatement: Option<DateTime<Utc>>,
    pub recorded_date: Option<DateTime<Utc>>,
    pub encounter: Option<Reference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Observation {
    pub id: Option<String>,
    pub status: Option<String>,
    pub category: Vec<CodeableConcept>,
    pub code: Option<CodeableConcept>,
    pub effective: Option<DateTime<Utc>>,
    pub issued: Option<DateTime<Utc>>,
    pub value: Option<ObservationValue>,
    pub components: Vec<ObservationComponent>,
    pub encounter: Option<Reference>,
}

impl Observation {
    pub fn has_loinc(&self, code: &str) -> bool {
        self.code
            .as_ref()
            .is_some_and(|concept| concept.has_code(code))
    }

    pub fn label(&self) -> Option<&str> {
        self.code.as_ref().and_then(CodeableConcept::display_text)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Immunization {
    pub id: Option<String>,
    pub status: Option<String>,
    pub vaccine_code: Option<CodeableConcept>,
    pub occurrence: Option<DateTime<Utc>>,
    pub encounter: Option<Reference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub id: Option<String>,
    pub status: Option<String>,
    pub category: Vec<CodeableConcept>,
    pub code: Option<CodeableConcept>,
    pub effective: Option<DateTime<Utc>>,
    pub issued: Option<DateTime<Utc>>,
    pub results: Vec<Reference>,
    pub encounter: Option<Reference>,
    pub presented_form: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentReference {
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<CodeableConcept>,
    pub category: Vec<CodeableConcept>,
    pub date: Option<DateTime<Utc>>,
    pub authors: Vec<Reference>,
    pub content: Vec<Attachment>,
    pub encounters: Vec<Reference>,
    pub period: Period,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Claim {
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "use")]
    pub use_: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub billable_period: Period,
    pub total: Option<Money>,
    pub provider: Option<Reference>,
    pub items: Vec<CodeableConcept>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ExplanationOfBenefit {
    pub id: Option<String>,
    pub status: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub billable_period: Period,
    pub claim: Option<Reference>,
    pub totals: Vec<Money>,
    pub payment: Option<Money>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Procedure {
    pub id: Option<String>,
    pub status: Option<String>,
    pub code: Option<CodeableConcept>,
    pub performed: Period,
    pub reason: Vec<CodeableConcept>,
    pub encounter: Option<Reference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MedicationRequest {
    pub id: Option<String>,
    pub status: Option<String>,
    pub intent: Option<String>,
    pub medication: Option<CodeableConcept>,
    pub medication_reference: Option<Reference>,
    pub authored_on: Option<DateTime<Utc>>,
    pub requester: Option<Reference>,
    pub reason: Vec<CodeableConcept>,
    pub dosage: Vec<String>,
    pub encounter: Option<Reference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CareTeam {
    pub id: Option<String>,
    pub status: Option<String>,
    pub name: Option<String>,
    pub period: Period,
    pub members: Vec<Reference>,
    pub reason: Vec<CodeableConcept>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CarePlan {
    pub id: Option<String>,
    pub status: Option<String>,
    pub intent: Option<String>,
    pub title: Option<String>,
    pub category: Vec<CodeableConcept>,
    pub period: Period,
    pub activities: Vec<CodeableConcept>,
    pub addresses: Vec<Reference>,
}

impl CarePlan {
    pub fn label(&self) -> Option<&str> {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .or_else(|| self.category.iter().find_map(CodeableConcept::display_text))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvenanceAgent {
    #[serde(rename = "type")]
    pub agent_type: Option<CodeableConcept>,
    pub who: Option<Reference>,
    pub on_behalf_of: Option<Reference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Provenance {
    pub id: Option<String>,
    pub targets: Vec<Reference>,
    pub recorded: Option<DateTime<Utc>>,
    pub agents: Vec<ProvenanceAgent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Device {
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<CodeableConcept>,
    pub distinct_identifier: Option<String>,
    pub manufacture_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub lot_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupplyDelivery {
    pub id: Option<String>,
    pub status: Option<String>,
    pub item: Option<CodeableConcept>,
    pub quantity: Option<Quantity>,
    pub occurrence: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Medication {
    pub id: Option<String>,
    pub status: Option<String>,
    pub code: Option<CodeableConcept>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MedicationAdministration {
    pub id: Option<String>,
    pub status: Option<String>,
    pub medication: Option<CodeableConcept>,
    pub effective: Period,
    pub request: Option<Reference>,
    pub encounter: Option<Reference>,
}

/// Renders a number without trailing zeros for whole values.
pub fn format_numeric(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else if (value * 10.0).fract().abs() < f64::EPSILON {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(system: &str, code: &str, display: Option<&str>) -> CodeableConcept {
        CodeableConcept {
            coding: vec![Coding {
                system: Some(system.to_string()),
                code: Some(code.to_string()),
                display: display.map(str::to_string),
            }],
            text: None,
        }
    }

    #[test]
    fn display_text_prefers_text_then_display_then_code() {
        let mut c = concept("http://loinc.org", "8302-2", Some("Body Height"));
        assert_eq!(c.display_text(), Some("Body Height"));

        c.text = Some("  Height ".to_string());
        assert_eq!(c.display_text(), Some("Height"));

        let bare = concept("http://loinc.org", "8302-2", None);
        assert_eq!(bare.display_text(), Some("8302-2"));
    }

    #[test]
    fn coding_match_uses_system_suffix_and_exact_code() {
        let c = concept(
            "http://terminology.hl7.org/CodeSystem/observation-category",
            "vital-signs",
            None,
        );
        assert!(c.has_coding("observation-category", "vital-signs"));
        assert!(!c.has_coding("observation-category", "Vital-Signs"));
        assert!(!c.has_coding("condition-clinical", "vital-signs"));
    }

    #[test]
    fn mentions_is_case_insensitive() {
        let c = concept("http://loinc.org", "29463-7", Some("Body Weight"));
        assert!(c.mentions("weight"));
        assert!(c.mentions("BODY"));
        assert!(!c.mentions("height"));
    }

    #[test]
    fn reference_matches_id_suffix() {
        let r = Reference {
            reference: Some("urn:uuid:abc-123".to_string()),
            display: None,
        };
        assert!(r.points_to("abc-123"));
        assert!(!r.points_to("abc"));
        assert!(!r.points_to(""));
        assert_eq!(r.target_id(), Some("abc-123"));

        let relative = Reference {
            reference: Some("Observation/obs-9".to_string()),
            display: None,
        };
        assert_eq!(relative.target_id(), Some("obs-9"));
    }

    #[test]
    fn human_name_joins_parts() {
        let name = HumanName {
            prefix: vec!["Mrs.".to_string()],
            given: vec!["Jane".to_string()],
            family: Some("Doe".to_string()),
            ..HumanName::default()
        };
        assert_eq!(name.full_name().as_deref(), Some("Mrs. Jane Doe"));
        assert_eq!(HumanName::default().full_name(), None);
    }

    #[test]
    fn quantity_formats_whole_and_fractional_values() {
        let q = Quantity {
            value: Some(72.0),
            unit: Some("kg".to_string()),
            ..Quantity::default()
        };
        assert_eq!(q.format().as_deref(), Some("72 kg"));

        let q = Quantity {
            value: Some(1.5),
            ..Quantity::default()
        };
        assert_eq!(q.format().as_deref(), Some("1.5"));
    }

    #[test]
    fn observation_value_serializes_with_kind_tag() {
        let value = ObservationValue::String("positive".to_string());
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "string", "value": "positive"}));
    }
}
