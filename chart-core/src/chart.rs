//! Flat structures returned by the derived views, shaped for a charting library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::patient::ResourceKind;

/// One point of a numeric trend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BloodPressurePoint {
    pub date: DateTime<Utc>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub unit: Option<String>,
}

/// Label used to group entries of the unified event history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Encounter,
    Procedure,
    Condition,
    Note,
    DiagnosticReport,
    Observation,
    Medication,
    Immunization,
    CarePlan,
}

/// One entry of the unified, time-ordered event history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub label: String,
    pub resource_type: ResourceKind,
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

/// Optional details attached to an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<String>,
}

impl EventMetadata {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.code.is_none()
            && self.category.is_none()
            && self.value.is_none()
            && self.reason.is_none()
            && self.encounter.is_none()
    }

    /// `None` when no field is set, so the record omits metadata entirely.
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalNote {
    pub id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub note_type: Option<String>,
    pub authors: Vec<String>,
    pub content_type: Option<String>,
    pub text: Option<String>,
    pub decoded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncounterSpan {
    pub id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub class: Option<String>,
    pub encounter_type: Option<String>,
    pub reason: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSpan {
    pub id: Option<String>,
    pub label: String,
    pub onset: DateTime<Utc>,
    pub abatement: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImmunizationSeries {
    pub vaccine: String,
    pub code: Option<String>,
    pub dates: Vec<DateTime<Utc>>,
}

/// Prescriptions versus recorded administrations for one medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MedicationAdherence {
    pub medication: String,
    pub code: Option<String>,
    pub prescriptions: usize,
    pub administrations: usize,
    pub first_prescribed: Option<DateTime<Utc>>,
    pub last_prescribed: Option<DateTime<Utc>>,
    pub active: bool,
    /// Administrations per prescription; `None` without prescriptions.
    pub adherence: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    Claim,
    Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostPoint {
    pub date: DateTime<Utc>,
    pub amount: f64,
    pub currency: Option<String>,
    pub kind: CostKind,
    pub id: Option<String>,
}
