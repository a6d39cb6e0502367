//! Category filters, trends and latest-value lookups over observations.

use chart_core::{BloodPressurePoint, Observation, ObservationValue, Patient, TrendPoint};

use super::loinc;

pub const VITAL_SIGNS: &str = "vital-signs";
pub const LABORATORY: &str = "laboratory";

const CATEGORY_SYSTEM: &str = "observation-category";

/// True when a category coding under the observation-category system has
/// exactly `category` as its code.
pub fn in_category(observation: &Observation, category: &str) -> bool {
    observation
        .category
        .iter()
        .any(|concept| concept.has_coding(CATEGORY_SYSTEM, category))
}

/// First observation-category code, if any.
pub fn category_code(observation: &Observation) -> Option<&str> {
    observation
        .category
        .iter()
        .flat_map(|concept| concept.coding.iter())
        .find(|coding| {
            coding
                .system
                .as_deref()
                .is_some_and(|system| system.ends_with(CATEGORY_SYSTEM))
        })
        .and_then(|coding| coding.code.as_deref())
}

pub fn observations_by_category<'a>(patient: &'a Patient, category: &str) -> Vec<&'a Observation> {
    patient
        .observations
        .iter()
        .filter(|observation| in_category(observation, category))
        .collect()
}

pub fn vitals(patient: &Patient) -> Vec<&Observation> {
    observations_by_category(patient, VITAL_SIGNS)
}

pub fn lab_results(patient: &Patient) -> Vec<&Observation> {
    observations_by_category(patient, LABORATORY)
}

/// Vitals whose name contains `query` (case-insensitive), oldest first.
pub fn vital_trend(patient: &Patient, query: &str) -> Vec<TrendPoint> {
    trend(
        vitals(patient)
            .into_iter()
            .filter(|observation| mentions(observation, query)),
    )
}

/// Every observation carrying the LOINC `code`, oldest first.
pub fn observation_trend(patient: &Patient, code: &str) -> Vec<TrendPoint> {
    trend(
        patient
            .observations
            .iter()
            .filter(|observation| observation.has_loinc(code)),
    )
}

/// Systolic/diastolic pairs from blood pressure panels, oldest first.
pub fn blood_pressure_trend(patient: &Patient) -> Vec<BloodPressurePoint> {
    let mut points: Vec<BloodPressurePoint> = patient
        .observations
        .iter()
        .filter_map(|observation| {
            let date = observation.effective?;
            let systolic = component(observation, loinc::SYSTOLIC_BLOOD_PRESSURE);
            let diastolic = component(observation, loinc::DIASTOLIC_BLOOD_PRESSURE);
            if systolic.is_none() && diastolic.is_none() {
                return None;
            }

            let unit = systolic
                .or(diastolic)
                .and_then(ObservationValue::unit)
                .map(str::to_string);

            Some(BloodPressurePoint {
                date,
                systolic: systolic.and_then(ObservationValue::numeric),
                diastolic: diastolic.and_then(ObservationValue::numeric),
                unit,
            })
        })
        .collect();

    points.sort_by_key(|point| point.date);
    points
}

/// Most recent observation with the LOINC `code`.
pub fn latest_observation<'a>(patient: &'a Patient, code: &str) -> Option<&'a Observation> {
    latest(
        patient
            .observations
            .iter()
            .filter(|observation| observation.has_loinc(code)),
    )
}

/// Most recent vital whose name contains `query`.
pub fn latest_vital<'a>(patient: &'a Patient, query: &str) -> Option<&'a Observation> {
    latest(
        vitals(patient)
            .into_iter()
            .filter(|observation| mentions(observation, query)),
    )
}

/// Value of the most recent observation with the LOINC `code` that carries
/// a number. Entries without one (e.g. `dataAbsentReason`) are passed over.
pub fn latest_value(patient: &Patient, code: &str) -> Option<f64> {
    patient
        .observations
        .iter()
        .filter(|observation| observation.has_loinc(code))
        .filter_map(|observation| {
            let value = observation.value.as_ref().and_then(ObservationValue::numeric)?;
            Some((observation.effective, value))
        })
        .max_by_key(|(effective, _)| *effective)
        .map(|(_, value)| value)
}

/// Max by `effective`; on ties the later entry wins.
fn latest<'a>(observations: impl Iterator<Item = &'a Observation>) -> Option<&'a Observation> {
    observations.max_by_key(|observation| observation.effective)
}

fn mentions(observation: &Observation, query: &str) -> bool {
    observation
        .code
        .as_ref()
        .is_some_and(|code| code.mentions(query))
}

fn trend<'a>(observations: impl Iterator<Item = &'a Observation>) -> Vec<TrendPoint> {
    let mut points: Vec<TrendPoint> = observations
        .filter_map(|observation| {
            let value = observation.value.as_ref()?;
            Some(TrendPoint {
                date: observation.effective?,
                value: value.numeric()?,
                unit: value.unit().map(str::to_string),
            })
        })
        .collect();

    // Stable: equal dates keep bundle order.
    points.sort_by_key(|point| point.date);
    points
}

fn component<'a>(observation: &'a Observation, code: &str) -> Option<&'a ObservationValue> {
    observation
        .components
        .iter()
        .find(|component| {
            component
                .code
                .as_ref()
                .is_some_and(|concept| concept.has_code(code))
        })
        .and_then(|component| component.value.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::*;

    #[test]
    fn category_filter_is_exact_and_case_sensitive() {
        let mut upper = vital("o2", "Body Weight", "29463-7", "2020-01-01", 70.0, "kg");
        upper.category[0].coding[0].code = Some("Vital-Signs".to_string());
        let patient = patient_with_observations(vec![
            vital("o1", "Body Height", "8302-2", "2020-01-01", 175.0, "cm"),
            upper,
            lab("o3", "Creatinine", "2160-0", "2020-01-01", 1.0, "mg/dL"),
        ]);

        let ids: Vec<_> = vitals(&patient).iter().map(|o| o.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["o1"]);
        assert_eq!(lab_results(&patient).len(), 1);
    }

    #[test]
    fn trend_filters_by_name_and_sorts_stably() {
        let patient = patient_with_observations(vec![
            vital("w3", "Body Weight", "29463-7", "2021-01-01", 72.0, "kg"),
            vital("w1", "Body weight", "29463-7", "2020-01-01", 70.0, "kg"),
            vital("h1", "Body Height", "8302-2", "2020-01-01", 175.0, "cm"),
            vital("w2", "body WEIGHT", "29463-7", "2020-01-01", 71.0, "kg"),
        ]);

        let values: Vec<f64> = vital_trend(&patient, "WEIGHT")
            .iter()
            .map(|point| point.value)
            .collect();
        assert_eq!(values, vec![70.0, 71.0, 72.0]);
    }

    #[test]
    fn latest_picks_max_date_and_none_when_empty() {
        let patient = patient_with_observations(vec![
            vital("w1", "Body Weight", "29463-7", "2020-01-01", 70.0, "kg"),
            vital("w2", "Body Weight", "29463-7", "2022-01-01", 74.0, "kg"),
            vital("w3", "Body Weight", "29463-7", "2021-01-01", 72.0, "kg"),
        ]);

        let latest = latest_observation(&patient, "29463-7").unwrap();
        assert_eq!(latest.id.as_deref(), Some("w2"));
        assert_eq!(latest_value(&patient, "29463-7"), Some(74.0));
        assert!(latest_observation(&patient, "2160-0").is_none());
        assert!(latest_vital(&patient, "temperature").is_none());
    }

    #[test]
    fn latest_value_skips_entries_without_a_number() {
        let mut absent = vital("w3", "Body Weight", "29463-7", "2023-01-01", 0.0, "kg");
        absent.value = None;
        let patient = patient_with_observations(vec![
            vital("w1", "Body Weight", "29463-7", "2020-01-01", 70.0, "kg"),
            vital("w2", "Body Weight", "29463-7", "2022-01-01", 74.0, "kg"),
            absent,
        ]);

        assert_eq!(
            latest_observation(&patient, "29463-7").and_then(|o| o.id.as_deref()),
            Some("w3")
        );
        assert_eq!(latest_value(&patient, "29463-7"), Some(74.0));
    }

    #[test]
    fn blood_pressure_pairs_components() {
        let patient = patient_with_observations(vec![blood_pressure(
            "bp1",
            "2020-05-01",
            120.0,
            80.0,
        )]);

        let points = blood_pressure_trend(&patient);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].systolic, Some(120.0));
        assert_eq!(points[0].diastolic, Some(80.0));
        assert_eq!(points[0].unit.as_deref(), Some("mm[Hg]"));
    }
}
