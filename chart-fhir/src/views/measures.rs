//! Age and the closed-form measures (BMI, eGFR).

use chart_core::{AdministrativeGender, Patient};
use chrono::{Datelike, NaiveDate, Utc};

use super::{loinc, observations::latest_value};

/// Age in whole years as of the current UTC date.
pub fn age(patient: &Patient) -> Option<u32> {
    age_on(patient, Utc::now().date_naive())
}

/// Age in whole years on `today`; one less until the birthday is reached.
pub fn age_on(patient: &Patient, today: NaiveDate) -> Option<u32> {
    let birth_date = patient.birth_date?;
    let mut age = today.year() - birth_date.year();

    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }

    u32::try_from(age).ok()
}

/// Body mass index from the latest weight (kg) and height (cm).
///
/// `None` when either measurement is missing.
pub fn bmi(patient: &Patient) -> Option<f64> {
    let weight = latest_value(patient, loinc::BODY_WEIGHT)?;
    let height_cm = latest_value(patient, loinc::BODY_HEIGHT)?;
    if height_cm <= 0.0 {
        return None;
    }

    let height_m = height_cm / 100.0;
    Some(round_one(weight / (height_m * height_m)))
}

/// eGFR as of the current UTC date. See [`egfr_on`].
pub fn egfr(patient: &Patient) -> f64 {
    egfr_on(patient, Utc::now().date_naive())
}

/// CKD-EPI 2009 eGFR without the race coefficient.
///
/// Returns `0.0`, not `None`, when creatinine, age or gender is missing;
/// consumers read this view as a number. A creatinine that is not a
/// positive finite value counts as missing.
pub fn egfr_on(patient: &Patient, today: NaiveDate) -> f64 {
    let Some(creatinine) = latest_value(patient, loinc::CREATININE)
        .filter(|value| value.is_finite() && *value > 0.0)
    else {
        return 0.0;
    };
    let Some(age) = age_on(patient, today) else {
        return 0.0;
    };
    let Some(gender) = patient.gender else {
        return 0.0;
    };

    ckd_epi(creatinine, age, gender == AdministrativeGender::Female)
}

pub fn ckd_epi(creatinine: f64, age: u32, female: bool) -> f64 {
    let (k, alpha) = if female { (0.7, -0.329) } else { (0.9, -0.411) };
    let ratio = creatinine / k;
    let min_ratio = ratio.min(1.0);
    let max_ratio = ratio.max(1.0);

    let value = 141.0
        * min_ratio.powf(alpha)
        * max_ratio.powf(-1.209)
        * 0.993_f64.powf(f64::from(age));
    round_one(value)
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
