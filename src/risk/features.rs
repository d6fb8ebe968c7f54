//! The fixed 12-feature clinical vector.
//!
//! Feature names and order follow the heart-failure clinical records
//! dataset the model was trained on. Validation is strict: a prediction
//! request must contain exactly these 12 keys, boolean-coded fields must be
//! 0 or 1, and continuous fields must fall inside a sane clinical range.
//! Nothing is coerced or silently dropped; every offending field is
//! reported back by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::api::error::FieldError;

pub const FEATURE_COUNT: usize = 12;

/// Canonical feature order expected by the model.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "age",
    "anaemia",
    "creatinine_phosphokinase",
    "diabetes",
    "ejection_fraction",
    "high_blood_pressure",
    "platelets",
    "serum_creatinine",
    "serum_sodium",
    "sex",
    "smoking",
    "time",
];

enum Constraint {
    /// Continuous value inside an inclusive range.
    Range(f64, f64),
    /// Boolean coded as 0 or 1.
    Binary,
}

const CONSTRAINTS: [(&str, Constraint); FEATURE_COUNT] = [
    ("age", Constraint::Range(0.0, 120.0)),
    ("anaemia", Constraint::Binary),
    ("creatinine_phosphokinase", Constraint::Range(0.0, 10_000.0)),
    ("diabetes", Constraint::Binary),
    ("ejection_fraction", Constraint::Range(0.0, 100.0)),
    ("high_blood_pressure", Constraint::Binary),
    ("platelets", Constraint::Range(0.0, 2_000_000.0)),
    ("serum_creatinine", Constraint::Range(0.0, 20.0)),
    ("serum_sodium", Constraint::Range(100.0, 200.0)),
    ("sex", Constraint::Binary),
    ("smoking", Constraint::Binary),
    ("time", Constraint::Range(0.0, 1_000.0)),
];

/// Validated medical feature values, in model order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeatureVector {
    pub age: f64,
    pub anaemia: f64,
    pub creatinine_phosphokinase: f64,
    pub diabetes: f64,
    pub ejection_fraction: f64,
    pub high_blood_pressure: f64,
    pub platelets: f64,
    pub serum_creatinine: f64,
    pub serum_sodium: f64,
    pub sex: f64,
    pub smoking: f64,
    pub time: f64,
}

impl FeatureVector {
    /// Validate a submitted feature map.
    ///
    /// # Errors
    /// Returns one [`FieldError`] per missing, unknown, non-finite or
    /// out-of-range field. No partial vector is ever produced.
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();

        for key in map.keys() {
            if !FEATURE_NAMES.contains(&key.as_str()) {
                errors.push(FieldError::new(key.clone(), "unknown field"));
            }
        }

        for (name, constraint) in &CONSTRAINTS {
            let Some(&value) = map.get(*name) else {
                errors.push(FieldError::new(*name, "missing field"));
                continue;
            };

            if !value.is_finite() {
                errors.push(FieldError::new(*name, "must be a finite number"));
                continue;
            }

            match constraint {
                Constraint::Binary => {
                    if value != 0.0 && value != 1.0 {
                        errors.push(FieldError::new(*name, "must be 0 or 1"));
                    }
                }
                Constraint::Range(min, max) => {
                    if value < *min || value > *max {
                        errors.push(FieldError::new(
                            *name,
                            format!("must be between {min} and {max}"),
                        ));
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let get = |name: &str| map[name];
        Ok(Self {
            age: get("age"),
            anaemia: get("anaemia"),
            creatinine_phosphokinase: get("creatinine_phosphokinase"),
            diabetes: get("diabetes"),
            ejection_fraction: get("ejection_fraction"),
            high_blood_pressure: get("high_blood_pressure"),
            platelets: get("platelets"),
            serum_creatinine: get("serum_creatinine"),
            serum_sodium: get("serum_sodium"),
            sex: get("sex"),
            smoking: get("smoking"),
            time: get("time"),
        })
    }

    /// Values in the canonical order of [`FEATURE_NAMES`].
    #[must_use]
    pub const fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.age,
            self.anaemia,
            self.creatinine_phosphokinase,
            self.diabetes,
            self.ejection_fraction,
            self.high_blood_pressure,
            self.platelets,
            self.serum_creatinine,
            self.serum_sodium,
            self.sex,
            self.smoking,
            self.time,
        ]
    }
}

#[cfg(test)]
pub(crate) fn sample_map() -> BTreeMap<String, f64> {
    [
        ("age", 60.0),
        ("anaemia", 0.0),
        ("creatinine_phosphokinase", 250.0),
        ("diabetes", 1.0),
        ("ejection_fraction", 38.0),
        ("high_blood_pressure", 0.0),
        ("platelets", 262_000.0),
        ("serum_creatinine", 1.1),
        ("serum_sodium", 137.0),
        ("sex", 1.0),
        ("smoking", 0.0),
        ("time", 115.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_map() {
        let vector = FeatureVector::from_map(&sample_map()).unwrap();
        assert_eq!(vector.age, 60.0);
        assert_eq!(vector.to_array()[4], 38.0); // ejection_fraction
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut map = sample_map();
        map.remove("ejection_fraction");

        let errors = FeatureVector::from_map(&map).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "ejection_fraction");
        assert_eq!(errors[0].reason, "missing field");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut map = sample_map();
        map.insert("cholesterol".to_string(), 180.0);

        let errors = FeatureVector::from_map(&map).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "cholesterol"));
    }

    #[test]
    fn test_range_violations() {
        let mut map = sample_map();
        map.insert("age".to_string(), 130.0);
        map.insert("serum_sodium".to_string(), 90.0);

        let errors = FeatureVector::from_map(&map).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"age"));
        assert!(fields.contains(&"serum_sodium"));
    }

    #[test]
    fn test_binary_fields() {
        let mut map = sample_map();
        map.insert("smoking".to_string(), 2.0);

        let errors = FeatureVector::from_map(&map).unwrap_err();
        assert_eq!(errors[0].field, "smoking");
        assert_eq!(errors[0].reason, "must be 0 or 1");
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut map = sample_map();
        map.insert("platelets".to_string(), f64::NAN);

        let errors = FeatureVector::from_map(&map).unwrap_err();
        assert_eq!(errors[0].field, "platelets");
    }
}
