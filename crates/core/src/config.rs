//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the validation engine and registration workflows as an `Arc<RegistrationConfig>`.
//! Nothing in the core reads environment variables; callers hand the raw values to the
//! `*_from_env_value` helpers.

use crate::constants::{DEFAULT_POSTAL_CODE_DIGITS, DEFAULT_VITALS_OPTIONAL};
use crate::{RegistrationError, RegistrationResult};
use serde::{Deserialize, Serialize};

/// An inclusive clinical range for one vital sign.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalRange {
    pub min: f64,
    pub max: f64,
}

impl VitalRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Returns true if `value` lies within the range (bounds included).
    ///
    /// `NaN` and infinities are never contained.
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    fn is_well_formed(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

/// Clinical bounds applied to recorded vital signs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalRanges {
    /// Systolic blood pressure, mmHg.
    pub systolic: VitalRange,
    /// Diastolic blood pressure, mmHg.
    pub diastolic: VitalRange,
    /// Beats per minute.
    pub heart_rate: VitalRange,
    /// Degrees Celsius.
    pub temperature: VitalRange,
    /// Kilograms.
    pub weight: VitalRange,
    /// Centimetres.
    pub height: VitalRange,
}

impl Default for VitalRanges {
    fn default() -> Self {
        Self {
            systolic: VitalRange::new(70.0, 250.0),
            diastolic: VitalRange::new(40.0, 150.0),
            heart_rate: VitalRange::new(30.0, 220.0),
            temperature: VitalRange::new(32.0, 45.0),
            weight: VitalRange::new(0.5, 500.0),
            height: VitalRange::new(30.0, 250.0),
        }
    }
}

impl VitalRanges {
    fn all(&self) -> [(&'static str, &VitalRange); 6] {
        [
            ("systolic", &self.systolic),
            ("diastolic", &self.diastolic),
            ("heartRate", &self.heart_rate),
            ("temperature", &self.temperature),
            ("weight", &self.weight),
            ("height", &self.height),
        ]
    }
}

/// Registration configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    postal_code_digits: usize,
    vitals_optional: bool,
    vital_ranges: VitalRanges,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            postal_code_digits: DEFAULT_POSTAL_CODE_DIGITS,
            vitals_optional: DEFAULT_VITALS_OPTIONAL,
            vital_ranges: VitalRanges::default(),
        }
    }
}

impl RegistrationConfig {
    /// Create a new `RegistrationConfig`.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::InvalidInput` if `postal_code_digits` is zero or any vital
    /// range is empty, inverted or non-finite.
    pub fn new(
        postal_code_digits: usize,
        vitals_optional: bool,
        vital_ranges: VitalRanges,
    ) -> RegistrationResult<Self> {
        if postal_code_digits == 0 {
            return Err(RegistrationError::InvalidInput(
                "postal_code_digits must be at least 1".into(),
            ));
        }

        if let Some((name, _)) = vital_ranges
            .all()
            .into_iter()
            .find(|(_, range)| !range.is_well_formed())
        {
            return Err(RegistrationError::InvalidInput(format!(
                "vital range for {name} must have finite bounds with min < max"
            )));
        }

        Ok(Self {
            postal_code_digits,
            vitals_optional,
            vital_ranges,
        })
    }

    pub fn postal_code_digits(&self) -> usize {
        self.postal_code_digits
    }

    pub fn vitals_optional(&self) -> bool {
        self.vitals_optional
    }

    pub fn vital_ranges(&self) -> &VitalRanges {
        &self.vital_ranges
    }
}

/// Parse the postal code digit count from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default of six digits.
pub fn postal_code_digits_from_env_value(value: Option<String>) -> RegistrationResult<usize> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(DEFAULT_POSTAL_CODE_DIGITS),
        Some(v) => v.parse::<usize>().map_err(|_| {
            RegistrationError::InvalidInput(format!(
                "postal code digit count must be a positive integer, got '{v}'"
            ))
        }),
    }
}

/// Parse the vitals-optional flag from an optional string value.
///
/// Accepts `true`/`false`, `yes`/`no` and `1`/`0` (case-insensitive). Unset means optional.
pub fn vitals_optional_from_env_value(value: Option<String>) -> RegistrationResult<bool> {
    let value = value
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());

    match value.as_deref() {
        None => Ok(DEFAULT_VITALS_OPTIONAL),
        Some("true" | "yes" | "1") => Ok(true),
        Some("false" | "no" | "0") => Ok(false),
        Some(other) => Err(RegistrationError::InvalidInput(format!(
            "vitals optional flag must be true or false, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ranges_match_clinical_table() {
        let ranges = VitalRanges::default();
        assert_eq!(ranges.systolic, VitalRange::new(70.0, 250.0));
        assert_eq!(ranges.temperature, VitalRange::new(32.0, 45.0));
        assert_eq!(ranges.weight, VitalRange::new(0.5, 500.0));
    }

    #[test]
    fn range_bounds_are_inclusive_and_reject_nan() {
        let range = VitalRange::new(30.0, 220.0);
        assert!(range.contains(30.0));
        assert!(range.contains(220.0));
        assert!(!range.contains(220.5));
        assert!(!range.contains(f64::NAN));
    }

    #[test]
    fn new_rejects_inverted_range() {
        let mut ranges = VitalRanges::default();
        ranges.height = VitalRange::new(250.0, 30.0);

        let err = RegistrationConfig::new(6, true, ranges).expect_err("inverted range");
        assert!(matches!(err, RegistrationError::InvalidInput(msg) if msg.contains("height")));
    }

    #[test]
    fn new_rejects_zero_postal_digits() {
        let err = RegistrationConfig::new(0, true, VitalRanges::default())
            .expect_err("zero digits should be rejected");
        assert!(matches!(err, RegistrationError::InvalidInput(_)));
    }

    #[test]
    fn env_values_fall_back_to_defaults() {
        assert_eq!(postal_code_digits_from_env_value(None).unwrap(), 6);
        assert_eq!(postal_code_digits_from_env_value(Some("  ".into())).unwrap(), 6);
        assert_eq!(postal_code_digits_from_env_value(Some("5".into())).unwrap(), 5);
        assert!(postal_code_digits_from_env_value(Some("five".into())).is_err());

        assert!(vitals_optional_from_env_value(None).unwrap());
        assert!(!vitals_optional_from_env_value(Some("No".into())).unwrap());
        assert!(vitals_optional_from_env_value(Some("maybe".into())).is_err());
    }
}
