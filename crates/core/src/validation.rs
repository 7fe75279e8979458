//! Input validation for registration forms.
//!
//! This module contains the field-level and aggregate checks applied to patient input
//! before it may leave a registration step. Validators never fail: they return the
//! problems they found as [`FieldError`] values, either as a flat list for a single
//! field or as an [`ErrorMap`] keyed by the form's camelCase field names.
//!
//! Nested shapes are flattened into dotted keys, for example `address.postalCode` or
//! `familyMembers[1].dateOfBirth`.

use crate::config::{RegistrationConfig, VitalRange};
use crate::constants::*;
use crate::patient::{
    Address, ContactInfo, FamilyMember, NextOfKin, PersonalInfo, VitalSigns,
};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PHONE_PATTERN).expect("phone pattern is a valid regex"));

/// A single problem with a single field.
#[derive(Clone, Debug, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail")]
pub enum FieldError {
    #[error("this field is required")]
    RequiredField,
    #[error("this field is not in the expected format")]
    InvalidFormat,
    #[error("date cannot be in the future")]
    FutureDate,
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: f64, max: f64 },
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    #[error("at least one family member is required")]
    NoFamilyMembers,
    #[error("an entry with this value already exists")]
    DuplicateEntry,
}

/// Errors found for one field.
pub type ErrorList = Vec<FieldError>;

/// Errors grouped by field name, in field-name order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorMap(BTreeMap<String, ErrorList>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `error` to the list for `field`.
    pub fn insert(&mut self, field: impl Into<String>, error: FieldError) {
        self.0.entry(field.into()).or_default().push(error);
    }

    /// Appends every error in `errors` to the list for `field`. An empty list adds nothing.
    pub fn extend_field(&mut self, field: impl Into<String>, errors: ErrorList) {
        if errors.is_empty() {
            return;
        }
        self.0.entry(field.into()).or_default().extend(errors);
    }

    /// Returns the errors recorded for `field`, or an empty slice.
    pub fn get(&self, field: &str) -> &[FieldError] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn has_errors(&self) -> bool {
        self.0.values().any(|errors| !errors.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        !self.has_errors()
    }

    /// Number of fields with at least one error.
    pub fn len(&self) -> usize {
        self.0.values().filter(|errors| !errors.is_empty()).count()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FieldError])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Concatenates `other` into `self` per key, keeping duplicates.
    pub fn merge(&mut self, other: ErrorMap) {
        for (field, errors) in other.0 {
            self.0.entry(field).or_default().extend(errors);
        }
    }

    /// Re-keys every entry as `{prefix}.{field}`.
    pub fn prefixed(self, prefix: &str) -> ErrorMap {
        ErrorMap(
            self.0
                .into_iter()
                .map(|(field, errors)| (format!("{prefix}.{field}"), errors))
                .collect(),
        )
    }

    /// Removes the listed fields entirely.
    pub fn clear_fields<S: AsRef<str>>(&mut self, fields: &[S]) {
        for field in fields {
            self.0.remove(field.as_ref());
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(String, FieldError)> for ErrorMap {
    fn from_iter<I: IntoIterator<Item = (String, FieldError)>>(iter: I) -> Self {
        let mut map = ErrorMap::new();
        for (field, error) in iter {
            map.insert(field, error);
        }
        map
    }
}

/// Returns true if any field in `errors` carries at least one error.
pub fn has_errors(errors: &ErrorMap) -> bool {
    errors.has_errors()
}

/// Merges error maps by concatenating per-key lists, without deduplication.
pub fn merge_errors(maps: impl IntoIterator<Item = ErrorMap>) -> ErrorMap {
    let mut merged = ErrorMap::new();
    for map in maps {
        merged.merge(map);
    }
    merged
}

/// Returns a copy of `errors` with the listed fields removed entirely.
pub fn clear_field_errors<S: AsRef<str>>(errors: &ErrorMap, fields: &[S]) -> ErrorMap {
    let mut cleared = errors.clone();
    cleared.clear_fields(fields);
    cleared
}

fn required(value: &str) -> ErrorList {
    if value.trim().is_empty() {
        vec![FieldError::RequiredField]
    } else {
        Vec::new()
    }
}

/// Pure validation of registration input against the configured rule table.
///
/// The engine holds no mutable state. The date used as "today" for date-of-birth checks
/// is the local date unless pinned with [`ValidationEngine::with_today`].
#[derive(Clone, Debug)]
pub struct ValidationEngine {
    cfg: Arc<RegistrationConfig>,
    today: Option<NaiveDate>,
}

impl ValidationEngine {
    pub fn new(cfg: Arc<RegistrationConfig>) -> Self {
        Self { cfg, today: None }
    }

    /// Pins the date used for future-date checks.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.cfg
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Validates an email address.
    ///
    /// Blank input yields exactly `RequiredField`; anything the email grammar rejects
    /// yields `InvalidFormat`.
    pub fn validate_email(&self, value: &str) -> ErrorList {
        let value = value.trim();
        if value.is_empty() {
            return vec![FieldError::RequiredField];
        }
        if !email_address::EmailAddress::is_valid(value) {
            return vec![FieldError::InvalidFormat];
        }
        Vec::new()
    }

    /// Validates a mobile phone number.
    ///
    /// Whitespace and `-().` separators are stripped first, so `0801 234 5678` and
    /// `+234 (801) 234-5678` are both accepted.
    pub fn validate_phone_number(&self, value: &str) -> ErrorList {
        let digits: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && !PHONE_SEPARATORS.contains(c))
            .collect();

        if digits.is_empty() {
            return vec![FieldError::RequiredField];
        }
        if !PHONE_REGEX.is_match(&digits) {
            return vec![FieldError::InvalidFormat];
        }
        Vec::new()
    }

    /// Validates a postal code: exactly the configured number of ASCII digits.
    pub fn validate_postal_code(&self, value: &str) -> ErrorList {
        let value = value.trim();
        if value.is_empty() {
            return vec![FieldError::RequiredField];
        }

        let ok = value.len() == self.cfg.postal_code_digits()
            && value.bytes().all(|b| b.is_ascii_digit());
        if !ok {
            return vec![FieldError::InvalidFormat];
        }
        Vec::new()
    }

    pub fn validate_address(&self, address: &Address) -> ErrorMap {
        let mut errors = ErrorMap::new();
        errors.extend_field(FIELD_STREET, required(&address.street));
        errors.extend_field(FIELD_CITY, required(&address.city));
        errors.extend_field(FIELD_STATE, required(&address.state));
        errors.extend_field(FIELD_POSTAL_CODE, self.validate_postal_code(&address.postal_code));
        errors.extend_field(FIELD_COUNTRY, required(&address.country));
        errors
    }

    /// Validates email, phone number and address together; address keys are prefixed
    /// with `address.`.
    pub fn validate_contact_info(&self, contact: &ContactInfo) -> ErrorMap {
        let mut errors = ErrorMap::new();
        errors.extend_field(FIELD_EMAIL, self.validate_email(&contact.email));
        errors.extend_field(FIELD_PHONE_NUMBER, self.validate_phone_number(&contact.phone_number));
        errors.merge(self.validate_address(&contact.address).prefixed(FIELD_ADDRESS));
        errors
    }

    pub fn validate_next_of_kin(&self, kin: &NextOfKin) -> ErrorMap {
        let mut errors = ErrorMap::new();
        errors.extend_field(FIELD_FIRST_NAME, required(&kin.first_name));
        errors.extend_field(FIELD_LAST_NAME, required(&kin.last_name));
        if kin.relationship.is_none() {
            errors.insert(FIELD_RELATIONSHIP, FieldError::RequiredField);
        }
        errors.extend_field(FIELD_PHONE_NUMBER, self.validate_phone_number(&kin.phone_number));
        errors
    }

    /// Validates the primary patient's personal details.
    ///
    /// First and last name are required. Date of birth is optional here, but when given
    /// it must parse as `YYYY-MM-DD` and must not be after today. Gender is not checked:
    /// the workflow requires it separately when the step is submitted.
    pub fn validate_personal_info(&self, info: &PersonalInfo) -> ErrorMap {
        let mut errors = ErrorMap::new();
        errors.extend_field(FIELD_FIRST_NAME, required(&info.first_name));
        errors.extend_field(FIELD_LAST_NAME, required(&info.last_name));

        if let Some(dob) = info.date_of_birth.as_deref().filter(|d| !d.trim().is_empty()) {
            errors.extend_field(FIELD_DATE_OF_BIRTH, self.check_date_of_birth(dob));
        }
        errors
    }

    pub fn validate_family_member(&self, member: &FamilyMember) -> ErrorMap {
        let mut errors = ErrorMap::new();
        errors.extend_field(FIELD_FIRST_NAME, required(&member.first_name));
        errors.extend_field(FIELD_LAST_NAME, required(&member.last_name));
        if member.gender.is_none() {
            errors.insert(FIELD_GENDER, FieldError::RequiredField);
        }

        match member.date_of_birth.as_deref().filter(|d| !d.trim().is_empty()) {
            None => errors.insert(FIELD_DATE_OF_BIRTH, FieldError::RequiredField),
            Some(dob) => errors.extend_field(FIELD_DATE_OF_BIRTH, self.check_date_of_birth(dob)),
        }

        if member.relationship.is_none() {
            errors.insert(FIELD_RELATIONSHIP, FieldError::RequiredField);
        }
        errors
    }

    /// Validates a household's member list.
    ///
    /// An empty list fails with `NoFamilyMembers` under `familyMembers`; otherwise each
    /// member's errors are keyed `familyMembers[i].<field>`.
    pub fn validate_family_members(&self, members: &[FamilyMember]) -> ErrorMap {
        if members.is_empty() {
            let mut errors = ErrorMap::new();
            errors.insert(FIELD_FAMILY_MEMBERS, FieldError::NoFamilyMembers);
            return errors;
        }

        merge_errors(members.iter().enumerate().map(|(i, member)| {
            self.validate_family_member(member)
                .prefixed(&format!("{FIELD_FAMILY_MEMBERS}[{i}]"))
        }))
    }

    /// Checks every present, nonzero reading against the clinical range table.
    ///
    /// Blood pressure errors are keyed `bloodPressure.systolic` and
    /// `bloodPressure.diastolic`, matching the nested form shape.
    pub fn validate_vital_signs(&self, vitals: &VitalSigns) -> ErrorMap {
        let ranges = self.cfg.vital_ranges();
        let blood_pressure = [
            (FIELD_SYSTOLIC, vitals.blood_pressure.systolic, &ranges.systolic),
            (FIELD_DIASTOLIC, vitals.blood_pressure.diastolic, &ranges.diastolic),
        ];
        let readings = [
            (FIELD_HEART_RATE, vitals.heart_rate, &ranges.heart_rate),
            (FIELD_TEMPERATURE, vitals.temperature, &ranges.temperature),
            (FIELD_WEIGHT, vitals.weight, &ranges.weight),
            (FIELD_HEIGHT, vitals.height, &ranges.height),
        ];

        let mut errors = check_vitals(blood_pressure).prefixed(FIELD_BLOOD_PRESSURE);
        errors.merge(check_vitals(readings));
        errors
    }

    fn check_date_of_birth(&self, raw: &str) -> ErrorList {
        match NaiveDate::parse_from_str(raw.trim(), DATE_OF_BIRTH_FORMAT) {
            Err(_) => vec![FieldError::InvalidFormat],
            Ok(date) if date > self.today() => vec![FieldError::FutureDate],
            Ok(_) => Vec::new(),
        }
    }
}

fn check_vitals<'a>(
    readings: impl IntoIterator<Item = (&'static str, Option<f64>, &'a VitalRange)>,
) -> ErrorMap {
    let mut errors = ErrorMap::new();
    for (field, value, range) in readings {
        if let Some(error) = check_vital(field, value, range) {
            errors.insert(field, error);
        }
    }
    errors
}

fn check_vital(field: &str, value: Option<f64>, range: &VitalRange) -> Option<FieldError> {
    let value = value?;
    // Zero means the reading was not taken.
    if value == 0.0 || range.contains(value) {
        return None;
    }
    Some(FieldError::OutOfRange {
        field: field.to_string(),
        min: range.min,
        max: range.max,
    })
}
