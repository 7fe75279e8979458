//! Registration input types.
//!
//! These mirror what the registration forms collect. Text fields are kept as raw strings
//! (possibly blank) because they represent in-progress user input; the
//! [`ValidationEngine`](crate::ValidationEngine) decides whether they are acceptable.
//! Everything (de)serialises with camelCase keys.

use crate::error::{RegistrationError, RegistrationResult};
use intake_types::{PatientId, RecordNumber};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whether the registration covers one patient or a household.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Personal,
    Family,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Personal => f.write_str("personal"),
            Self::Family => f.write_str("family"),
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "personal" => Ok(Self::Personal),
            "family" => Ok(Self::Family),
            other => Err(format!("unknown account type '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Closed set of relationships a family member or next of kin may have to the patient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Spouse,
    Child,
    Parent,
    Sibling,
    Grandparent,
    Grandchild,
    Guardian,
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    /// `YYYY-MM-DD`.
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    pub email: String,
    pub phone_number: String,
    pub address: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextOfKin {
    pub first_name: String,
    pub last_name: String,
    pub relationship: Option<Relationship>,
    pub phone_number: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FamilyMember {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<String>,
    pub relationship: Option<Relationship>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloodPressure {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

/// A set of vital-sign readings. Absent and zero readings mean "not taken".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VitalSigns {
    pub blood_pressure: BloodPressure,
    pub heart_rate: Option<f64>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Kilograms.
    pub weight: Option<f64>,
    /// Centimetres.
    pub height: Option<f64>,
    pub notes: Option<String>,
}

/// Everything the patient form step submits.
///
/// For a family registration `personal` describes the primary account holder and
/// `family_members` the other members of the household.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientDraft {
    pub personal: PersonalInfo,
    pub contact: Option<ContactInfo>,
    pub next_of_kin: Option<NextOfKin>,
    pub family_members: Vec<FamilyMember>,
}

/// Identifiers assigned by the patient directory once a record exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPatient {
    pub patient_id: PatientId,
    pub record_number: RecordNumber,
}

/// Reads a form document (a [`PatientDraft`] or [`VitalSigns`]) from a JSON file.
///
/// # Errors
///
/// Returns `RegistrationError::FileRead` if the file cannot be read and
/// `RegistrationError::Json` if it does not match the expected shape.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> RegistrationResult<T> {
    let raw = std::fs::read_to_string(path).map_err(RegistrationError::FileRead)?;
    serde_json::from_str(&raw).map_err(RegistrationError::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn draft_deserialises_from_form_json() {
        let json = r#"{
            "personal": {
                "firstName": "Ada",
                "lastName": "Lovelace",
                "gender": "female",
                "dateOfBirth": "1990-01-01"
            },
            "familyMembers": [
                { "firstName": "Byron", "lastName": "Lovelace", "relationship": "child" }
            ]
        }"#;

        let draft: PatientDraft = serde_json::from_str(json).expect("draft should parse");
        assert_eq!(draft.personal.first_name, "Ada");
        assert_eq!(draft.personal.gender, Some(Gender::Female));
        assert_eq!(draft.contact, None);
        assert_eq!(
            draft.family_members[0].relationship,
            Some(Relationship::Child)
        );
    }

    #[test]
    fn vitals_deserialise_with_nested_blood_pressure() {
        let json = r#"{ "bloodPressure": { "systolic": 120, "diastolic": 80 }, "heartRate": 72 }"#;
        let vitals: VitalSigns = serde_json::from_str(json).expect("vitals should parse");
        assert_eq!(vitals.blood_pressure.systolic, Some(120.0));
        assert_eq!(vitals.heart_rate, Some(72.0));
        assert_eq!(vitals.temperature, None);
    }

    #[test]
    fn account_type_parses_case_insensitively() {
        assert_eq!("Family".parse::<AccountType>(), Ok(AccountType::Family));
        assert!("corporate".parse::<AccountType>().is_err());
    }

    #[test]
    fn load_json_reads_and_reports_shape_errors() {
        let tmp = TempDir::new().expect("create temp dir");
        let good = tmp.path().join("vitals.json");
        let bad = tmp.path().join("draft.json");
        std::fs::write(&good, r#"{ "weight": 70.5 }"#).expect("write vitals");
        std::fs::write(&bad, r#"{ "personal": { "gender": "unknown" } }"#).expect("write draft");

        let vitals: VitalSigns = load_json(&good).expect("vitals should load");
        assert_eq!(vitals.weight, Some(70.5));

        let err = load_json::<PatientDraft>(&bad).expect_err("unknown gender");
        assert!(matches!(err, RegistrationError::Json(_)));

        let err = load_json::<VitalSigns>(&tmp.path().join("missing.json")).expect_err("missing");
        assert!(matches!(err, RegistrationError::FileRead(_)));
    }
}
