//! Constants used throughout the intake core crate.
//!
//! Field keys match the camelCase names the registration forms submit, so an
//! [`ErrorMap`](crate::ErrorMap) can be rendered against the form without translation.

/// Default number of digits in a postal code.
pub const DEFAULT_POSTAL_CODE_DIGITS: usize = 6;

/// Default for whether the vitals step may be skipped.
pub const DEFAULT_VITALS_OPTIONAL: bool = true;

/// Separators removed from phone numbers before matching.
pub const PHONE_SEPARATORS: [char; 4] = ['-', '(', ')', '.'];

/// Mobile number grammar: country code or trunk prefix, network prefix, eight ASCII digits.
pub const PHONE_PATTERN: &str = r"^(?:\+?234|0)[789][01][0-9]{8}$";

/// Date format accepted for dates of birth.
pub const DATE_OF_BIRTH_FORMAT: &str = "%Y-%m-%d";

/// Prefix used for record numbers issued by the in-memory directory.
pub const RECORD_NUMBER_PREFIX: &str = "TH";

pub const FIELD_FIRST_NAME: &str = "firstName";
pub const FIELD_LAST_NAME: &str = "lastName";
pub const FIELD_GENDER: &str = "gender";
pub const FIELD_DATE_OF_BIRTH: &str = "dateOfBirth";
pub const FIELD_RELATIONSHIP: &str = "relationship";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_PHONE_NUMBER: &str = "phoneNumber";
pub const FIELD_STREET: &str = "street";
pub const FIELD_CITY: &str = "city";
pub const FIELD_STATE: &str = "state";
pub const FIELD_POSTAL_CODE: &str = "postalCode";
pub const FIELD_COUNTRY: &str = "country";
pub const FIELD_ADDRESS: &str = "address";
pub const FIELD_NEXT_OF_KIN: &str = "nextOfKin";
pub const FIELD_FAMILY_MEMBERS: &str = "familyMembers";

pub const FIELD_BLOOD_PRESSURE: &str = "bloodPressure";
pub const FIELD_SYSTOLIC: &str = "systolic";
pub const FIELD_DIASTOLIC: &str = "diastolic";
pub const FIELD_HEART_RATE: &str = "heartRate";
pub const FIELD_TEMPERATURE: &str = "temperature";
pub const FIELD_WEIGHT: &str = "weight";
pub const FIELD_HEIGHT: &str = "height";

/// Key under which collaborator failures are attached to the current step.
pub const FIELD_SUBMISSION: &str = "submission";
