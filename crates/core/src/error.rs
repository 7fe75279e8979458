use crate::workflow::{Action, Step};

/// Operational errors raised by the registration core.
///
/// Field-level problems (blank names, malformed phone numbers, out-of-range vitals) are
/// not errors in this sense: they are collected into an [`ErrorMap`](crate::ErrorMap)
/// and surfaced per field.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{action} is not allowed while the workflow is at {step}")]
    InvalidTransition { step: Step, action: Action },
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("no submission is awaiting completion")]
    NoSubmissionPending,
    #[error("vitals are mandatory for this registration and cannot be skipped")]
    VitalsRequired,
    #[error("no patient record has been created for this registration")]
    MissingPatientRecord,

    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to deserialize JSON: {0}")]
    Json(serde_json::Error),
    #[error("failed to deserialize YAML: {0}")]
    Yaml(serde_yaml::Error),
    #[error("invalid text: {0}")]
    Text(#[from] intake_types::TextError),
}

pub type RegistrationResult<T> = std::result::Result<T, RegistrationError>;
