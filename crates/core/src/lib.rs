//! # Intake Core
//!
//! Core business logic for hospital patient intake.
//!
//! This crate contains the pure registration rules and the registration state machine:
//! - Field and aggregate validation of patient input ([`ValidationEngine`])
//! - The multi-step registration wizard ([`RegistrationWorkflow`])
//! - Editable public site content ([`ContentManager`])
//!
//! **No transport concerns**: persistence is delegated to a [`PatientDirectory`]. The HTTP
//! implementation lives in `intake-client`; [`InMemoryDirectory`] serves dry runs and tests.

pub mod author;
pub mod config;
pub mod constants;
pub mod content;
pub mod directory;
pub mod error;
pub mod patient;
pub mod validation;
pub mod workflow;

pub use author::{Author, StaffRole};
pub use config::{RegistrationConfig, VitalRange, VitalRanges};
pub use content::{AboutSection, ContentManager, HeroSection, ServiceCard, SiteContent};
pub use directory::{
    CreatePatientRequest, DirectoryError, DirectoryResult, InMemoryDirectory, PatientDirectory,
    RecordVitalsRequest,
};
pub use email_address::EmailAddress;
pub use error::{RegistrationError, RegistrationResult};
pub use intake_types::{NonEmptyText, PatientId, RecordNumber, TextError};
pub use patient::{
    AccountType, Address, BloodPressure, ContactInfo, CreatedPatient, FamilyMember, Gender,
    NextOfKin, PatientDraft, PersonalInfo, Relationship, VitalSigns,
};
pub use validation::{ErrorList, ErrorMap, FieldError, ValidationEngine};
pub use workflow::{Action, Prepared, RegistrationWorkflow, Step, StepOutcome};
