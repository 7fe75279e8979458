//! The patient directory collaborator.
//!
//! The registration workflow never persists anything itself. Patient creation and vitals
//! recording are delegated to a [`PatientDirectory`], normally the hospital's REST
//! backend (see the `intake-client` crate). [`InMemoryDirectory`] keeps records in
//! process for dry runs and tests.

use crate::author::Author;
use crate::constants::RECORD_NUMBER_PREFIX;
use crate::patient::{
    AccountType, ContactInfo, CreatedPatient, FamilyMember, NextOfKin, PersonalInfo, VitalSigns,
};
use async_trait::async_trait;
use intake_types::{PatientId, RecordNumber};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Failures reported by a patient directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("directory rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid directory response: {0}")]
    InvalidResponse(String),
    #[error("unknown patient: {0}")]
    UnknownPatient(PatientId),
}

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Payload of a patient creation call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    pub account_type: AccountType,
    pub personal_info: PersonalInfo,
    pub contact_info: Option<ContactInfo>,
    pub next_of_kin: Option<NextOfKin>,
    pub family_members: Vec<FamilyMember>,
    pub created_by: Author,
}

/// Payload of a vitals recording call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordVitalsRequest {
    pub patient_id: PatientId,
    pub vitals: VitalSigns,
    pub recorded_by: Author,
}

/// External store of patient records.
///
/// Implementations own any timeout and retry policy; the workflow makes exactly one call
/// per submission.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// Creates the patient (and, for family accounts, the household) and returns the
    /// identifiers assigned to the primary record.
    async fn create_patient(&self, request: &CreatePatientRequest)
        -> DirectoryResult<CreatedPatient>;

    /// Records vital signs against an existing patient, returning the persisted form.
    async fn record_vitals(&self, request: &RecordVitalsRequest) -> DirectoryResult<VitalSigns>;
}

#[derive(Debug, Default)]
struct InMemoryState {
    patients: Vec<(CreatedPatient, CreatePatientRequest)>,
    vitals: HashMap<PatientId, Vec<VitalSigns>>,
}

/// A process-local directory.
///
/// Patient ids are fresh UUIDs (32 lowercase hex characters); record numbers are issued
/// sequentially as `TH001`, `TH002`, ...
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: Mutex<InMemoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn patient_count(&self) -> usize {
        self.state().patients.len()
    }

    /// Returns the creation request stored for `patient_id`, if any.
    pub fn patient(&self, patient_id: &PatientId) -> Option<CreatePatientRequest> {
        self.state()
            .patients
            .iter()
            .find(|(created, _)| &created.patient_id == patient_id)
            .map(|(_, request)| request.clone())
    }

    /// Returns every vitals set recorded for `patient_id`, oldest first.
    pub fn vitals_for(&self, patient_id: &PatientId) -> Vec<VitalSigns> {
        self.state()
            .vitals
            .get(patient_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PatientDirectory for InMemoryDirectory {
    async fn create_patient(
        &self,
        request: &CreatePatientRequest,
    ) -> DirectoryResult<CreatedPatient> {
        let mut state = self.state();

        let patient_id = PatientId::new(uuid::Uuid::new_v4().simple().to_string())
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;
        let record_number = RecordNumber::new(format!(
            "{RECORD_NUMBER_PREFIX}{:03}",
            state.patients.len() + 1
        ))
        .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;

        let created = CreatedPatient {
            patient_id,
            record_number,
        };
        state.patients.push((created.clone(), request.clone()));

        tracing::debug!(
            "in-memory directory created patient {} ({})",
            created.patient_id,
            created.record_number
        );
        Ok(created)
    }

    async fn record_vitals(&self, request: &RecordVitalsRequest) -> DirectoryResult<VitalSigns> {
        let mut state = self.state();

        let known = state
            .patients
            .iter()
            .any(|(created, _)| created.patient_id == request.patient_id);
        if !known {
            return Err(DirectoryError::UnknownPatient(request.patient_id.clone()));
        }

        state
            .vitals
            .entry(request.patient_id.clone())
            .or_default()
            .push(request.vitals.clone());
        Ok(request.vitals.clone())
    }
}
