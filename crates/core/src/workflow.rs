//! Patient registration workflow.
//!
//! A registration moves through an explicit sequence of steps:
//!
//! ```text
//! AccountType ──select──▶ PersonalForm ─┐
//!      ▲                                ├─submit─▶ Vitals ─submit/skip─▶ Confirmation ─ack─▶ Completed
//!      └────────return──── FamilyForm ──┘
//!
//! any step before Confirmation ──cancel──▶ Cancelled
//! ```
//!
//! Every call is checked against [`TRANSITIONS`] before it touches any state, so an
//! illegal call is rejected with [`RegistrationError::InvalidTransition`] and leaves the
//! workflow exactly as it was.
//!
//! ## Submissions
//!
//! Steps that talk to the [`PatientDirectory`] are split into two phases so callers can
//! observe [`RegistrationWorkflow::is_submitting`] while the call is in flight:
//!
//! 1. `begin_*` validates the input. On failure the errors are stored and nothing is
//!    sent. On success the in-flight flag is set and the directory request is returned.
//! 2. `complete_*` applies the directory's answer: success advances the step, failure is
//!    recorded as a `SubmissionFailed` error under `submission` and the step stays put
//!    with the draft intact for resubmission.
//!
//! `submit_patient_form` and `submit_vitals` run both phases against a directory.
//! Only one submission may be in flight; anything else attempted meanwhile (apart from
//! [`cancel`](RegistrationWorkflow::cancel)) is rejected with
//! [`RegistrationError::SubmissionInFlight`].
//!
//! ## Known gap
//!
//! There is no compensation. A patient created before the user cancels, or before a
//! vitals recording fails, stays in the directory without vitals. The workflow logs the
//! orphaned identifiers at `warn` and leaves reconciliation to the caller.

use crate::author::Author;
use crate::config::RegistrationConfig;
use crate::constants::{FIELD_GENDER, FIELD_NEXT_OF_KIN, FIELD_SUBMISSION};
use crate::directory::{
    CreatePatientRequest, DirectoryResult, PatientDirectory, RecordVitalsRequest,
};
use crate::error::{RegistrationError, RegistrationResult};
use crate::patient::{AccountType, CreatedPatient, PatientDraft, VitalSigns};
use crate::validation::{ErrorMap, FieldError, ValidationEngine};
use serde::Serialize;
use std::sync::Arc;

/// Where a registration currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Step {
    AccountType,
    PersonalForm,
    FamilyForm,
    Vitals,
    Confirmation,
    /// The caller acknowledged the confirmation.
    Completed,
    Cancelled,
}

impl Step {
    /// True once the instance accepts no further calls.
    pub fn is_ended(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AccountType => "account type selection",
            Self::PersonalForm => "personal patient form",
            Self::FamilyForm => "family patient form",
            Self::Vitals => "vitals capture",
            Self::Confirmation => "confirmation",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A call a caller can make on the workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    SelectAccountType,
    ReturnToAccountType,
    SubmitPatientForm,
    SubmitVitals,
    SkipVitals,
    AcknowledgeConfirmation,
    Cancel,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SelectAccountType => "selecting an account type",
            Self::ReturnToAccountType => "returning to account type selection",
            Self::SubmitPatientForm => "submitting the patient form",
            Self::SubmitVitals => "submitting vitals",
            Self::SkipVitals => "skipping vitals",
            Self::AcknowledgeConfirmation => "acknowledging the confirmation",
            Self::Cancel => "cancelling",
        };
        f.write_str(name)
    }
}

/// Every permitted `(step, action)` pair. Anything not listed is rejected.
pub const TRANSITIONS: &[(Step, Action)] = &[
    (Step::AccountType, Action::SelectAccountType),
    (Step::AccountType, Action::Cancel),
    (Step::PersonalForm, Action::SubmitPatientForm),
    (Step::PersonalForm, Action::ReturnToAccountType),
    (Step::PersonalForm, Action::Cancel),
    (Step::FamilyForm, Action::SubmitPatientForm),
    (Step::FamilyForm, Action::ReturnToAccountType),
    (Step::FamilyForm, Action::Cancel),
    (Step::Vitals, Action::SubmitVitals),
    (Step::Vitals, Action::SkipVitals),
    (Step::Vitals, Action::Cancel),
    (Step::Confirmation, Action::AcknowledgeConfirmation),
];

/// Returns true if `action` may be attempted at `step`.
pub fn is_allowed(step: Step, action: Action) -> bool {
    TRANSITIONS.contains(&(step, action))
}

/// Result of the validation phase of a submission.
#[derive(Clone, Debug, PartialEq)]
pub enum Prepared<R> {
    /// Input is valid; send this request to the directory.
    Ready(R),
    /// Input is invalid; nothing was sent.
    Invalid(ErrorMap),
}

/// What a step submission ended in.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Advanced(Step),
    /// Validation failed; the step is unchanged and the errors are stored.
    Invalid(ErrorMap),
    /// The directory call failed; the step is unchanged and may be resubmitted.
    SubmissionFailed(String),
    /// The workflow was cancelled while the call was in flight; the answer was dropped.
    Discarded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pending {
    CreatePatient,
    RecordVitals,
}

/// One registration wizard instance.
///
/// Instances are independent; the only thing they share is the immutable configuration
/// inside the [`ValidationEngine`].
#[derive(Debug)]
pub struct RegistrationWorkflow {
    engine: ValidationEngine,
    author: Author,
    step: Step,
    account_type: Option<AccountType>,
    draft: PatientDraft,
    vitals_draft: VitalSigns,
    pending: Option<Pending>,
    errors: ErrorMap,
    created: Option<CreatedPatient>,
    recorded_vitals: Option<VitalSigns>,
}

impl RegistrationWorkflow {
    /// Starts a registration attributed to `author`.
    pub fn new(cfg: Arc<RegistrationConfig>, author: Author) -> Self {
        Self::with_engine(ValidationEngine::new(cfg), author)
    }

    /// Starts a registration using an existing engine (for example one with a pinned date).
    pub fn with_engine(engine: ValidationEngine, author: Author) -> Self {
        Self {
            engine,
            author,
            step: Step::AccountType,
            account_type: None,
            draft: PatientDraft::default(),
            vitals_draft: VitalSigns::default(),
            pending: None,
            errors: ErrorMap::new(),
            created: None,
            recorded_vitals: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn account_type(&self) -> Option<AccountType> {
        self.account_type
    }

    pub fn is_submitting(&self) -> bool {
        self.pending.is_some()
    }

    /// Errors for the active step, including any `submission` failure.
    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn draft(&self) -> &PatientDraft {
        &self.draft
    }

    pub fn vitals_draft(&self) -> &VitalSigns {
        &self.vitals_draft
    }

    /// Identifiers assigned by the directory, once the patient exists.
    pub fn created_patient(&self) -> Option<&CreatedPatient> {
        self.created.as_ref()
    }

    /// Vitals as persisted by the directory, if they were recorded.
    pub fn recorded_vitals(&self) -> Option<&VitalSigns> {
        self.recorded_vitals.as_ref()
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    /// Drops errors for fields the user has since edited.
    pub fn clear_errors_for<S: AsRef<str>>(&mut self, fields: &[S]) {
        self.errors.clear_fields(fields);
    }

    fn check(&self, action: Action) -> RegistrationResult<()> {
        if !is_allowed(self.step, action) {
            return Err(RegistrationError::InvalidTransition {
                step: self.step,
                action,
            });
        }
        if self.pending.is_some() && action != Action::Cancel {
            return Err(RegistrationError::SubmissionInFlight);
        }
        Ok(())
    }

    fn move_to(&mut self, step: Step) {
        tracing::debug!("registration step {} -> {}", self.step, step);
        self.step = step;
    }

    /// Chooses a personal or family registration and opens the matching form.
    pub fn select_account_type(&mut self, account_type: AccountType) -> RegistrationResult<Step> {
        self.check(Action::SelectAccountType)?;

        self.account_type = Some(account_type);
        self.errors.clear();
        self.move_to(match account_type {
            AccountType::Personal => Step::PersonalForm,
            AccountType::Family => Step::FamilyForm,
        });
        Ok(self.step)
    }

    /// Goes back to account type selection so the pending choice can be changed.
    ///
    /// The draft is kept so switching between personal and family does not lose input.
    pub fn return_to_account_type(&mut self) -> RegistrationResult<Step> {
        self.check(Action::ReturnToAccountType)?;

        self.errors.clear();
        self.move_to(Step::AccountType);
        Ok(self.step)
    }

    fn validate_draft(&self, account_type: AccountType, draft: &PatientDraft) -> ErrorMap {
        let mut errors = self.engine.validate_personal_info(&draft.personal);
        if draft.personal.gender.is_none() {
            errors.insert(FIELD_GENDER, FieldError::RequiredField);
        }
        if let Some(contact) = &draft.contact {
            errors.merge(self.engine.validate_contact_info(contact));
        }
        if let Some(kin) = &draft.next_of_kin {
            errors.merge(self.engine.validate_next_of_kin(kin).prefixed(FIELD_NEXT_OF_KIN));
        }
        if account_type == AccountType::Family {
            errors.merge(self.engine.validate_family_members(&draft.family_members));
        }
        errors
    }

    /// Validation phase of the patient form step.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` outside the patient form steps and `SubmissionInFlight`
    /// while another submission is pending. Invalid input is not an error: it comes back
    /// as [`Prepared::Invalid`].
    pub fn begin_patient_submission(
        &mut self,
        draft: PatientDraft,
    ) -> RegistrationResult<Prepared<CreatePatientRequest>> {
        self.check(Action::SubmitPatientForm)?;
        let account_type = self
            .account_type
            .ok_or(RegistrationError::InvalidTransition {
                step: self.step,
                action: Action::SubmitPatientForm,
            })?;

        let errors = self.validate_draft(account_type, &draft);
        self.draft = draft;

        if errors.has_errors() {
            tracing::debug!("patient form rejected with {} invalid field(s)", errors.len());
            self.errors = errors.clone();
            return Ok(Prepared::Invalid(errors));
        }

        let family_members = match account_type {
            AccountType::Family => self.draft.family_members.clone(),
            AccountType::Personal => Vec::new(),
        };
        let request = CreatePatientRequest {
            account_type,
            personal_info: self.draft.personal.clone(),
            contact_info: self.draft.contact.clone(),
            next_of_kin: self.draft.next_of_kin.clone(),
            family_members,
            created_by: self.author.clone(),
        };

        self.errors.clear();
        self.pending = Some(Pending::CreatePatient);
        Ok(Prepared::Ready(request))
    }

    /// Applies the directory's answer to a patient creation call.
    ///
    /// # Errors
    ///
    /// Returns `NoSubmissionPending` if no patient creation is in flight.
    pub fn complete_patient_submission(
        &mut self,
        result: DirectoryResult<CreatedPatient>,
    ) -> RegistrationResult<StepOutcome> {
        if self.pending != Some(Pending::CreatePatient) {
            return Err(RegistrationError::NoSubmissionPending);
        }
        self.pending = None;

        if self.step == Step::Cancelled {
            if let Ok(created) = &result {
                tracing::warn!(
                    "patient {} ({}) was created after the registration was cancelled; it has no vitals and needs manual reconciliation",
                    created.patient_id,
                    created.record_number
                );
            }
            return Ok(StepOutcome::Discarded);
        }

        match result {
            Ok(created) => {
                tracing::info!(
                    "created patient {} ({}) by {}",
                    created.patient_id,
                    created.record_number,
                    self.author
                );
                // Identifiers are fixed once assigned.
                if self.created.is_none() {
                    self.created = Some(created);
                }
                self.errors.clear();
                self.move_to(Step::Vitals);
                Ok(StepOutcome::Advanced(self.step))
            }
            Err(e) => Ok(self.record_submission_failure("patient creation", e.to_string())),
        }
    }

    /// Validates the draft and, if it passes, creates the patient through `directory`.
    ///
    /// # Errors
    ///
    /// See [`begin_patient_submission`](Self::begin_patient_submission). Directory failures
    /// are not errors: they come back as [`StepOutcome::SubmissionFailed`].
    pub async fn submit_patient_form<D>(
        &mut self,
        draft: PatientDraft,
        directory: &D,
    ) -> RegistrationResult<StepOutcome>
    where
        D: PatientDirectory + ?Sized,
    {
        let request = match self.begin_patient_submission(draft)? {
            Prepared::Ready(request) => request,
            Prepared::Invalid(errors) => return Ok(StepOutcome::Invalid(errors)),
        };
        let result = directory.create_patient(&request).await;
        self.complete_patient_submission(result)
    }

    /// Validation phase of the vitals step.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` outside the vitals step, `SubmissionInFlight` while a
    /// submission is pending and `MissingPatientRecord` if no patient exists to attach
    /// the readings to.
    pub fn begin_vitals_submission(
        &mut self,
        vitals: VitalSigns,
    ) -> RegistrationResult<Prepared<RecordVitalsRequest>> {
        self.check(Action::SubmitVitals)?;
        let patient_id = self
            .created
            .as_ref()
            .map(|created| created.patient_id.clone())
            .ok_or(RegistrationError::MissingPatientRecord)?;

        let errors = self.engine.validate_vital_signs(&vitals);
        self.vitals_draft = vitals;

        if errors.has_errors() {
            tracing::debug!("vitals rejected with {} invalid field(s)", errors.len());
            self.errors = errors.clone();
            return Ok(Prepared::Invalid(errors));
        }

        let request = RecordVitalsRequest {
            patient_id,
            vitals: self.vitals_draft.clone(),
            recorded_by: self.author.clone(),
        };

        self.errors.clear();
        self.pending = Some(Pending::RecordVitals);
        Ok(Prepared::Ready(request))
    }

    /// Applies the directory's answer to a vitals recording call.
    ///
    /// # Errors
    ///
    /// Returns `NoSubmissionPending` if no vitals recording is in flight.
    pub fn complete_vitals_submission(
        &mut self,
        result: DirectoryResult<VitalSigns>,
    ) -> RegistrationResult<StepOutcome> {
        if self.pending != Some(Pending::RecordVitals) {
            return Err(RegistrationError::NoSubmissionPending);
        }
        self.pending = None;

        if self.step == Step::Cancelled {
            return Ok(StepOutcome::Discarded);
        }

        match result {
            Ok(persisted) => {
                if let Some(created) = &self.created {
                    tracing::info!("recorded vitals for patient {}", created.patient_id);
                }
                self.recorded_vitals = Some(persisted);
                self.errors.clear();
                self.move_to(Step::Confirmation);
                Ok(StepOutcome::Advanced(self.step))
            }
            Err(e) => Ok(self.record_submission_failure("vitals recording", e.to_string())),
        }
    }

    /// Validates the readings and, if they pass, records them through `directory`.
    ///
    /// # Errors
    ///
    /// See [`begin_vitals_submission`](Self::begin_vitals_submission).
    pub async fn submit_vitals<D>(
        &mut self,
        vitals: VitalSigns,
        directory: &D,
    ) -> RegistrationResult<StepOutcome>
    where
        D: PatientDirectory + ?Sized,
    {
        let request = match self.begin_vitals_submission(vitals)? {
            Prepared::Ready(request) => request,
            Prepared::Invalid(errors) => return Ok(StepOutcome::Invalid(errors)),
        };
        let result = directory.record_vitals(&request).await;
        self.complete_vitals_submission(result)
    }

    /// Moves past the vitals step without recording anything.
    ///
    /// # Errors
    ///
    /// Returns `VitalsRequired` when the configuration makes vitals mandatory.
    pub fn skip_vitals(&mut self) -> RegistrationResult<Step> {
        self.check(Action::SkipVitals)?;
        if !self.engine.config().vitals_optional() {
            return Err(RegistrationError::VitalsRequired);
        }

        self.errors.clear();
        self.move_to(Step::Confirmation);
        Ok(self.step)
    }

    /// Ends the registration and hands back the created identifiers.
    pub fn acknowledge_confirmation(&mut self) -> RegistrationResult<CreatedPatient> {
        self.check(Action::AcknowledgeConfirmation)?;
        let created = self
            .created
            .clone()
            .ok_or(RegistrationError::MissingPatientRecord)?;

        self.move_to(Step::Completed);
        Ok(created)
    }

    /// Abandons the registration. A patient that was already created is not removed.
    pub fn cancel(&mut self) -> RegistrationResult<()> {
        self.check(Action::Cancel)?;

        if let Some(created) = &self.created {
            tracing::warn!(
                "registration cancelled after patient {} ({}) was created; the record is kept",
                created.patient_id,
                created.record_number
            );
        }
        self.move_to(Step::Cancelled);
        Ok(())
    }

    fn record_submission_failure(&mut self, what: &str, reason: String) -> StepOutcome {
        tracing::warn!("{} failed at {}: {}", what, self.step, reason);
        if let Some(created) = self.created.as_ref().filter(|_| self.step == Step::Vitals) {
            tracing::warn!(
                "patient {} exists without recorded vitals",
                created.patient_id
            );
        }
        self.errors.clear();
        self.errors
            .insert(FIELD_SUBMISSION, FieldError::SubmissionFailed(reason.clone()));
        StepOutcome::SubmissionFailed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::author::StaffRole;
    use crate::config::VitalRanges;
    use crate::directory::{DirectoryError, InMemoryDirectory};
    use crate::patient::{BloodPressure, FamilyMember, Gender, PersonalInfo, Relationship};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use intake_types::{PatientId, RecordNumber};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Directory double that answers from queued results and counts calls.
    #[derive(Default)]
    struct ScriptedDirectory {
        create_results: Mutex<VecDeque<DirectoryResult<CreatedPatient>>>,
        vitals_results: Mutex<VecDeque<DirectoryResult<VitalSigns>>>,
        create_calls: AtomicUsize,
        vitals_calls: AtomicUsize,
        last_vitals_request: Mutex<Option<RecordVitalsRequest>>,
        last_create_request: Mutex<Option<CreatePatientRequest>>,
    }

    impl ScriptedDirectory {
        fn creating(results: Vec<DirectoryResult<CreatedPatient>>) -> Self {
            Self {
                create_results: Mutex::new(results.into()),
                ..Default::default()
            }
        }

        fn then_recording(self, results: Vec<DirectoryResult<VitalSigns>>) -> Self {
            *self.vitals_results.lock().unwrap() = results.into();
            self
        }
    }

    #[async_trait]
    impl PatientDirectory for ScriptedDirectory {
        async fn create_patient(
            &self,
            request: &CreatePatientRequest,
        ) -> DirectoryResult<CreatedPatient> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_create_request.lock().unwrap() = Some(request.clone());
            self.create_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected create_patient call")
        }

        async fn record_vitals(
            &self,
            request: &RecordVitalsRequest,
        ) -> DirectoryResult<VitalSigns> {
            self.vitals_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_vitals_request.lock().unwrap() = Some(request.clone());
            self.vitals_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected record_vitals call")
        }
    }

    fn p1() -> CreatedPatient {
        CreatedPatient {
            patient_id: PatientId::new("p1").unwrap(),
            record_number: RecordNumber::new("TH001").unwrap(),
        }
    }

    fn author() -> Author {
        Author::new("Front Desk", StaffRole::Receptionist, "desk@example.com").unwrap()
    }

    fn workflow_with(cfg: RegistrationConfig) -> RegistrationWorkflow {
        let engine = ValidationEngine::new(Arc::new(cfg))
            .with_today(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        RegistrationWorkflow::with_engine(engine, author())
    }

    fn workflow() -> RegistrationWorkflow {
        workflow_with(RegistrationConfig::default())
    }

    fn ada() -> PatientDraft {
        PatientDraft {
            personal: PersonalInfo {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                middle_name: None,
                date_of_birth: Some("1990-01-01".into()),
                gender: Some(Gender::Female),
            },
            ..Default::default()
        }
    }

    fn child() -> FamilyMember {
        FamilyMember {
            first_name: "Byron".into(),
            middle_name: None,
            last_name: "Lovelace".into(),
            gender: Some(Gender::Male),
            date_of_birth: Some("2015-03-04".into()),
            relationship: Some(Relationship::Child),
        }
    }

    fn normal_vitals() -> VitalSigns {
        VitalSigns {
            blood_pressure: BloodPressure {
                systolic: Some(120.0),
                diastolic: Some(80.0),
            },
            heart_rate: Some(72.0),
            temperature: Some(37.0),
            weight: Some(70.5),
            height: Some(175.0),
            notes: Some("resting".into()),
        }
    }

    async fn at_vitals(directory: &ScriptedDirectory) -> RegistrationWorkflow {
        let mut wf = workflow();
        wf.select_account_type(AccountType::Personal).unwrap();
        let outcome = wf.submit_patient_form(ada(), directory).await.unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(Step::Vitals));
        wf
    }

    #[test]
    fn account_type_step_only_accepts_selection() {
        let mut wf = workflow();

        let err = wf.skip_vitals().expect_err("skip from AccountType");
        assert!(matches!(
            err,
            RegistrationError::InvalidTransition {
                step: Step::AccountType,
                action: Action::SkipVitals
            }
        ));
        assert!(wf.begin_patient_submission(ada()).is_err());
        assert!(wf.begin_vitals_submission(normal_vitals()).is_err());
        assert!(wf.acknowledge_confirmation().is_err());
        assert!(wf.return_to_account_type().is_err());

        assert_eq!(wf.step(), Step::AccountType);
        assert_eq!(wf.draft(), &PatientDraft::default(), "rejected calls change nothing");

        assert_eq!(
            wf.select_account_type(AccountType::Family).unwrap(),
            Step::FamilyForm
        );
        assert_eq!(wf.account_type(), Some(AccountType::Family));
    }

    #[test]
    fn transition_table_has_no_exits_from_ended_steps() {
        for (step, _) in TRANSITIONS {
            assert!(!step.is_ended(), "{step} should accept nothing");
        }
        assert!(!is_allowed(Step::Confirmation, Action::Cancel));
    }

    #[tokio::test]
    async fn personal_registration_end_to_end() {
        let directory = ScriptedDirectory::creating(vec![Ok(p1())]);
        let mut wf = at_vitals(&directory).await;

        assert_eq!(wf.created_patient(), Some(&p1()));
        assert!(!wf.is_submitting());

        assert_eq!(wf.skip_vitals().unwrap(), Step::Confirmation);
        assert_eq!(directory.vitals_calls.load(Ordering::SeqCst), 0);

        let created = wf.acknowledge_confirmation().expect("acknowledge");
        assert_eq!(created.patient_id.as_str(), "p1");
        assert_eq!(created.record_number.as_str(), "TH001");
        assert_eq!(wf.step(), Step::Completed);

        assert!(wf.cancel().is_err(), "a completed workflow accepts nothing");
        assert!(wf.acknowledge_confirmation().is_err());
    }

    #[tokio::test]
    async fn create_request_carries_draft_and_author() {
        let directory = ScriptedDirectory::creating(vec![Ok(p1())]);
        let _wf = at_vitals(&directory).await;

        let request = directory.last_create_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.account_type, AccountType::Personal);
        assert_eq!(request.personal_info.first_name, "Ada");
        assert!(request.family_members.is_empty());
        assert_eq!(request.created_by, author());
    }

    #[tokio::test]
    async fn resubmission_after_directory_failure() {
        let directory = ScriptedDirectory::creating(vec![
            Err(DirectoryError::Transport("connection reset".into())),
            Ok(p1()),
        ]);
        let mut wf = workflow();
        wf.select_account_type(AccountType::Personal).unwrap();

        let outcome = wf.submit_patient_form(ada(), &directory).await.unwrap();
        assert!(matches!(outcome, StepOutcome::SubmissionFailed(reason) if reason.contains("connection reset")));
        assert_eq!(wf.step(), Step::PersonalForm);
        assert!(!wf.is_submitting());
        assert!(matches!(
            wf.errors().get("submission"),
            [FieldError::SubmissionFailed(_)]
        ));
        assert_eq!(wf.draft(), &ada(), "draft survives the failure");
        assert_eq!(wf.created_patient(), None);

        let outcome = wf.submit_patient_form(ada(), &directory).await.unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(Step::Vitals));
        assert!(wf.errors().is_empty());
        assert_eq!(directory.create_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_patient_form_never_reaches_directory() {
        let directory = ScriptedDirectory::default();
        let mut wf = workflow();
        wf.select_account_type(AccountType::Personal).unwrap();

        let mut draft = ada();
        draft.personal.first_name = "  ".into();
        draft.personal.gender = None;

        let outcome = wf.submit_patient_form(draft, &directory).await.unwrap();
        let StepOutcome::Invalid(errors) = outcome else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.get("firstName"), &[FieldError::RequiredField]);
        assert_eq!(errors.get("gender"), &[FieldError::RequiredField]);
        assert_eq!(wf.errors(), &errors);
        assert_eq!(wf.step(), Step::PersonalForm);
        assert_eq!(directory.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn family_form_without_members_always_fails() {
        let directory = ScriptedDirectory::default();
        let mut wf = workflow();
        wf.select_account_type(AccountType::Family).unwrap();

        let outcome = wf.submit_patient_form(ada(), &directory).await.unwrap();
        let StepOutcome::Invalid(errors) = outcome else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 1, "primary member is valid");
        assert_eq!(errors.get("familyMembers"), &[FieldError::NoFamilyMembers]);
        assert_eq!(wf.step(), Step::FamilyForm);
        assert_eq!(directory.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn family_form_validates_every_member() {
        let directory = ScriptedDirectory::creating(vec![Ok(p1())]);
        let mut wf = workflow();
        wf.select_account_type(AccountType::Family).unwrap();

        let mut draft = ada();
        draft.family_members = vec![
            child(),
            FamilyMember {
                date_of_birth: Some("2031-01-01".into()),
                ..child()
            },
        ];
        let outcome = wf.submit_patient_form(draft.clone(), &directory).await.unwrap();
        let StepOutcome::Invalid(errors) = outcome else {
            panic!("expected validation failure");
        };
        assert_eq!(
            errors.get("familyMembers[1].dateOfBirth"),
            &[FieldError::FutureDate]
        );

        draft.family_members.truncate(1);
        let outcome = wf.submit_patient_form(draft, &directory).await.unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(Step::Vitals));

        let request = directory.last_create_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.account_type, AccountType::Family);
        assert_eq!(request.family_members, vec![child()]);
    }

    #[test]
    fn second_submission_is_rejected_while_in_flight() {
        let mut wf = workflow();
        wf.select_account_type(AccountType::Personal).unwrap();

        let prepared = wf.begin_patient_submission(ada()).unwrap();
        assert!(matches!(prepared, Prepared::Ready(_)));
        assert!(wf.is_submitting());

        let err = wf
            .begin_patient_submission(ada())
            .expect_err("second submission should be rejected");
        assert!(matches!(err, RegistrationError::SubmissionInFlight));
        assert!(matches!(
            wf.return_to_account_type(),
            Err(RegistrationError::SubmissionInFlight)
        ));
        assert!(wf.is_submitting(), "rejection leaves the first submission pending");

        let outcome = wf.complete_patient_submission(Ok(p1())).unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(Step::Vitals));
        assert!(!wf.is_submitting());

        assert!(matches!(
            wf.complete_patient_submission(Ok(p1())),
            Err(RegistrationError::NoSubmissionPending)
        ));
    }

    #[tokio::test]
    async fn vitals_are_recorded_against_created_patient() {
        let persisted = normal_vitals();
        let directory =
            ScriptedDirectory::creating(vec![Ok(p1())]).then_recording(vec![Ok(persisted.clone())]);
        let mut wf = at_vitals(&directory).await;

        let outcome = wf.submit_vitals(normal_vitals(), &directory).await.unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(Step::Confirmation));
        assert_eq!(wf.recorded_vitals(), Some(&persisted));

        let request = directory.last_vitals_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.patient_id.as_str(), "p1");
        assert_eq!(request.recorded_by, author());
    }

    #[tokio::test]
    async fn out_of_range_vitals_stay_on_step() {
        let directory = ScriptedDirectory::creating(vec![Ok(p1())]);
        let mut wf = at_vitals(&directory).await;

        let mut vitals = normal_vitals();
        vitals.blood_pressure.systolic = Some(300.0);
        let outcome = wf.submit_vitals(vitals.clone(), &directory).await.unwrap();

        assert!(matches!(outcome, StepOutcome::Invalid(ref errors) if errors.len() == 1));
        assert_eq!(wf.step(), Step::Vitals);
        assert_eq!(wf.vitals_draft(), &vitals);
        assert_eq!(directory.vitals_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn vitals_failure_keeps_patient_and_allows_retry() {
        let directory = ScriptedDirectory::creating(vec![Ok(p1())]).then_recording(vec![
            Err(DirectoryError::Rejected {
                status: 503,
                message: "unavailable".into(),
            }),
            Ok(normal_vitals()),
        ]);
        let mut wf = at_vitals(&directory).await;

        let outcome = wf.submit_vitals(normal_vitals(), &directory).await.unwrap();
        assert!(matches!(outcome, StepOutcome::SubmissionFailed(_)));
        assert_eq!(wf.step(), Step::Vitals);
        assert_eq!(wf.created_patient(), Some(&p1()));

        let outcome = wf.submit_vitals(normal_vitals(), &directory).await.unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(Step::Confirmation));
    }

    #[tokio::test]
    async fn mandatory_vitals_cannot_be_skipped() {
        let cfg = RegistrationConfig::new(6, false, VitalRanges::default()).unwrap();
        let directory = ScriptedDirectory::creating(vec![Ok(p1())]);
        let mut wf = workflow_with(cfg);
        wf.select_account_type(AccountType::Personal).unwrap();
        wf.submit_patient_form(ada(), &directory).await.unwrap();

        assert!(matches!(wf.skip_vitals(), Err(RegistrationError::VitalsRequired)));
        assert_eq!(wf.step(), Step::Vitals);
    }

    #[tokio::test]
    async fn cancel_keeps_created_patient_and_ends_workflow() {
        let directory = InMemoryDirectory::new();
        let mut wf = workflow();
        wf.select_account_type(AccountType::Personal).unwrap();
        wf.submit_patient_form(ada(), &directory).await.unwrap();

        wf.cancel().expect("cancel from vitals");
        assert_eq!(wf.step(), Step::Cancelled);
        assert_eq!(directory.patient_count(), 1, "no rollback");

        assert!(wf.skip_vitals().is_err());
        assert!(wf.cancel().is_err());
    }

    #[test]
    fn answer_arriving_after_cancel_is_discarded() {
        let mut wf = workflow();
        wf.select_account_type(AccountType::Personal).unwrap();
        wf.begin_patient_submission(ada()).unwrap();

        wf.cancel().expect("cancel while in flight");
        let outcome = wf.complete_patient_submission(Ok(p1())).unwrap();

        assert_eq!(outcome, StepOutcome::Discarded);
        assert_eq!(wf.step(), Step::Cancelled);
        assert_eq!(wf.created_patient(), None);
        assert!(!wf.is_submitting());
    }

    #[test]
    fn returning_to_account_type_keeps_draft() {
        let mut wf = workflow();
        wf.select_account_type(AccountType::Personal).unwrap();
        let _ = wf.begin_patient_submission(PatientDraft::default()).unwrap();
        assert!(wf.errors().has_errors());

        assert_eq!(wf.return_to_account_type().unwrap(), Step::AccountType);
        assert!(wf.errors().is_empty());
        assert_eq!(
            wf.select_account_type(AccountType::Family).unwrap(),
            Step::FamilyForm
        );
        assert_eq!(wf.draft(), &PatientDraft::default());
    }

    #[test]
    fn clear_errors_for_edited_fields() {
        let mut wf = workflow();
        wf.select_account_type(AccountType::Personal).unwrap();
        let _ = wf.begin_patient_submission(PatientDraft::default()).unwrap();

        wf.clear_errors_for(&["firstName"]);
        assert!(!wf.errors().contains_field("firstName"));
        assert!(wf.errors().contains_field("lastName"));
    }
}
