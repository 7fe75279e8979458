use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intake_client::HttpPatientDirectory;
use intake_core::config::{postal_code_digits_from_env_value, vitals_optional_from_env_value};
use intake_core::constants::{FIELD_EMAIL, FIELD_PHONE_NUMBER, FIELD_POSTAL_CODE};
use intake_core::patient::load_json;
use intake_core::{
    AccountType, Author, CreatedPatient, ErrorMap, InMemoryDirectory, PatientDirectory,
    PatientDraft, RegistrationConfig, RegistrationWorkflow, SiteContent, StaffRole, StepOutcome,
    ValidationEngine, VitalRanges, VitalSigns, content::validate_site_content,
};

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "Hospital patient intake tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an email address
    CheckEmail { value: String },
    /// Validate a phone number
    CheckPhone { value: String },
    /// Validate a postal code
    CheckPostalCode { value: String },
    /// Validate a vital signs JSON document
    CheckVitals { file: PathBuf },
    /// Register a patient from a JSON draft
    Register {
        /// Patient draft (JSON)
        #[arg(long)]
        draft: PathBuf,
        /// personal or family
        #[arg(long)]
        account_type: AccountType,
        /// Vital signs to record after creation (JSON); vitals are skipped if absent
        #[arg(long)]
        vitals: Option<PathBuf>,
        /// Use an in-memory directory instead of INTAKE_API_URL
        #[arg(long)]
        dry_run: bool,
        /// Staff member name
        #[arg(long)]
        staff_name: String,
        /// Staff member email
        #[arg(long)]
        staff_email: String,
        /// Staff member role
        #[arg(long, default_value = "receptionist")]
        staff_role: StaffRole,
    },
    /// Validate homepage content (YAML)
    CheckContent { file: PathBuf },
}

/// Main entry point for the intake CLI
///
/// # Environment Variables
/// - `INTAKE_API_URL`: base URL of the patient directory (required by `register` without `--dry-run`)
/// - `INTAKE_API_KEY`: API key sent as `x-api-key` (optional)
/// - `INTAKE_POSTAL_CODE_DIGITS`: postal code length (default: 6)
/// - `INTAKE_VITALS_OPTIONAL`: whether vitals may be skipped (default: true)
///
/// # Returns
/// * `Ok(ExitCode::SUCCESS)` - If the input was valid or the registration completed
/// * `Ok(ExitCode::FAILURE)` - If field errors were found (printed as JSON)
/// * `Err(anyhow::Error)` - If configuration, input files or the directory failed
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = registration_config()?;
    let engine = ValidationEngine::new(cfg.clone());

    match cli.command {
        Commands::CheckEmail { value } => {
            report(single_field(FIELD_EMAIL, engine.validate_email(&value)))
        }
        Commands::CheckPhone { value } => report(single_field(
            FIELD_PHONE_NUMBER,
            engine.validate_phone_number(&value),
        )),
        Commands::CheckPostalCode { value } => report(single_field(
            FIELD_POSTAL_CODE,
            engine.validate_postal_code(&value),
        )),
        Commands::CheckVitals { file } => {
            let vitals: VitalSigns = read_json(&file)?;
            report(engine.validate_vital_signs(&vitals))
        }
        Commands::Register {
            draft,
            account_type,
            vitals,
            dry_run,
            staff_name,
            staff_email,
            staff_role,
        } => {
            let draft: PatientDraft = read_json(&draft)?;
            let vitals: Option<VitalSigns> =
                vitals.as_deref().map(read_json::<VitalSigns>).transpose()?;
            let author = Author::new(staff_name, staff_role, staff_email)?;

            let directory: Box<dyn PatientDirectory> = if dry_run {
                tracing::info!("dry run: using in-memory patient directory");
                Box::new(InMemoryDirectory::new())
            } else {
                Box::new(HttpPatientDirectory::from_env_values(
                    std::env::var("INTAKE_API_URL").ok(),
                    std::env::var("INTAKE_API_KEY").ok(),
                )?)
            };

            let workflow = RegistrationWorkflow::new(cfg, author);
            match register(workflow, account_type, draft, vitals, directory.as_ref()).await? {
                Ok(created) => {
                    println!("{}", serde_json::to_string_pretty(&created)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(errors) => report(errors),
            }
        }
        Commands::CheckContent { file } => {
            let content = SiteContent::load(&file)?;
            report(validate_site_content(&content))
        }
    }
}

/// Resolves the registration rules from the environment.
fn registration_config() -> anyhow::Result<Arc<RegistrationConfig>> {
    let digits = postal_code_digits_from_env_value(std::env::var("INTAKE_POSTAL_CODE_DIGITS").ok())?;
    let optional = vitals_optional_from_env_value(std::env::var("INTAKE_VITALS_OPTIONAL").ok())?;
    Ok(Arc::new(RegistrationConfig::new(
        digits,
        optional,
        VitalRanges::default(),
    )?))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    load_json(path).with_context(|| format!("loading {}", path.display()))
}

fn single_field(field: &str, errors: Vec<intake_core::FieldError>) -> ErrorMap {
    let mut map = ErrorMap::new();
    map.extend_field(field, errors);
    map
}

/// Prints field errors as JSON and picks the exit code.
fn report(errors: ErrorMap) -> anyhow::Result<ExitCode> {
    if errors.is_empty() {
        println!("ok");
        return Ok(ExitCode::SUCCESS);
    }
    println!("{}", serde_json::to_string_pretty(&errors)?);
    Ok(ExitCode::FAILURE)
}

/// Turns a step outcome into field errors to report, or an error for directory failures.
fn settle(outcome: StepOutcome, what: &str) -> anyhow::Result<Option<ErrorMap>> {
    match outcome {
        StepOutcome::Advanced(step) => {
            tracing::debug!("{what} done, now at {step}");
            Ok(None)
        }
        StepOutcome::Invalid(errors) => Ok(Some(errors)),
        StepOutcome::SubmissionFailed(reason) => anyhow::bail!("{what} failed: {reason}"),
        StepOutcome::Discarded => anyhow::bail!("{what} was discarded"),
    }
}

/// Drives one registration to completion.
///
/// # Returns
/// * `Ok(Ok(created))` - The identifiers assigned by the directory
/// * `Ok(Err(errors))` - Field errors that stopped the registration at a step
/// * `Err(anyhow::Error)` - An illegal transition or a directory failure
async fn register(
    mut workflow: RegistrationWorkflow,
    account_type: AccountType,
    draft: PatientDraft,
    vitals: Option<VitalSigns>,
    directory: &dyn PatientDirectory,
) -> anyhow::Result<Result<CreatedPatient, ErrorMap>> {
    workflow.select_account_type(account_type)?;

    let outcome = workflow.submit_patient_form(draft, directory).await?;
    if let Some(errors) = settle(outcome, "patient creation")? {
        return Ok(Err(errors));
    }

    match vitals {
        Some(vitals) => {
            let outcome = workflow.submit_vitals(vitals, directory).await?;
            if let Some(errors) = settle(outcome, "vitals recording")? {
                return Ok(Err(errors));
            }
        }
        None => {
            workflow.skip_vitals()?;
        }
    }

    Ok(Ok(workflow.acknowledge_confirmation()?))
}
