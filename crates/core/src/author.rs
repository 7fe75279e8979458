//! Staff attribution for registrations.
//!
//! Every record created or vital sign recorded through the workflow is attributed to the
//! staff member driving it, passed to the patient directory as `createdBy`/`recordedBy`.

use crate::error::{RegistrationError, RegistrationResult};
use crate::NonEmptyText;
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};

/// Dashboard role of a staff member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Admin,
    Doctor,
    Nurse,
    Receptionist,
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Admin => "admin",
            Self::Doctor => "doctor",
            Self::Nurse => "nurse",
            Self::Receptionist => "receptionist",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for StaffRole {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "doctor" => Ok(Self::Doctor),
            "nurse" => Ok(Self::Nurse),
            "receptionist" => Ok(Self::Receptionist),
            other => Err(RegistrationError::InvalidInput(format!(
                "unknown staff role '{other}'"
            ))),
        }
    }
}

/// Represents the staff member a registration is attributed to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// The full name of the staff member.
    pub name: NonEmptyText,

    /// The dashboard role of the staff member.
    pub role: StaffRole,

    /// Work email address, used by the directory for audit trails.
    pub email: EmailAddress,
}

impl Author {
    /// Builds an author after checking the name and email.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::Text` for a blank name and
    /// `RegistrationError::InvalidInput` for a malformed email address.
    pub fn new(
        name: impl AsRef<str>,
        role: StaffRole,
        email: impl Into<String>,
    ) -> RegistrationResult<Self> {
        let name = NonEmptyText::new(name)?;
        let raw = email.into();
        let email = raw.trim().parse::<EmailAddress>().map_err(|e| {
            RegistrationError::InvalidInput(format!("invalid author email '{}': {e}", raw.trim()))
        })?;

        Ok(Self { name, role, email })
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.role)
    }
}
