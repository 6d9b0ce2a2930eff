use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UnknownLabel;
use crate::identity::{ApplicantId, Permission};
use crate::payments::{Payment, PaymentStatus};

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub i64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Review state. `Approved` and `Rejected` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

impl FromStr for ApplicationStatus {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(UnknownLabel::new("application status", other)),
        }
    }
}

/// Staff verdict on a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn required_permission(&self) -> Permission {
        match self {
            Decision::Approve => Permission::ApproveApplications,
            Decision::Reject => Permission::RejectApplications,
        }
    }

    pub fn target_status(&self) -> ApplicationStatus {
        match self {
            Decision::Approve => ApplicationStatus::Approved,
            Decision::Reject => ApplicationStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            other => Err(UnknownLabel::new("decision", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentDetails {
    pub first_name: String,
    pub second_name: Option<String>,
    pub surname: String,
    pub nationality: String,
    pub gender: String,
    pub religion: Option<String>,
    pub date_of_birth: NaiveDate,
    pub place_of_birth: String,
}

impl StudentDetails {
    pub fn full_name(&self) -> String {
        match &self.second_name {
            Some(second) => format!("{} {} {}", self.first_name, second, self.surname),
            None => format!("{} {}", self.first_name, self.surname),
        }
    }
}

/// Father or mother record; every parent field apart from the optional ones is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentDetails {
    pub first_name: String,
    pub second_name: Option<String>,
    pub last_name: String,
    pub occupation: String,
    /// National identification (NIDA) number.
    pub national_id: Option<String>,
    pub telephone: String,
    pub address: String,
    pub street: Option<String>,
    pub photo: Option<String>,
}

/// Optional as a group; individual fields stay optional once present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianDetails {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub occupation: Option<String>,
    pub telephone: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
}

impl GuardianDetails {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.occupation.is_none()
            && self.telephone.is_none()
            && self.address.is_none()
            && self.photo.is_none()
    }
}

/// Persisted admission application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub student: StudentDetails,
    pub father: ParentDetails,
    pub mother: ParentDetails,
    pub guardian: Option<GuardianDetails>,
    pub status: ApplicationStatus,
    pub payment_required: bool,
    pub payment_completed: bool,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn student_name(&self) -> String {
        self.student.full_name()
    }

    /// Paid when the flag is set or any linked payment completed.
    pub fn is_paid(&self, payments: &[Payment]) -> bool {
        self.payment_completed
            || payments.iter().any(|payment| {
                payment.application_id == self.id && payment.status == PaymentStatus::Completed
            })
    }

    /// Pending with the fee flag still unset: blocks a second submission.
    pub fn is_outstanding(&self) -> bool {
        self.status == ApplicationStatus::Pending && !self.payment_completed
    }
}

/// Validated application prior to insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub applicant_id: ApplicantId,
    pub student: StudentDetails,
    pub father: ParentDetails,
    pub mother: ParentDetails,
    pub guardian: Option<GuardianDetails>,
    pub submitted_at: DateTime<Utc>,
}

/// Raw text fields of the application form, exactly as posted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSubmission {
    pub first_name: String,
    pub second_name: String,
    pub surname: String,
    pub nationality: String,
    pub gender: String,
    pub religion: String,
    pub date_of_birth: String,
    pub place_of_birth: String,

    pub father_first_name: String,
    pub father_second_name: String,
    pub father_last_name: String,
    pub father_occupation: String,
    pub father_nida: String,
    pub father_telephone: String,
    pub father_address: String,
    pub father_street: String,

    pub mother_first_name: String,
    pub mother_second_name: String,
    pub mother_last_name: String,
    pub mother_occupation: String,
    pub mother_nida: String,
    pub mother_telephone: String,
    pub mother_address: String,
    pub mother_street: String,

    pub guardian_first_name: String,
    pub guardian_last_name: String,
    pub guardian_occupation: String,
    pub guardian_telephone: String,
    pub guardian_address: String,
}

/// Whose photo an upload carries; also the stored filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoRole {
    Father,
    Mother,
    Guardian,
}

impl PhotoRole {
    pub fn label(&self) -> &'static str {
        match self {
            PhotoRole::Father => "father",
            PhotoRole::Mother => "mother",
            PhotoRole::Guardian => "guardian",
        }
    }

    /// Maps a multipart field name such as `father_photo`.
    pub fn from_field(name: &str) -> Option<Self> {
        match name {
            "father_photo" => Some(PhotoRole::Father),
            "mother_photo" => Some(PhotoRole::Mother),
            "guardian_photo" => Some(PhotoRole::Guardian),
            _ => None,
        }
    }
}

/// A photo file received with the application form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub role: PhotoRole,
    pub file_name: String,
    pub bytes: Vec<u8>,
}
