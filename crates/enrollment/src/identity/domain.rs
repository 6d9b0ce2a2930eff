use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UnknownLabel;

/// Row id of an applicant (guardian) account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantId(pub i64);

/// Row id of a staff account. Shares no namespace with [`ApplicantId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaffId(pub i64);

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StaffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Guardian account that submits applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicantAccount {
    pub id: ApplicantId,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicantAccount {
    pub fn full_name(&self) -> String {
        match &self.middle_name {
            Some(middle) => format!("{} {} {}", self.first_name, middle, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplicant {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    SuperAdmin,
}

impl StaffRole {
    pub fn label(&self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::SuperAdmin => "super_admin",
        }
    }
}

impl FromStr for StaffRole {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(StaffRole::Admin),
            "super_admin" => Ok(StaffRole::SuperAdmin),
            other => Err(UnknownLabel::new("staff role", other)),
        }
    }
}

/// Named capability checked before a staff-only operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewApplications,
    ApproveApplications,
    RejectApplications,
    ViewPayments,
    ManagePayments,
    ViewReports,
    ManageUsers,
    ExportData,
    ExportFinancialData,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::ViewApplications,
        Permission::ApproveApplications,
        Permission::RejectApplications,
        Permission::ViewPayments,
        Permission::ManagePayments,
        Permission::ViewReports,
        Permission::ManageUsers,
        Permission::ExportData,
        Permission::ExportFinancialData,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Permission::ViewApplications => "view_applications",
            Permission::ApproveApplications => "approve_applications",
            Permission::RejectApplications => "reject_applications",
            Permission::ViewPayments => "view_payments",
            Permission::ManagePayments => "manage_payments",
            Permission::ViewReports => "view_reports",
            Permission::ManageUsers => "manage_users",
            Permission::ExportData => "export_data",
            Permission::ExportFinancialData => "export_financial_data",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Permission {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|permission| permission.label() == value)
            .ok_or_else(|| UnknownLabel::new("permission", value))
    }
}

/// Grants held by a staff account.
///
/// `Unrestricted` is what a stored row without a permission list means. It grants
/// everything, so it is spelled out here instead of hiding behind an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSet {
    Unrestricted,
    Granted(BTreeSet<Permission>),
}

impl PermissionSet {
    pub fn granted<I: IntoIterator<Item = Permission>>(permissions: I) -> Self {
        PermissionSet::Granted(permissions.into_iter().collect())
    }

    pub fn contains(&self, permission: Permission) -> bool {
        match self {
            PermissionSet::Unrestricted => true,
            PermissionSet::Granted(set) => set.contains(&permission),
        }
    }

    /// Storage form: `None` for unrestricted, otherwise a JSON array of labels.
    pub fn to_stored(&self) -> Option<String> {
        match self {
            PermissionSet::Unrestricted => None,
            PermissionSet::Granted(set) => {
                let labels: Vec<&str> = set.iter().map(Permission::label).collect();
                Some(serde_json::Value::from(labels).to_string())
            }
        }
    }

    /// Inverse of [`PermissionSet::to_stored`]. Unknown labels are dropped and a list
    /// that does not parse grants nothing.
    pub fn from_stored(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
            return PermissionSet::Unrestricted;
        };

        let labels: Vec<String> = match serde_json::from_str(raw) {
            Ok(labels) => labels,
            Err(err) => {
                tracing::warn!(error = %err, "unreadable staff permission list; granting none");
                return PermissionSet::Granted(BTreeSet::new());
            }
        };

        let mut set = BTreeSet::new();
        for label in labels {
            match label.parse::<Permission>() {
                Ok(permission) => {
                    set.insert(permission);
                }
                Err(err) => tracing::warn!(%err, "ignoring stored permission"),
            }
        }
        PermissionSet::Granted(set)
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionSet::Unrestricted => write!(f, "all"),
            PermissionSet::Granted(set) if set.is_empty() => write!(f, "none"),
            PermissionSet::Granted(set) => {
                let labels: Vec<&str> = set.iter().map(Permission::label).collect();
                write!(f, "{}", labels.join(", "))
            }
        }
    }
}

/// School staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffAccount {
    pub id: StaffId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: StaffRole,
    pub permissions: PermissionSet,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StaffAccount {
    pub fn is_super_admin(&self) -> bool {
        self.role == StaffRole::SuperAdmin
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.is_super_admin() || self.permissions.contains(permission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStaff {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: StaffRole,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
}

/// Form posted to `/signup`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
}

/// Form posted to `/login` and `/admin/login`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// Free-text location the guardian reports logging in from.
    pub place: Option<String>,
}

/// Which account table a login attempt targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    Applicant,
    Staff,
}

/// Count of rows removed by a bulk purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub payments: usize,
    pub applications: usize,
    pub applicants: usize,
}
