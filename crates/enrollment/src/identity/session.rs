use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::domain::{ApplicantAccount, ApplicantId, Permission, StaffAccount, StaffId};

/// Session key under which the identity token is stored.
pub const SESSION_IDENTITY_KEY: &str = "identity";

/// Type-tagged identity kept in the session: `user:<id>` or `admin:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityToken {
    Applicant(ApplicantId),
    Staff(StaffId),
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityToken::Applicant(id) => write!(f, "user:{id}"),
            IdentityToken::Staff(id) => write!(f, "admin:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed identity token '{0}'")]
pub struct MalformedToken(pub String);

impl FromStr for IdentityToken {
    type Err = MalformedToken;

    /// Bare numbers are read as applicant ids; sessions issued before tokens were
    /// tagged carry those.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedToken(raw.to_string());
        let parse_id = |value: &str| value.trim().parse::<i64>().map_err(|_| malformed());

        match raw.split_once(':') {
            Some(("user", id)) => Ok(IdentityToken::Applicant(ApplicantId(parse_id(id)?))),
            Some(("admin", id)) => Ok(IdentityToken::Staff(StaffId(parse_id(id)?))),
            Some(_) => Err(malformed()),
            None => Ok(IdentityToken::Applicant(ApplicantId(parse_id(raw)?))),
        }
    }
}

/// The authenticated party behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "account", rename_all = "snake_case")]
pub enum Principal {
    Applicant(ApplicantAccount),
    Staff(StaffAccount),
}

impl Principal {
    pub fn token(&self) -> IdentityToken {
        match self {
            Principal::Applicant(account) => IdentityToken::Applicant(account.id),
            Principal::Staff(account) => IdentityToken::Staff(account.id),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Principal::Applicant(account) => account.full_name(),
            Principal::Staff(account) => account.full_name.clone(),
        }
    }

    pub fn as_staff(&self) -> Option<&StaffAccount> {
        match self {
            Principal::Staff(account) => Some(account),
            Principal::Applicant(_) => None,
        }
    }

    pub fn as_applicant(&self) -> Option<&ApplicantAccount> {
        match self {
            Principal::Applicant(account) => Some(account),
            Principal::Staff(_) => None,
        }
    }
}

/// Why a staff-only operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("access denied: sign in required")]
    Anonymous,
    #[error("access denied: admin privileges required")]
    NotStaff,
    #[error("access denied: missing permission '{0}'")]
    MissingPermission(Permission),
    #[error("access denied: super admin privileges required")]
    NotSuperAdmin,
}

/// Checks that `staff` holds `permission`. The `super_admin` role holds every permission.
pub fn authorize(staff: &StaffAccount, permission: Permission) -> Result<(), AccessDenied> {
    if staff.has_permission(permission) {
        Ok(())
    } else {
        Err(AccessDenied::MissingPermission(permission))
    }
}

pub fn require_staff(principal: Option<&Principal>) -> Result<&StaffAccount, AccessDenied> {
    match principal {
        Some(Principal::Staff(staff)) => Ok(staff),
        Some(Principal::Applicant(_)) => Err(AccessDenied::NotStaff),
        None => Err(AccessDenied::Anonymous),
    }
}

/// Staff-only check used where a capability has to be backed by the role itself.
pub fn require_super_admin(staff: &StaffAccount) -> Result<(), AccessDenied> {
    if staff.is_super_admin() {
        Ok(())
    } else {
        Err(AccessDenied::NotSuperAdmin)
    }
}
