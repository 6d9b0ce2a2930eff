//! Applicant and staff identities, credential checks and session tokens.
//!
//! The two principal kinds live in separate tables and never share an id space; a session
//! only ever carries a tagged [`IdentityToken`].

pub mod domain;
pub mod password;
pub mod router;
pub mod service;
pub mod session;

pub use domain::{
    ApplicantAccount, ApplicantId, Credentials, NewApplicant, NewStaff, Permission,
    PermissionSet, PrincipalKind, PurgeReport, SignupForm, StaffAccount, StaffId, StaffRole,
};
pub use router::identity_router;
pub use service::{IdentityError, IdentityService};
pub use session::{
    authorize, require_staff, require_super_admin, AccessDenied, IdentityToken, Principal,
    SESSION_IDENTITY_KEY,
};
