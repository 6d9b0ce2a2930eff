//! Admission applications: intake validation, the review state machine and the
//! one-outstanding-application guard.

pub mod domain;
pub mod intake;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationSubmission, Decision,
    GuardianDetails, NewApplication, ParentDetails, PhotoRole, PhotoUpload, StudentDetails,
};
pub use intake::IntakeViolation;
pub use router::application_router;
pub use service::{
    AdmissionError, AdmissionService, ApplicationSummary, ApplicationView, StatusCounts,
};
