//! Storage seams for accounts, applications and payments.
//!
//! Every method is one unit of work: multi-row changes (completing a payment, the
//! applicant purge) happen inside a single call so a backend can run them in one
//! transaction.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::applications::{Application, ApplicationId, ApplicationStatus, NewApplication};
use crate::identity::{
    ApplicantAccount, ApplicantId, NewApplicant, NewStaff, PurgeReport, StaffAccount, StaffId,
};
use crate::payments::{NewPayment, Payment, PaymentId, PaymentStatus};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    /// A compare-and-set update found the row in another state.
    #[error("record changed concurrently")]
    Stale,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub trait AccountRepository: Send + Sync {
    fn insert_applicant(&self, account: NewApplicant)
        -> Result<ApplicantAccount, RepositoryError>;
    fn applicant(&self, id: ApplicantId) -> Result<Option<ApplicantAccount>, RepositoryError>;
    fn applicant_by_email(&self, email: &str)
        -> Result<Option<ApplicantAccount>, RepositoryError>;
    /// Newest first.
    fn applicants(&self) -> Result<Vec<ApplicantAccount>, RepositoryError>;

    fn insert_staff(&self, account: NewStaff) -> Result<StaffAccount, RepositoryError>;
    fn staff(&self, id: StaffId) -> Result<Option<StaffAccount>, RepositoryError>;
    fn staff_by_email(&self, email: &str) -> Result<Option<StaffAccount>, RepositoryError>;
    fn record_staff_login(&self, id: StaffId, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Deletes every payment, application and applicant account, in that order, as one
    /// transaction. Staff accounts are untouched.
    fn purge_applicants(&self) -> Result<PurgeReport, RepositoryError>;
}

pub trait ApplicationRepository: Send + Sync {
    fn insert_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, RepositoryError>;
    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;
    /// Newest first, optionally truncated.
    fn applications(&self, limit: Option<usize>) -> Result<Vec<Application>, RepositoryError>;
    /// Newest pending application of `applicant` whose fee flag is unset.
    fn outstanding_application(
        &self,
        applicant: ApplicantId,
    ) -> Result<Option<Application>, RepositoryError>;
    /// Moves `id` from `expected` to `next`, failing with `Stale` if it is no longer in
    /// `expected`.
    fn update_application_status(
        &self,
        id: ApplicationId,
        expected: ApplicationStatus,
        next: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<Application, RepositoryError>;
}

pub trait PaymentRepository: Send + Sync {
    fn insert_payment(&self, payment: NewPayment) -> Result<Payment, RepositoryError>;
    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError>;
    /// Newest first.
    fn payments(&self) -> Result<Vec<Payment>, RepositoryError>;
    fn payments_for_application(
        &self,
        id: ApplicationId,
    ) -> Result<Vec<Payment>, RepositoryError>;
    /// Compare-and-set on the payment status. Moving to `Completed` also stamps
    /// `completed_at` and sets the parent application's `payment_completed`, atomically.
    fn update_payment_status(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        next: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Payment, RepositoryError>;
}

/// Everything the portal needs from a backend.
pub trait Store: AccountRepository + ApplicationRepository + PaymentRepository + 'static {}

impl<T> Store for T where T: AccountRepository + ApplicationRepository + PaymentRepository + 'static
{}
