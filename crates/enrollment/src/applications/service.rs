use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationSubmission, Decision, PhotoRole,
    PhotoUpload,
};
use super::intake::{self, IntakeViolation};
use crate::identity::{authorize, AccessDenied, ApplicantAccount, Permission, StaffAccount};
use crate::payments::Payment;
use crate::site::{FileStore, FileStoreError};
use crate::store::{ApplicationRepository, PaymentRepository, RepositoryError};

/// Application with its linked payments and derived paid flag.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub application: Application,
    pub paid: bool,
    pub payments: Vec<Payment>,
}

/// Row of the staff listing.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummary {
    pub application: Application,
    pub student_name: String,
    pub paid: bool,
}

/// Totals by review state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Intake and review of admission applications.
pub struct AdmissionService<S> {
    store: Arc<S>,
    files: Arc<FileStore>,
}

impl<S> AdmissionService<S>
where
    S: ApplicationRepository + PaymentRepository + 'static,
{
    pub fn new(store: Arc<S>, files: Arc<FileStore>) -> Self {
        Self { store, files }
    }

    /// The applicant's newest pending application whose fee is still unpaid.
    pub fn outstanding_for(
        &self,
        applicant: &ApplicantAccount,
    ) -> Result<Option<Application>, AdmissionError> {
        Ok(self.store.outstanding_application(applicant.id)?)
    }

    /// Validates and stores a new application. Photos written for a submission that
    /// fails to persist are removed again.
    pub fn submit(
        &self,
        applicant: &ApplicantAccount,
        submission: ApplicationSubmission,
        photos: Vec<PhotoUpload>,
    ) -> Result<Application, AdmissionError> {
        if let Some(existing) = self.store.outstanding_application(applicant.id)? {
            return Err(AdmissionError::PaymentOutstanding(existing.id));
        }

        let now = Utc::now();
        let mut application = intake::validate(applicant.id, &submission, now)?;

        let mut written = Vec::new();
        for photo in photos {
            if photo.bytes.is_empty() || photo.file_name.trim().is_empty() {
                continue;
            }
            let reference = match self
                .files
                .save_photo(photo.role, &photo.file_name, &photo.bytes, now)
            {
                Ok(reference) => reference,
                Err(err) => {
                    self.discard(&written);
                    return Err(err.into());
                }
            };
            written.push(reference.clone());

            match photo.role {
                PhotoRole::Father => application.father.photo = Some(reference),
                PhotoRole::Mother => application.mother.photo = Some(reference),
                PhotoRole::Guardian => {
                    application.guardian.get_or_insert_with(Default::default).photo =
                        Some(reference)
                }
            }
        }

        match self.store.insert_application(application) {
            Ok(stored) => {
                tracing::info!(
                    application_id = %stored.id,
                    applicant_id = %applicant.id,
                    photos = written.len(),
                    "application submitted"
                );
                Ok(stored)
            }
            Err(err) => {
                self.discard(&written);
                Err(err.into())
            }
        }
    }

    fn discard(&self, references: &[String]) {
        for reference in references {
            self.files.remove_upload(reference);
        }
    }

    pub fn get(
        &self,
        staff: &StaffAccount,
        id: ApplicationId,
    ) -> Result<ApplicationView, AdmissionError> {
        authorize(staff, Permission::ViewApplications)?;
        let application = self
            .store
            .application(id)?
            .ok_or(AdmissionError::NotFound(id))?;
        let payments = self.store.payments_for_application(id)?;
        Ok(ApplicationView {
            paid: application.is_paid(&payments),
            application,
            payments,
        })
    }

    /// All applications, newest first.
    pub fn list(&self, staff: &StaffAccount) -> Result<Vec<ApplicationSummary>, AdmissionError> {
        authorize(staff, Permission::ViewApplications)?;
        self.summaries(None)
    }

    /// Newest applications for the dashboard; any signed-in staff member may see them.
    pub fn recent(&self, limit: usize) -> Result<Vec<ApplicationSummary>, AdmissionError> {
        self.summaries(Some(limit))
    }

    fn summaries(&self, limit: Option<usize>) -> Result<Vec<ApplicationSummary>, AdmissionError> {
        let payments = self.store.payments()?;
        let summaries = self
            .store
            .applications(limit)?
            .into_iter()
            .map(|application| ApplicationSummary {
                student_name: application.student_name(),
                paid: application.is_paid(&payments),
                application,
            })
            .collect();
        Ok(summaries)
    }

    pub fn status_counts(&self) -> Result<StatusCounts, AdmissionError> {
        let mut counts = StatusCounts::default();
        for application in self.store.applications(None)? {
            counts.total += 1;
            match application.status {
                ApplicationStatus::Pending => counts.pending += 1,
                ApplicationStatus::Approved => counts.approved += 1,
                ApplicationStatus::Rejected => counts.rejected += 1,
            }
        }
        Ok(counts)
    }

    /// Approves or rejects a pending application. Decisions are final.
    pub fn decide(
        &self,
        staff: &StaffAccount,
        id: ApplicationId,
        decision: Decision,
    ) -> Result<Application, AdmissionError> {
        authorize(staff, decision.required_permission())?;

        let current = self
            .store
            .application(id)?
            .ok_or(AdmissionError::NotFound(id))?;
        if current.status.is_final() {
            return Err(AdmissionError::AlreadyDecided(current.status));
        }

        let updated = match self.store.update_application_status(
            id,
            ApplicationStatus::Pending,
            decision.target_status(),
            Utc::now(),
        ) {
            Ok(updated) => updated,
            Err(RepositoryError::Stale) => {
                let status = self
                    .store
                    .application(id)?
                    .map(|application| application.status)
                    .unwrap_or(current.status);
                return Err(AdmissionError::AlreadyDecided(status));
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!(
            application_id = %id,
            staff_id = %staff.id,
            status = updated.status.label(),
            "application decided"
        );
        Ok(updated)
    }
}

/// Error raised by the admission service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] IntakeViolation),
    #[error("application {0} is awaiting payment")]
    PaymentOutstanding(ApplicationId),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("application already {}", .0.label())]
    AlreadyDecided(ApplicationStatus),
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
    #[error(transparent)]
    Files(#[from] FileStoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
