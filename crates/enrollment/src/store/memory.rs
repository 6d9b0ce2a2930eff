use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{AccountRepository, ApplicationRepository, PaymentRepository, RepositoryError};
use crate::applications::{Application, ApplicationId, ApplicationStatus, NewApplication};
use crate::identity::{
    ApplicantAccount, ApplicantId, NewApplicant, NewStaff, PurgeReport, StaffAccount, StaffId,
};
use crate::payments::{NewPayment, Payment, PaymentId, PaymentStatus};

#[derive(Default)]
struct Tables {
    applicants: BTreeMap<ApplicantId, ApplicantAccount>,
    staff: BTreeMap<StaffId, StaffAccount>,
    applications: BTreeMap<ApplicationId, Application>,
    payments: BTreeMap<PaymentId, Payment>,
    next_applicant: i64,
    next_staff: i64,
    next_application: i64,
    next_payment: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Process-local store. One mutex guards all tables, so every call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

/// Newest first by timestamp, ties broken by descending id.
fn newest_first<T, K: Ord + Copy>(
    mut rows: Vec<T>,
    key: impl Fn(&T) -> (DateTime<Utc>, K),
) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

impl AccountRepository for MemoryStore {
    fn insert_applicant(
        &self,
        account: NewApplicant,
    ) -> Result<ApplicantAccount, RepositoryError> {
        let mut tables = self.tables()?;
        if tables
            .applicants
            .values()
            .any(|existing| existing.email == account.email)
        {
            return Err(RepositoryError::Conflict);
        }

        let id = ApplicantId(next_id(&mut tables.next_applicant));
        let record = ApplicantAccount {
            id,
            first_name: account.first_name,
            middle_name: account.middle_name,
            last_name: account.last_name,
            email: account.email,
            phone: account.phone,
            password_hash: account.password_hash,
            is_active: true,
            created_at: account.created_at,
            updated_at: account.created_at,
        };
        tables.applicants.insert(id, record.clone());
        Ok(record)
    }

    fn applicant(&self, id: ApplicantId) -> Result<Option<ApplicantAccount>, RepositoryError> {
        Ok(self.tables()?.applicants.get(&id).cloned())
    }

    fn applicant_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ApplicantAccount>, RepositoryError> {
        Ok(self
            .tables()?
            .applicants
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    fn applicants(&self) -> Result<Vec<ApplicantAccount>, RepositoryError> {
        let rows = self.tables()?.applicants.values().cloned().collect();
        Ok(newest_first(rows, |account: &ApplicantAccount| {
            (account.created_at, account.id)
        }))
    }

    fn insert_staff(&self, account: NewStaff) -> Result<StaffAccount, RepositoryError> {
        let mut tables = self.tables()?;
        if tables
            .staff
            .values()
            .any(|existing| existing.email == account.email)
        {
            return Err(RepositoryError::Conflict);
        }

        let id = StaffId(next_id(&mut tables.next_staff));
        let record = StaffAccount {
            id,
            email: account.email,
            password_hash: account.password_hash,
            full_name: account.full_name,
            role: account.role,
            permissions: account.permissions,
            is_active: true,
            last_login: None,
            created_at: account.created_at,
            updated_at: account.created_at,
        };
        tables.staff.insert(id, record.clone());
        Ok(record)
    }

    fn staff(&self, id: StaffId) -> Result<Option<StaffAccount>, RepositoryError> {
        Ok(self.tables()?.staff.get(&id).cloned())
    }

    fn staff_by_email(&self, email: &str) -> Result<Option<StaffAccount>, RepositoryError> {
        Ok(self
            .tables()?
            .staff
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    fn record_staff_login(&self, id: StaffId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let account = tables.staff.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        account.last_login = Some(at);
        Ok(())
    }

    fn purge_applicants(&self) -> Result<PurgeReport, RepositoryError> {
        let mut tables = self.tables()?;
        let report = PurgeReport {
            payments: tables.payments.len(),
            applications: tables.applications.len(),
            applicants: tables.applicants.len(),
        };
        tables.payments.clear();
        tables.applications.clear();
        tables.applicants.clear();
        Ok(report)
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.applicants.contains_key(&application.applicant_id) {
            return Err(RepositoryError::NotFound);
        }

        let id = ApplicationId(next_id(&mut tables.next_application));
        let record = Application {
            id,
            applicant_id: application.applicant_id,
            student: application.student,
            father: application.father,
            mother: application.mother,
            guardian: application.guardian,
            status: ApplicationStatus::Pending,
            payment_required: true,
            payment_completed: false,
            submitted_at: application.submitted_at,
            updated_at: application.submitted_at,
        };
        tables.applications.insert(id, record.clone());
        Ok(record)
    }

    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.tables()?.applications.get(&id).cloned())
    }

    fn applications(&self, limit: Option<usize>) -> Result<Vec<Application>, RepositoryError> {
        let rows = self.tables()?.applications.values().cloned().collect();
        let mut rows = newest_first(rows, |application: &Application| {
            (application.submitted_at, application.id)
        });
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn outstanding_application(
        &self,
        applicant: ApplicantId,
    ) -> Result<Option<Application>, RepositoryError> {
        let rows = self
            .tables()?
            .applications
            .values()
            .filter(|application| {
                application.applicant_id == applicant && application.is_outstanding()
            })
            .cloned()
            .collect();
        Ok(newest_first(rows, |application: &Application| {
            (application.submitted_at, application.id)
        })
        .into_iter()
        .next())
    }

    fn update_application_status(
        &self,
        id: ApplicationId,
        expected: ApplicationStatus,
        next: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<Application, RepositoryError> {
        let mut tables = self.tables()?;
        let application = tables
            .applications
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        if application.status != expected {
            return Err(RepositoryError::Stale);
        }
        application.status = next;
        application.updated_at = at;
        Ok(application.clone())
    }
}

impl PaymentRepository for MemoryStore {
    fn insert_payment(&self, payment: NewPayment) -> Result<Payment, RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.applications.contains_key(&payment.application_id)
            || !tables.applicants.contains_key(&payment.applicant_id)
        {
            return Err(RepositoryError::NotFound);
        }
        if tables
            .payments
            .values()
            .any(|existing| existing.transaction_id == payment.transaction_id)
        {
            return Err(RepositoryError::Conflict);
        }

        let id = PaymentId(next_id(&mut tables.next_payment));
        let record = Payment {
            id,
            application_id: payment.application_id,
            applicant_id: payment.applicant_id,
            amount: payment.amount,
            payment_method: payment.payment_method,
            transaction_id: payment.transaction_id,
            phone_number: payment.phone_number,
            status: PaymentStatus::Pending,
            category: payment.category,
            created_at: payment.created_at,
            completed_at: None,
            notes: payment.notes,
        };
        tables.payments.insert(id, record.clone());
        Ok(record)
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.tables()?.payments.get(&id).cloned())
    }

    fn payments(&self) -> Result<Vec<Payment>, RepositoryError> {
        let rows = self.tables()?.payments.values().cloned().collect();
        Ok(newest_first(rows, |payment: &Payment| {
            (payment.created_at, payment.id)
        }))
    }

    fn payments_for_application(
        &self,
        id: ApplicationId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let rows = self
            .tables()?
            .payments
            .values()
            .filter(|payment| payment.application_id == id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |payment: &Payment| {
            (payment.created_at, payment.id)
        }))
    }

    fn update_payment_status(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        next: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Payment, RepositoryError> {
        let mut tables = self.tables()?;
        let Tables {
            payments,
            applications,
            ..
        } = &mut *tables;

        let payment = payments.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if payment.status != expected {
            return Err(RepositoryError::Stale);
        }

        if next == PaymentStatus::Completed {
            let application = applications
                .get_mut(&payment.application_id)
                .ok_or(RepositoryError::NotFound)?;
            application.payment_completed = true;
            application.updated_at = at;
            payment.completed_at = Some(at);
        }
        payment.status = next;
        Ok(payment.clone())
    }
}
