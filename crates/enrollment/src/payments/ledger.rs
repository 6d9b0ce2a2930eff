use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::domain::{
    generate_transaction_id, Amount, InvalidTransition, NewPayment, Payment, PaymentAction,
    PaymentCategory, PaymentId, PaymentStatus,
};
use super::fees::{FeeSchedule, Till};
use super::processor::{PaymentProcessor, ProcessorError, ProcessorOutcome};
use crate::applications::{Application, ApplicationId};
use crate::identity::{authorize, AccessDenied, ApplicantAccount, Permission, StaffAccount};
use crate::store::{ApplicationRepository, PaymentRepository, RepositoryError};

/// Method and phone posted with a payment.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct PaymentRequest {
    pub payment_method: String,
    pub phone_number: String,
}

/// What an applicant sees on the payment page.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInstructions {
    pub application_id: ApplicationId,
    pub student_name: String,
    pub amount: Amount,
    pub till: Till,
    pub alternatives: Vec<Till>,
    pub paid: bool,
    pub payments: Vec<Payment>,
}

/// Outcome of an applicant-initiated payment.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedPayment {
    pub payment: Payment,
    pub paid: bool,
}

/// Payment row for the staff listing, with its resolved category.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentEntry {
    pub payment: Payment,
    pub category: PaymentCategory,
    pub student_name: Option<String>,
}

/// Revenue from completed payments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevenueSummary {
    pub completed_payments: usize,
    pub total: Amount,
    pub by_category: BTreeMap<PaymentCategory, Amount>,
}

/// Records payment attempts and drives their status transitions.
pub struct PaymentLedger<S, P> {
    store: Arc<S>,
    processor: Arc<P>,
    fees: FeeSchedule,
}

impl<S, P> PaymentLedger<S, P>
where
    S: ApplicationRepository + PaymentRepository + 'static,
    P: PaymentProcessor + 'static,
{
    pub fn new(store: Arc<S>, processor: Arc<P>, fees: FeeSchedule) -> Self {
        Self {
            store,
            processor,
            fees,
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Stored category first; rows written before categories were recorded fall back to
    /// matching the amount against the fee schedule.
    pub fn effective_category(&self, payment: &Payment) -> PaymentCategory {
        payment
            .category
            .unwrap_or_else(|| self.fees.categorize(payment.amount))
    }

    fn owned_application(
        &self,
        applicant: &ApplicantAccount,
        id: ApplicationId,
    ) -> Result<(Application, Vec<Payment>), LedgerError> {
        let application = self
            .store
            .application(id)?
            .ok_or(LedgerError::NotFound)?;
        if application.applicant_id != applicant.id {
            tracing::warn!(
                application_id = %id,
                applicant_id = %applicant.id,
                "payment access to another applicant's application"
            );
            return Err(LedgerError::Unauthorized);
        }
        let payments = self.store.payments_for_application(id)?;
        Ok((application, payments))
    }

    pub fn instructions(
        &self,
        applicant: &ApplicantAccount,
        id: ApplicationId,
    ) -> Result<PaymentInstructions, LedgerError> {
        let (application, payments) = self.owned_application(applicant, id)?;
        let till = self.fees.application_till();
        let alternatives = self
            .fees
            .tills(PaymentCategory::ApplicationFee)
            .iter()
            .filter(|candidate| **candidate != till)
            .cloned()
            .collect();

        Ok(PaymentInstructions {
            application_id: application.id,
            student_name: application.student_name(),
            amount: self.fees.application_fee,
            till,
            alternatives,
            paid: application.is_paid(&payments),
            payments,
        })
    }

    /// Records a pending application-fee payment.
    pub fn initiate(
        &self,
        applicant: &ApplicantAccount,
        id: ApplicationId,
        request: &PaymentRequest,
    ) -> Result<Payment, LedgerError> {
        let (application, payments) = self.owned_application(applicant, id)?;
        if application.is_paid(&payments) {
            return Err(LedgerError::AlreadyCompleted);
        }

        let payment_method = request.payment_method.trim();
        let phone_number = request.phone_number.trim();
        if payment_method.is_empty() || phone_number.is_empty() {
            return Err(LedgerError::Validation(
                "payment method and phone number are required".to_string(),
            ));
        }

        let payment = self.store.insert_payment(NewPayment {
            application_id: application.id,
            applicant_id: applicant.id,
            amount: self.fees.application_fee,
            payment_method: payment_method.to_string(),
            transaction_id: generate_transaction_id(),
            phone_number: phone_number.to_string(),
            category: Some(PaymentCategory::ApplicationFee),
            created_at: Utc::now(),
            notes: None,
        })?;
        tracing::info!(
            payment_id = %payment.id,
            application_id = %application.id,
            transaction_id = %payment.transaction_id,
            "payment initiated"
        );
        Ok(payment)
    }

    /// Initiates a payment and settles it through the processor.
    pub fn process(
        &self,
        applicant: &ApplicantAccount,
        id: ApplicationId,
        request: &PaymentRequest,
    ) -> Result<ProcessedPayment, LedgerError> {
        let payment = self.initiate(applicant, id, request)?;

        let outcome = match self.processor.charge(&payment) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(payment_id = %payment.id, error = %err, "processor failed");
                self.transition(payment.id, PaymentAction::Fail)?;
                return Err(err.into());
            }
        };

        let payment = match outcome {
            ProcessorOutcome::Completed => self.transition(payment.id, PaymentAction::Complete)?,
            ProcessorOutcome::Failed { reason } => {
                tracing::warn!(payment_id = %payment.id, %reason, "payment declined");
                self.transition(payment.id, PaymentAction::Fail)?
            }
        };

        Ok(ProcessedPayment {
            paid: payment.status == PaymentStatus::Completed,
            payment,
        })
    }

    /// Staff-driven completion, refund or failure of a payment.
    pub fn apply(
        &self,
        staff: &StaffAccount,
        id: PaymentId,
        action: PaymentAction,
    ) -> Result<Payment, LedgerError> {
        authorize(staff, Permission::ManagePayments)?;
        let payment = self.transition(id, action)?;
        tracing::info!(
            payment_id = %id,
            staff_id = %staff.id,
            status = payment.status.label(),
            "payment {}",
            action.past_tense()
        );
        Ok(payment)
    }

    fn transition(&self, id: PaymentId, action: PaymentAction) -> Result<Payment, LedgerError> {
        let current = self.store.payment(id)?.ok_or(LedgerError::NotFound)?;
        let next = current.status.apply(action)?;

        match self
            .store
            .update_payment_status(id, current.status, next, Utc::now())
        {
            Ok(payment) => Ok(payment),
            Err(RepositoryError::Stale) => {
                let from = self
                    .store
                    .payment(id)?
                    .map(|payment| payment.status)
                    .unwrap_or(current.status);
                Err(LedgerError::InvalidTransition(InvalidTransition { from, action }))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Every payment, newest first, with its category and student.
    pub fn list(&self, staff: &StaffAccount) -> Result<Vec<PaymentEntry>, LedgerError> {
        authorize(staff, Permission::ViewPayments)?;
        let students: HashMap<ApplicationId, String> = self
            .store
            .applications(None)?
            .into_iter()
            .map(|application| (application.id, application.student_name()))
            .collect();

        let entries = self
            .store
            .payments()?
            .into_iter()
            .map(|payment| PaymentEntry {
                category: self.effective_category(&payment),
                student_name: students.get(&payment.application_id).cloned(),
                payment,
            })
            .collect();
        Ok(entries)
    }

    pub fn revenue(&self) -> Result<RevenueSummary, LedgerError> {
        let mut summary = RevenueSummary::default();
        for payment in self.store.payments()? {
            if payment.status != PaymentStatus::Completed {
                continue;
            }
            summary.completed_payments += 1;
            summary.total = summary.total.saturating_add(payment.amount);
            let slot = summary
                .by_category
                .entry(self.effective_category(&payment))
                .or_default();
            *slot = slot.saturating_add(payment.amount);
        }
        Ok(summary)
    }

    /// Tills for the school-fee categories shown on `/payments/<category>`.
    pub fn category_tills(&self, category: PaymentCategory) -> Result<&[Till], LedgerError> {
        match category {
            PaymentCategory::Fees | PaymentCategory::Meals | PaymentCategory::Transport => {
                Ok(self.fees.tills(category))
            }
            _ => Err(LedgerError::NotFound),
        }
    }
}

/// Error raised by the payment ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("payment or application not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("payment already completed for this application")]
    AlreadyCompleted,
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{new_applicant, new_application, new_payment, new_staff};
    use crate::identity::{PermissionSet, StaffRole};
    use crate::store::{AccountRepository, MemoryStore};
    use crate::payments::SimulatedProcessor;

    struct Declining;

    impl PaymentProcessor for Declining {
        fn charge(&self, _payment: &Payment) -> Result<ProcessorOutcome, ProcessorError> {
            Ok(ProcessorOutcome::Failed {
                reason: "insufficient balance".to_string(),
            })
        }
    }

    struct Offline;

    impl PaymentProcessor for Offline {
        fn charge(&self, _payment: &Payment) -> Result<ProcessorOutcome, ProcessorError> {
            Err(ProcessorError("gateway timeout".to_string()))
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            payment_method: "M-Pesa".to_string(),
            phone_number: "0712000000".to_string(),
        }
    }

    fn setup<P: PaymentProcessor + 'static>(
        processor: P,
    ) -> (
        Arc<MemoryStore>,
        PaymentLedger<MemoryStore, P>,
        ApplicantAccount,
        ApplicationId,
    ) {
        let store = Arc::new(MemoryStore::new());
        let applicant = store
            .insert_applicant(new_applicant("asha@example.com"))
            .expect("applicant");
        let application = store
            .insert_application(new_application(applicant.id, 0))
            .expect("application");
        let ledger = PaymentLedger::new(store.clone(), Arc::new(processor), FeeSchedule::default());
        (store, ledger, applicant, application.id)
    }

    fn staff(store: &MemoryStore, permissions: PermissionSet) -> StaffAccount {
        store
            .insert_staff(new_staff("finance@satellite.ac.tz", StaffRole::Admin, permissions))
            .expect("staff")
    }

    #[test]
    fn processing_completes_payment_and_application_fee() {
        let (store, ledger, applicant, id) = setup(SimulatedProcessor);

        let processed = ledger.process(&applicant, id, &request()).expect("processed");
        assert!(processed.paid);
        assert_eq!(processed.payment.status, PaymentStatus::Completed);
        assert_eq!(processed.payment.amount, Amount::from_major(10_000));
        assert_eq!(
            processed.payment.category,
            Some(PaymentCategory::ApplicationFee)
        );

        let application = store.application(id).expect("fetch").expect("present");
        assert!(application.payment_completed);
        assert_eq!(
            application.status,
            crate::applications::ApplicationStatus::Pending
        );

        assert!(matches!(
            ledger.initiate(&applicant, id, &request()),
            Err(LedgerError::AlreadyCompleted)
        ));
    }

    #[test]
    fn declined_and_failed_charges_leave_the_fee_unpaid() {
        let (store, ledger, applicant, id) = setup(Declining);
        let processed = ledger.process(&applicant, id, &request()).expect("processed");
        assert!(!processed.paid);
        assert_eq!(processed.payment.status, PaymentStatus::Failed);

        let (store_offline, offline, applicant_offline, id_offline) = setup(Offline);
        assert!(matches!(
            offline.process(&applicant_offline, id_offline, &request()),
            Err(LedgerError::Processor(_))
        ));
        let payments = store_offline
            .payments_for_application(id_offline)
            .expect("list");
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);

        assert!(!store.application(id).expect("fetch").expect("present").payment_completed);
    }

    #[test]
    fn applicants_cannot_pay_for_someone_else() {
        let (store, ledger, _, id) = setup(SimulatedProcessor);
        let stranger = store
            .insert_applicant(new_applicant("stranger@example.com"))
            .expect("stranger");

        assert!(matches!(
            ledger.instructions(&stranger, id),
            Err(LedgerError::Unauthorized)
        ));
        assert!(matches!(
            ledger.process(&stranger, id, &request()),
            Err(LedgerError::Unauthorized)
        ));
        assert!(matches!(
            ledger.instructions(&stranger, ApplicationId(404)),
            Err(LedgerError::NotFound)
        ));
        assert!(store.payments().expect("list").is_empty());
    }

    #[test]
    fn method_and_phone_are_required() {
        let (_, ledger, applicant, id) = setup(SimulatedProcessor);
        let blank = PaymentRequest {
            payment_method: " ".to_string(),
            phone_number: "0712000000".to_string(),
        };
        assert!(matches!(
            ledger.initiate(&applicant, id, &blank),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn staff_transitions_follow_the_state_machine() {
        let (store, ledger, applicant, id) = setup(SimulatedProcessor);
        let clerk = staff(&store, PermissionSet::granted([Permission::ViewPayments]));
        let payment = ledger.initiate(&applicant, id, &request()).expect("initiated");

        assert!(matches!(
            ledger.apply(&clerk, payment.id, PaymentAction::Complete),
            Err(LedgerError::AccessDenied(AccessDenied::MissingPermission(
                Permission::ManagePayments
            )))
        ));

        let manager = store
            .insert_staff(new_staff(
                "bursar@satellite.ac.tz",
                StaffRole::Admin,
                PermissionSet::granted([Permission::ManagePayments]),
            ))
            .expect("manager");
        let completed = ledger
            .apply(&manager, payment.id, PaymentAction::Complete)
            .expect("complete");
        assert_eq!(completed.status, PaymentStatus::Completed);
        assert!(completed.completed_at.is_some());

        assert!(matches!(
            ledger.apply(&manager, payment.id, PaymentAction::Fail),
            Err(LedgerError::InvalidTransition(_))
        ));

        let refunded = ledger
            .apply(&manager, payment.id, PaymentAction::Refund)
            .expect("refund");
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert!(store.application(id).expect("fetch").expect("present").payment_completed);
    }

    #[test]
    fn listing_uses_stored_category_before_the_amount_heuristic() {
        let (store, ledger, applicant, id) = setup(SimulatedProcessor);
        let viewer = staff(&store, PermissionSet::granted([Permission::ViewPayments]));

        // Legacy row: no stored category, amount matches the meals tills.
        store
            .insert_payment(new_payment(
                id,
                applicant.id,
                Amount::from_major(50_000),
                None,
                1,
            ))
            .expect("legacy");
        // Same amount, explicitly recorded as transport.
        store
            .insert_payment(new_payment(
                id,
                applicant.id,
                Amount::from_major(50_000),
                Some(PaymentCategory::Transport),
                2,
            ))
            .expect("categorized");

        let entries = ledger.list(&viewer).expect("list");
        let categories: Vec<_> = entries.iter().map(|entry| entry.category).collect();
        assert_eq!(
            categories,
            vec![PaymentCategory::Transport, PaymentCategory::Meals]
        );
        assert_eq!(entries[0].student_name.as_deref(), Some("Neema Grace Mushi"));
    }

    #[test]
    fn revenue_counts_completed_payments_only() {
        let (store, ledger, applicant, id) = setup(SimulatedProcessor);
        ledger.process(&applicant, id, &request()).expect("processed");
        store
            .insert_payment(new_payment(
                id,
                applicant.id,
                Amount::from_major(150_000),
                Some(PaymentCategory::Fees),
                5,
            ))
            .expect("pending fees");

        let summary = ledger.revenue().expect("revenue");
        assert_eq!(summary.completed_payments, 1);
        assert_eq!(summary.total, Amount::from_major(10_000));
        assert_eq!(
            summary.by_category.get(&PaymentCategory::ApplicationFee),
            Some(&Amount::from_major(10_000))
        );
        assert!(ledger.category_tills(PaymentCategory::Meals).is_ok());
        assert!(matches!(
            ledger.category_tills(PaymentCategory::ApplicationFee),
            Err(LedgerError::NotFound)
        ));
    }
}
