//! Payment records, the fee schedule and the ledger that settles application fees.

pub mod domain;
pub mod fees;
pub mod ledger;
pub mod processor;
pub mod router;

pub use domain::{
    generate_transaction_id, Amount, InvalidAmount, InvalidTransition, NewPayment, Payment,
    PaymentAction, PaymentCategory, PaymentId, PaymentStatus,
};
pub use fees::{FeeSchedule, Till};
pub use ledger::{
    LedgerError, PaymentEntry, PaymentInstructions, PaymentLedger, PaymentRequest,
    ProcessedPayment, RevenueSummary,
};
pub use processor::{PaymentProcessor, ProcessorError, ProcessorOutcome, SimulatedProcessor};
pub use router::payment_router;
