use super::domain::Payment;

/// Result reported by a payment processor for one charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorOutcome {
    Completed,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("payment processor unavailable: {0}")]
pub struct ProcessorError(pub String);

/// Seam for a mobile-money or card gateway.
pub trait PaymentProcessor: Send + Sync {
    fn charge(&self, payment: &Payment) -> Result<ProcessorOutcome, ProcessorError>;
}

/// Stand-in gateway that accepts every charge.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedProcessor;

impl PaymentProcessor for SimulatedProcessor {
    fn charge(&self, payment: &Payment) -> Result<ProcessorOutcome, ProcessorError> {
        tracing::debug!(
            transaction_id = %payment.transaction_id,
            amount = %payment.amount,
            "simulated charge accepted"
        );
        Ok(ProcessorOutcome::Completed)
    }
}
