use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::applications::ApplicationId;
use crate::error::UnknownLabel;
use crate::identity::ApplicantId;

/// Identifier wrapper for recorded payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub i64);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Money with two decimal places, held as minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(100))
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a non-negative amount with at most two decimal places")]
pub struct InvalidAmount(pub String);

impl FromStr for Amount {
    type Err = InvalidAmount;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidAmount(raw.to_string());
        let trimmed = raw.trim();
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let major: i64 = whole.parse().map_err(|_| invalid())?;
        let minor: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        major
            .checked_mul(100)
            .and_then(|value| value.checked_add(minor))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

/// Ledger status of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// `pending → completed | failed | refunded`, `completed → refunded`.
    pub fn apply(self, action: PaymentAction) -> Result<PaymentStatus, InvalidTransition> {
        match (self, action) {
            (PaymentStatus::Pending, PaymentAction::Complete) => Ok(PaymentStatus::Completed),
            (PaymentStatus::Pending, PaymentAction::Fail) => Ok(PaymentStatus::Failed),
            (PaymentStatus::Pending | PaymentStatus::Completed, PaymentAction::Refund) => {
                Ok(PaymentStatus::Refunded)
            }
            (from, action) => Err(InvalidTransition { from, action }),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownLabel::new("payment status", other)),
        }
    }
}

/// Staff-driven (or processor-driven) change requested for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    Complete,
    Refund,
    Fail,
}

impl PaymentAction {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentAction::Complete => "complete",
            PaymentAction::Refund => "refund",
            PaymentAction::Fail => "fail",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            PaymentAction::Complete => "completed",
            PaymentAction::Refund => "refunded",
            PaymentAction::Fail => "failed",
        }
    }
}

impl FromStr for PaymentAction {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "complete" => Ok(PaymentAction::Complete),
            "refund" => Ok(PaymentAction::Refund),
            "fail" => Ok(PaymentAction::Fail),
            other => Err(UnknownLabel::new("payment action", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {} a {} payment", .action.label(), .from.label())]
pub struct InvalidTransition {
    pub from: PaymentStatus,
    pub action: PaymentAction,
}

/// What a payment was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentCategory {
    #[serde(rename = "application")]
    ApplicationFee,
    Fees,
    Meals,
    Transport,
    Unknown,
}

impl PaymentCategory {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentCategory::ApplicationFee => "application",
            PaymentCategory::Fees => "fees",
            PaymentCategory::Meals => "meals",
            PaymentCategory::Transport => "transport",
            PaymentCategory::Unknown => "unknown",
        }
    }
}

impl FromStr for PaymentCategory {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "application" => Ok(PaymentCategory::ApplicationFee),
            "fees" => Ok(PaymentCategory::Fees),
            "meals" => Ok(PaymentCategory::Meals),
            "transport" => Ok(PaymentCategory::Transport),
            "unknown" => Ok(PaymentCategory::Unknown),
            other => Err(UnknownLabel::new("payment category", other)),
        }
    }
}

/// Persisted payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub application_id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub amount: Amount,
    pub payment_method: String,
    pub transaction_id: String,
    pub phone_number: String,
    pub status: PaymentStatus,
    /// Rows written before categories were stored carry `None`.
    pub category: Option<PaymentCategory>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Payment row prior to insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub application_id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub amount: Amount,
    pub payment_method: String,
    pub transaction_id: String,
    pub phone_number: String,
    pub category: Option<PaymentCategory>,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// `TXN_` followed by eight upper-case hex characters.
pub fn generate_transaction_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("TXN_{}", hex[..8].to_ascii_uppercase())
}
