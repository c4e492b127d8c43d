use super::amount::{Amount, Currency};
use super::intent::TransactionKind;
use super::run_config::{AllowRedisplay, CaptureMethod};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentParameters {
    pub amount: Amount,
    pub currency: Currency,
    #[serde(default)]
    pub capture_method: CaptureMethod,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
}

/// Saving a payment method for later does not move money, but the terminal still
/// needs an amount and currency to drive the reader display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupParameters {
    pub amount: Amount,
    pub currency: Currency,
    #[serde(default)]
    pub allow_redisplay: AllowRedisplay,
    #[serde(default)]
    pub customer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundParameters {
    pub charge_id: String,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    pub amount: Amount,
    pub currency: Currency,
}

/// Input of a run. Supplied once at start and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionParameters {
    Payment(PaymentParameters),
    Setup(SetupParameters),
    Refund(RefundParameters),
}

impl TransactionParameters {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionParameters::Payment(_) => TransactionKind::Payment,
            TransactionParameters::Setup(_) => TransactionKind::Setup,
            TransactionParameters::Refund(_) => TransactionKind::Refund,
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            TransactionParameters::Payment(p) => p.amount,
            TransactionParameters::Setup(p) => p.amount,
            TransactionParameters::Refund(p) => p.amount,
        }
    }

    pub fn currency(&self) -> &Currency {
        match self {
            TransactionParameters::Payment(p) => &p.currency,
            TransactionParameters::Setup(p) => &p.currency,
            TransactionParameters::Refund(p) => &p.currency,
        }
    }

    /// Only payments can end in `requires_capture`.
    pub fn capture_method(&self) -> Option<CaptureMethod> {
        match self {
            TransactionParameters::Payment(p) => Some(p.capture_method),
            _ => None,
        }
    }
}
