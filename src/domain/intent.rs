use super::amount::{Amount, Currency};
use super::run_config::CaptureMethod;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Payment,
    Setup,
    Refund,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionKind::Payment => "payment",
            TransactionKind::Setup => "setup",
            TransactionKind::Refund => "refund",
        })
    }
}

impl TransactionKind {
    /// Whether a status returned by collect lets the flow move on to confirm.
    pub fn accepts_collected(self, status: IntentStatus) -> bool {
        match self {
            TransactionKind::Setup => matches!(
                status,
                IntentStatus::RequiresConfirmation | IntentStatus::Succeeded
            ),
            TransactionKind::Payment | TransactionKind::Refund => !matches!(
                status,
                IntentStatus::Canceled | IntentStatus::Failed
            ),
        }
    }

    /// Whether a status returned by confirm or process counts as success.
    pub fn accepts_confirmed(self, status: IntentStatus) -> bool {
        match self {
            TransactionKind::Payment => matches!(
                status,
                IntentStatus::Succeeded | IntentStatus::RequiresCapture
            ),
            TransactionKind::Setup | TransactionKind::Refund => status == IntentStatus::Succeeded,
        }
    }
}

/// Lifecycle status of an intent. Not every kind uses every status:
/// refunds only move between `pending`, `succeeded`, `failed` and `canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Pending => "pending",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Failed => "failed",
            IntentStatus::Canceled => "canceled",
        })
    }
}

/// Card network reported for a collected payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Jcb,
    DinersClub,
    Interac,
    UnionPay,
    EftposAu,
    Unknown,
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CardBrand::Visa => "visa",
            CardBrand::Mastercard => "mastercard",
            CardBrand::Amex => "amex",
            CardBrand::Discover => "discover",
            CardBrand::Jcb => "jcb",
            CardBrand::DinersClub => "diners_club",
            CardBrand::Interac => "interac",
            CardBrand::UnionPay => "union_pay",
            CardBrand::EftposAu => "eftpos_au",
            CardBrand::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryMethod {
    #[default]
    ContactlessEmv,
    ContactEmv,
    MagneticStripe,
    ManualEntry,
    QrCode,
}

/// What the reader learned about the payment method it collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    /// `None` for non-card methods such as wallets paid by QR code.
    pub brand: Option<CardBrand>,
    #[serde(default)]
    pub entry_method: EntryMethod,
}

/// Present when an intent was created or collected while the reader was disconnected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineDetails {
    /// The intent still has to be forwarded to the backend once connectivity returns.
    pub requires_upload: bool,
}

/// Immutable snapshot of a remote-tracked transaction object.
///
/// Every stage of a run returns a new snapshot; nothing outside the run ever sees
/// a snapshot change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub kind: TransactionKind,
    /// Backend identifier. Intents created offline have none until they are uploaded.
    pub id: Option<String>,
    /// Identifier assigned by the reader to intents created offline.
    #[serde(default)]
    pub offline_id: Option<String>,
    pub amount: Amount,
    pub currency: Currency,
    pub status: IntentStatus,
    /// Payments only. `manual` payments stop at `requires_capture`.
    #[serde(default)]
    pub capture_method: Option<CaptureMethod>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethodDetails>,
    #[serde(default)]
    pub offline: Option<OfflineDetails>,
    #[serde(default)]
    pub amount_tip: Option<Decimal>,
}

impl TransactionIntent {
    /// Brand of the collected card, if a card was collected.
    pub fn card_brand(&self) -> Option<CardBrand> {
        self.payment_method.as_ref().and_then(|pm| pm.brand)
    }

    /// Offline intents that have not yet been uploaded to the backend.
    pub fn is_pending_upload(&self) -> bool {
        self.offline.as_ref().is_some_and(|o| o.requires_upload)
    }

    /// The best identifier available for reconciliation: offline id first, backend id second.
    pub fn reference(&self) -> Option<&str> {
        self.offline_id.as_deref().or(self.id.as_deref())
    }

    pub fn with_status(&self, status: IntentStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

impl fmt::Display for TransactionIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ({})",
            self.kind,
            self.reference().unwrap_or("<unidentified>"),
            self.amount,
            self.currency,
            self.status
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOptionType {
    Card,
    NonCard,
}

/// A way to pay offered by the reader when several are available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOption {
    pub option_type: PaymentOptionType,
    /// Snake-case method name such as `card`, `wechat_pay` or `affirm`.
    pub payment_method_type: String,
}

impl PaymentOption {
    /// Human readable label, e.g. `Wechat Pay (QR Code)`.
    pub fn label(&self) -> String {
        match self.option_type {
            PaymentOptionType::Card => "Card (Insert/Tap)".to_string(),
            PaymentOptionType::NonCard => {
                let name = self
                    .payment_method_type
                    .split('_')
                    .filter(|part| !part.is_empty())
                    .map(|part| {
                        let mut chars = part.chars();
                        match chars.next() {
                            Some(first) => first.to_uppercase().chain(chars).collect(),
                            None => String::new(),
                        }
                    })
                    .collect::<Vec<String>>()
                    .join(" ");
                format!("{name} (QR Code)")
            }
        }
    }
}

/// QR payload the reader asks the integration to show to the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCodeDisplayData {
    pub payment_method_type: String,
    pub image_url_png: Option<String>,
    #[serde(default)]
    pub image_url_svg: Option<String>,
    pub expires_at_ms: u64,
}

/// Non-payment data read by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectedData {
    Magstripe { id: Option<String> },
    NfcUid { uid: String },
}
