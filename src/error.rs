use crate::domain::audit::Stage;
use crate::domain::intent::{CardBrand, IntentStatus, TransactionIntent};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failure reported by a remote collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The operation was canceled, either by the customer on the reader or by the integration.
    Canceled,
    /// The card or payment method was declined by the issuer.
    Declined,
    Network,
    Api,
    /// The transaction could not be handled while disconnected.
    OfflineNotAllowed,
    Unexpected,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorKind::Canceled => "canceled",
            RemoteErrorKind::Declined => "declined",
            RemoteErrorKind::Network => "network",
            RemoteErrorKind::Api => "api",
            RemoteErrorKind::OfflineNotAllowed => "offline_not_allowed",
            RemoteErrorKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// A failure returned by the terminal or the backend.
///
/// Confirm and process failures may carry the partially processed intent so that a
/// receipt can still be produced for it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} error: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
    pub intent: Option<Box<TransactionIntent>>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            intent: None,
        }
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Canceled, message)
    }

    /// Attaches the intent the remote side had produced before failing.
    pub fn with_intent(mut self, intent: TransactionIntent) -> Self {
        self.intent = Some(Box::new(intent));
        self
    }

    pub fn is_canceled(&self) -> bool {
        self.kind == RemoteErrorKind::Canceled
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Payment method rejected: card brand {brand} is not accepted")]
    PolicyRejection { brand: CardBrand },
    #[error("Unexpected status {status} after {stage}")]
    UnexpectedStatus { stage: Stage, status: IntentStatus },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("A run is already active on this orchestrator")]
    RunInProgress,
    #[error("Contract violation: {0}")]
    ContractViolation(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl FlowError {
    /// The remote error behind this failure, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            FlowError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for FlowError {
    fn from(err: rocksdb::Error) -> Self {
        FlowError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
