use super::intent::TransactionIntent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The step of a flow an audit event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Create,
    Collect,
    Confirm,
    Process,
    Capture,
    Cancel,
    /// The decline policy sent the flow back to `create`.
    Restart,
    CancelRequested,
    Receipt,
    PaymentMethodSelection,
    QrCodeDisplay,
    CollectData,
    RetrieveCollectedData,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Create => "create",
            Stage::Collect => "collect",
            Stage::Confirm => "confirm",
            Stage::Process => "process",
            Stage::Capture => "capture",
            Stage::Cancel => "cancel",
            Stage::Restart => "restart",
            Stage::CancelRequested => "cancel_requested",
            Stage::Receipt => "receipt",
            Stage::PaymentMethodSelection => "payment_method_selection",
            Stage::QrCodeDisplay => "qr_code_display",
            Stage::CollectData => "collect_data",
            Stage::RetrieveCollectedData => "retrieve_collected_data",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Succeeded,
    Errored,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Pending => "pending",
            Outcome::Succeeded => "succeeded",
            Outcome::Errored => "errored",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Intent(Box<TransactionIntent>),
    Error(String),
    Note(String),
    Json(serde_json::Value),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Intent(intent) => fmt::Display::fmt(intent, f),
            Payload::Error(message) | Payload::Note(message) => f.write_str(message),
            Payload::Json(value) => fmt::Display::fmt(value, f),
        }
    }
}

/// One entry of the audit trail. Built complete at the point the outcome is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub stage: Stage,
    pub outcome: Outcome,
    pub payload: Option<Payload>,
}

impl AuditEvent {
    pub fn pending(stage: Stage) -> Self {
        Self {
            stage,
            outcome: Outcome::Pending,
            payload: None,
        }
    }

    pub fn succeeded(stage: Stage, intent: &TransactionIntent) -> Self {
        Self {
            stage,
            outcome: Outcome::Succeeded,
            payload: Some(Payload::Intent(Box::new(intent.clone()))),
        }
    }

    pub fn errored(stage: Stage, error: impl fmt::Display) -> Self {
        Self {
            stage,
            outcome: Outcome::Errored,
            payload: Some(Payload::Error(error.to_string())),
        }
    }

    /// An errored event that carries the offending intent instead of an error message.
    pub fn rejected(stage: Stage, intent: &TransactionIntent) -> Self {
        Self {
            stage,
            outcome: Outcome::Errored,
            payload: Some(Payload::Intent(Box::new(intent.clone()))),
        }
    }

    pub fn note(stage: Stage, outcome: Outcome, note: impl Into<String>) -> Self {
        Self {
            stage,
            outcome,
            payload: Some(Payload::Note(note.into())),
        }
    }

    pub fn intent(&self) -> Option<&TransactionIntent> {
        match &self.payload {
            Some(Payload::Intent(intent)) => Some(intent.as_ref()),
            _ => None,
        }
    }
}

/// Append-only, ordered audit trail shared between a run and its host.
///
/// Cloning shares the same underlying sequence; appends from several producers are
/// serialized.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: AuditEvent) {
        tracing::debug!(stage = %event.stage, outcome = %event.outcome, "audit event");
        self.lock().push(event);
    }

    /// A copy of every event appended so far, in append order.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written event behind.
    fn lock(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
