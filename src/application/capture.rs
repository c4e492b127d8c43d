use crate::domain::audit::{AuditEvent, AuditLog, Outcome, Stage};
use crate::domain::intent::TransactionIntent;
use crate::domain::offline::OfflineRecord;
use crate::domain::ports::{BackendClientArc, CaptureParams, OfflineLogStoreArc};
use crate::error::{FlowError, Result};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Captured { amount: Decimal },
    /// Authorized offline; written to the offline log instead of being captured.
    StoredOffline { reference: String },
}

/// Finalizes intents that stopped at `requires_capture`.
#[derive(Clone)]
pub struct CaptureCoordinator {
    backend: BackendClientArc,
    offline_log: OfflineLogStoreArc,
}

impl CaptureCoordinator {
    pub fn new(backend: BackendClientArc, offline_log: OfflineLogStoreArc) -> Self {
        Self {
            backend,
            offline_log,
        }
    }

    /// Captures `intent` online, or records it for later upload when it was authorized
    /// offline.
    ///
    /// An online intent without a backend id is a [`FlowError::ContractViolation`]: the
    /// caller must abort instead of cleaning up.
    pub async fn capture(
        &self,
        intent: &TransactionIntent,
        tip: Decimal,
        audit: &AuditLog,
    ) -> Result<CaptureOutcome> {
        if intent.is_pending_upload() {
            let record = OfflineRecord::new(intent);
            let reference = record.reference.clone();
            if let Err(e) = self.offline_log.append(record).await {
                warn!(reference = %reference, error = %e, "failed to store offline intent");
                audit.append(AuditEvent::errored(Stage::Capture, &e));
                return Err(e);
            }
            info!(reference = %reference, "offline intent stored for later upload");
            audit.append(AuditEvent::note(
                Stage::Capture,
                Outcome::Succeeded,
                format!("Offline {} {reference} saved to the offline log", intent.kind),
            ));
            return Ok(CaptureOutcome::StoredOffline { reference });
        }

        let Some(intent_id) = intent.id.as_deref() else {
            error!(intent = %intent, "online intent reached capture without an id");
            return Err(FlowError::ContractViolation(format!(
                "online intent reached capture without an id: {intent}"
            )));
        };

        let Some(amount_to_capture) = intent.amount.checked_add(tip) else {
            warn!(intent_id, %tip, "capture amount overflows");
            let err = FlowError::ValidationError(format!(
                "capture amount {} + tip {tip} is too large",
                intent.amount
            ));
            audit.append(AuditEvent::errored(Stage::Capture, &err));
            return Err(err);
        };

        audit.append(AuditEvent::pending(Stage::Capture));
        let params = CaptureParams { amount_to_capture };
        match self.backend.capture(intent_id, &params).await {
            Ok(()) => {
                info!(intent_id, amount = %params.amount_to_capture, "intent captured");
                audit.append(AuditEvent::note(
                    Stage::Capture,
                    Outcome::Succeeded,
                    format!(
                        "Captured {} {} on {intent_id}",
                        params.amount_to_capture, intent.currency
                    ),
                ));
                Ok(CaptureOutcome::Captured {
                    amount: params.amount_to_capture,
                })
            }
            Err(e) => {
                warn!(intent_id, error = %e, "capture failed");
                audit.append(AuditEvent::errored(Stage::Capture, &e));
                Err(e.into())
            }
        }
    }
}
