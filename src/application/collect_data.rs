use crate::domain::audit::{AuditEvent, AuditLog, Outcome, Payload, Stage};
use crate::domain::cancellation::CancellationToken;
use crate::domain::intent::CollectedData;
use crate::domain::ports::{BackendClientArc, TerminalClientArc};
use crate::domain::run_config::CollectDataConfig;
use crate::error::{RemoteError, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CollectDataOutcome {
    pub data: CollectedData,
    /// Stored magstripe data fetched from the backend, when retrieval was requested
    /// and succeeded.
    pub retrieved: Option<serde_json::Value>,
}

/// Reads non-payment data (a magstripe swipe or an NFC tag UID) from the reader.
pub struct CollectDataFlow {
    terminal: TerminalClientArc,
    backend: BackendClientArc,
    audit: AuditLog,
}

impl CollectDataFlow {
    pub fn new(terminal: TerminalClientArc, backend: BackendClientArc, audit: AuditLog) -> Self {
        Self {
            terminal,
            backend,
            audit,
        }
    }

    pub async fn run(
        &self,
        config: &CollectDataConfig,
        token: &CancellationToken,
    ) -> Result<CollectDataOutcome> {
        if token.is_cancelled() {
            return Err(RemoteError::canceled("collect data canceled before it started").into());
        }

        self.audit.append(AuditEvent::pending(Stage::CollectData));
        let data = match self.terminal.collect_data(config, token).await {
            Ok(data) => data,
            Err(e) => {
                warn!(kind = %e.kind, error = %e, "collect data failed");
                self.audit.append(AuditEvent::errored(Stage::CollectData, &e));
                return Err(e.into());
            }
        };
        info!(data_type = ?config.data_type, "data collected");
        self.audit.append(AuditEvent {
            stage: Stage::CollectData,
            outcome: Outcome::Succeeded,
            payload: Some(Payload::Json(serde_json::to_value(&data)?)),
        });

        let retrieved = match &data {
            CollectedData::Magstripe { id: Some(id) } if config.retrieve => self.retrieve(id).await,
            _ => None,
        };
        Ok(CollectDataOutcome { data, retrieved })
    }

    /// Retrieval runs after the reader is done; its failure does not fail the flow.
    async fn retrieve(&self, id: &str) -> Option<serde_json::Value> {
        self.audit
            .append(AuditEvent::pending(Stage::RetrieveCollectedData));
        match self.backend.retrieve_collected_data(id).await {
            Ok(value) => {
                self.audit.append(AuditEvent {
                    stage: Stage::RetrieveCollectedData,
                    outcome: Outcome::Succeeded,
                    payload: Some(Payload::Json(value.clone())),
                });
                Some(value)
            }
            Err(e) => {
                warn!(id, error = %e, "failed to retrieve collected data");
                self.audit
                    .append(AuditEvent::errored(Stage::RetrieveCollectedData, &e));
                None
            }
        }
    }
}
