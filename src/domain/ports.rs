use super::cancellation::CancellationToken;
use super::intent::{CollectedData, PaymentOption, QrCodeDisplayData, TransactionIntent};
use super::offline::OfflineRecord;
use super::parameters::TransactionParameters;
use super::run_config::{CollectConfig, CollectDataConfig, ConfirmConfig, OfflineBehavior};
use crate::error::{RemoteError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The payment terminal: every operation that talks to the reader or, through the reader
/// SDK, to the payments backend.
///
/// Cancelable operations receive the run's token; an implementation that observes it
/// should fail with a [`RemoteErrorKind::Canceled`](crate::error::RemoteErrorKind) error.
#[async_trait]
pub trait TerminalClient: Send + Sync {
    async fn create(
        &self,
        params: &TransactionParameters,
        offline_behavior: OfflineBehavior,
    ) -> std::result::Result<TransactionIntent, RemoteError>;

    async fn collect(
        &self,
        intent: &TransactionIntent,
        config: &CollectConfig,
        delegate: &dyn FlowDelegate,
        token: &CancellationToken,
    ) -> std::result::Result<TransactionIntent, RemoteError>;

    async fn confirm(
        &self,
        intent: &TransactionIntent,
        config: &ConfirmConfig,
        delegate: &dyn FlowDelegate,
    ) -> std::result::Result<TransactionIntent, RemoteError>;

    /// Collect and confirm in a single call.
    async fn process(
        &self,
        intent: &TransactionIntent,
        collect: &CollectConfig,
        confirm: &ConfirmConfig,
        delegate: &dyn FlowDelegate,
        token: &CancellationToken,
    ) -> std::result::Result<TransactionIntent, RemoteError>;

    async fn cancel(
        &self,
        intent: &TransactionIntent,
    ) -> std::result::Result<TransactionIntent, RemoteError>;

    async fn collect_data(
        &self,
        config: &CollectDataConfig,
        token: &CancellationToken,
    ) -> std::result::Result<CollectedData, RemoteError>;
}

/// Extra parameters sent along with an online capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureParams {
    pub amount_to_capture: Decimal,
}

/// Out-of-band calls to the integration's own backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn capture(
        &self,
        intent_id: &str,
        params: &CaptureParams,
    ) -> std::result::Result<(), RemoteError>;

    async fn retrieve_collected_data(
        &self,
        id: &str,
    ) -> std::result::Result<serde_json::Value, RemoteError>;
}

/// Durable, append-only log of offline transactions awaiting reconciliation.
#[async_trait]
pub trait OfflineLogStore: Send + Sync {
    async fn append(&self, record: OfflineRecord) -> Result<()>;
    async fn records(&self) -> Result<Vec<OfflineRecord>>;
}

/// Synchronous decisions the terminal may request in the middle of a remote call.
pub trait FlowDelegate: Send + Sync {
    /// Picks one of the payment options offered by the reader. `None` declines the choice.
    fn select_payment_option(
        &self,
        intent: &TransactionIntent,
        options: &[PaymentOption],
    ) -> Option<PaymentOption>;

    /// Shows a QR payload to the customer. Returns whether it was displayed.
    fn display_qr_code(&self, intent: &TransactionIntent, qr: &QrCodeDisplayData) -> bool;
}

pub type TerminalClientArc = Arc<dyn TerminalClient>;
pub type BackendClientArc = Arc<dyn BackendClient>;
pub type OfflineLogStoreArc = Arc<dyn OfflineLogStore>;
pub type FlowDelegateArc = Arc<dyn FlowDelegate>;
