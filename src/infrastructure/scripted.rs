//! Deterministic collaborators driven by a script.
//!
//! Each terminal operation pops the next step from its queue; an empty queue behaves
//! like a default step, which succeeds with the status a real reader would report.
//! Every call is recorded so callers can assert on what was sent.

use crate::domain::cancellation::CancellationToken;
use crate::domain::intent::{
    CardBrand, CollectedData, EntryMethod, IntentStatus, OfflineDetails, PaymentMethodDetails,
    PaymentOption, PaymentOptionType, QrCodeDisplayData, TransactionIntent, TransactionKind,
};
use crate::domain::parameters::TransactionParameters;
use crate::domain::ports::{BackendClient, CaptureParams, FlowDelegate, TerminalClient};
use crate::domain::run_config::{
    CaptureMethod, CollectConfig, CollectDataConfig, CollectDataType, ConfirmConfig,
    OfflineBehavior,
};
use crate::error::{RemoteError, RemoteErrorKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedError {
    pub kind: RemoteErrorKind,
    pub message: String,
    /// Attach the intent the operation was working on, as a partially processed result.
    #[serde(default)]
    pub with_intent: bool,
}

impl ScriptedError {
    fn to_remote(&self, intent: Option<&TransactionIntent>) -> RemoteError {
        let err = RemoteError::new(self.kind, self.message.clone());
        match intent {
            Some(intent) if self.with_intent => err.with_intent(intent.clone()),
            _ => err,
        }
    }
}

/// Result of one scripted intent operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScriptedStep {
    /// Overrides the status the operation would normally return.
    pub status: Option<IntentStatus>,
    /// Card brand reported by collect and process.
    pub brand: Option<CardBrand>,
    pub entry_method: Option<EntryMethod>,
    pub error: Option<ScriptedError>,
    /// Simulated reader latency. Cancelable operations stop waiting on cancellation.
    pub delay_ms: u64,
}

impl ScriptedStep {
    pub fn with_status(status: IntentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_brand(brand: CardBrand) -> Self {
        Self {
            brand: Some(brand),
            ..Default::default()
        }
    }

    pub fn failing(kind: RemoteErrorKind, message: &str) -> Self {
        Self {
            error: Some(ScriptedError {
                kind,
                message: message.to_string(),
                with_intent: false,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScriptedDataStep {
    pub data: Option<CollectedData>,
    pub error: Option<ScriptedError>,
    pub delay_ms: u64,
}

/// Behavior of a [`ScriptedTerminal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TerminalScript {
    /// The reader is disconnected from the backend.
    pub offline: bool,
    pub create: Vec<ScriptedStep>,
    pub collect: Vec<ScriptedStep>,
    pub confirm: Vec<ScriptedStep>,
    pub process: Vec<ScriptedStep>,
    pub cancel: Vec<ScriptedStep>,
    pub collect_data: Vec<ScriptedDataStep>,
    /// Offered to the delegate on every collect or process when not empty.
    pub payment_options: Vec<PaymentOption>,
    /// Shown through the delegate when a non-card option is selected.
    pub qr_code: Option<QrCodeDisplayData>,
}

/// A terminal operation as recorded by [`ScriptedTerminal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalCall {
    Create(OfflineBehavior),
    Collect,
    Confirm,
    Process,
    Cancel,
    CollectData,
}

#[derive(Debug, Default)]
struct Queues {
    create: VecDeque<ScriptedStep>,
    collect: VecDeque<ScriptedStep>,
    confirm: VecDeque<ScriptedStep>,
    process: VecDeque<ScriptedStep>,
    cancel: VecDeque<ScriptedStep>,
    collect_data: VecDeque<ScriptedDataStep>,
}

#[derive(Debug)]
struct TerminalState {
    offline: bool,
    payment_options: Vec<PaymentOption>,
    qr_code: Option<QrCodeDisplayData>,
    queues: Mutex<Queues>,
    calls: Mutex<Vec<TerminalCall>>,
    next_id: AtomicU32,
}

/// [`TerminalClient`] that replays a [`TerminalScript`]. Clones share the script and
/// the call record.
#[derive(Debug, Clone)]
pub struct ScriptedTerminal {
    state: Arc<TerminalState>,
}

impl ScriptedTerminal {
    pub fn new(script: TerminalScript) -> Self {
        let queues = Queues {
            create: script.create.into(),
            collect: script.collect.into(),
            confirm: script.confirm.into(),
            process: script.process.into(),
            cancel: script.cancel.into(),
            collect_data: script.collect_data.into(),
        };
        Self {
            state: Arc::new(TerminalState {
                offline: script.offline,
                payment_options: script.payment_options,
                qr_code: script.qr_code,
                queues: Mutex::new(queues),
                calls: Mutex::new(Vec::new()),
                next_id: AtomicU32::new(1),
            }),
        }
    }

    /// Every operation received so far, in order.
    pub fn calls(&self) -> Vec<TerminalCall> {
        lock(&self.state.calls).clone()
    }

    fn record(&self, call: TerminalCall) {
        debug!(?call, "scripted terminal call");
        lock(&self.state.calls).push(call);
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        lock(&self.state.queues)
    }

    fn next_id(&self) -> u32 {
        self.state.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Picks a payment method through the delegate when several are offered.
    fn choose_method(
        &self,
        intent: &TransactionIntent,
        step: &ScriptedStep,
        delegate: &dyn FlowDelegate,
    ) -> RemoteResult<PaymentMethodDetails> {
        let card = PaymentMethodDetails {
            brand: Some(step.brand.unwrap_or(CardBrand::Unknown)),
            entry_method: step.entry_method.unwrap_or_default(),
        };
        if self.state.payment_options.is_empty() {
            return Ok(card);
        }

        let Some(selected) = delegate.select_payment_option(intent, &self.state.payment_options)
        else {
            return Err(RemoteError::canceled("payment option selection was declined"));
        };
        if selected.option_type == PaymentOptionType::Card {
            return Ok(card);
        }
        if let Some(qr) = &self.state.qr_code
            && !delegate.display_qr_code(intent, qr)
        {
            return Err(RemoteError::canceled("QR code could not be displayed"));
        }
        Ok(PaymentMethodDetails {
            brand: None,
            entry_method: EntryMethod::QrCode,
        })
    }

    fn authorized_status(intent: &TransactionIntent) -> IntentStatus {
        match (intent.kind, intent.capture_method) {
            (TransactionKind::Payment, Some(CaptureMethod::Manual)) => {
                IntentStatus::RequiresCapture
            }
            _ => IntentStatus::Succeeded,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn wait(delay_ms: u64) {
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

/// Waits like [`wait`] but gives up as soon as `token` is cancelled.
async fn wait_cancelable(delay_ms: u64, token: &CancellationToken) -> RemoteResult<()> {
    if token.is_cancelled() {
        return Err(RemoteError::canceled("operation canceled"));
    }
    tokio::select! {
        _ = wait(delay_ms) => Ok(()),
        _ = token.cancelled() => Err(RemoteError::canceled("operation canceled")),
    }
}

#[async_trait]
impl TerminalClient for ScriptedTerminal {
    async fn create(
        &self,
        params: &TransactionParameters,
        offline_behavior: OfflineBehavior,
    ) -> RemoteResult<TransactionIntent> {
        self.record(TerminalCall::Create(offline_behavior));
        let step = self.queues().create.pop_front().unwrap_or_default();
        wait(step.delay_ms).await;
        if let Some(error) = &step.error {
            return Err(error.to_remote(None));
        }

        let kind = params.kind();
        let offline = match offline_behavior {
            OfflineBehavior::ForceOffline => true,
            OfflineBehavior::RequireOnline if self.state.offline => {
                return Err(RemoteError::new(
                    RemoteErrorKind::OfflineNotAllowed,
                    "the reader is offline and this transaction must be processed online",
                ));
            }
            _ => self.state.offline,
        };
        if offline && kind != TransactionKind::Payment {
            return Err(RemoteError::new(
                RemoteErrorKind::OfflineNotAllowed,
                format!("{kind} intents cannot be created offline"),
            ));
        }

        let n = self.next_id();
        let default_status = match kind {
            TransactionKind::Refund => IntentStatus::Pending,
            _ => IntentStatus::RequiresPaymentMethod,
        };
        let (id, offline_id, offline) = if offline {
            (
                None,
                Some(format!("off_{n}")),
                Some(OfflineDetails {
                    requires_upload: true,
                }),
            )
        } else {
            let prefix = match kind {
                TransactionKind::Payment => "pi",
                TransactionKind::Setup => "seti",
                TransactionKind::Refund => "re",
            };
            (Some(format!("{prefix}_{n}")), None, None)
        };

        Ok(TransactionIntent {
            kind,
            id,
            offline_id,
            amount: params.amount(),
            currency: params.currency().clone(),
            status: step.status.unwrap_or(default_status),
            capture_method: params.capture_method(),
            payment_method: None,
            offline,
            amount_tip: None,
        })
    }

    async fn collect(
        &self,
        intent: &TransactionIntent,
        _config: &CollectConfig,
        delegate: &dyn FlowDelegate,
        token: &CancellationToken,
    ) -> RemoteResult<TransactionIntent> {
        self.record(TerminalCall::Collect);
        let step = self.queues().collect.pop_front().unwrap_or_default();
        wait_cancelable(step.delay_ms, token).await?;
        if let Some(error) = &step.error {
            return Err(error.to_remote(Some(intent)));
        }

        let payment_method = self.choose_method(intent, &step, delegate)?;
        let default_status = match intent.kind {
            TransactionKind::Refund => IntentStatus::Pending,
            _ => IntentStatus::RequiresConfirmation,
        };
        Ok(TransactionIntent {
            status: step.status.unwrap_or(default_status),
            payment_method: Some(payment_method),
            ..intent.clone()
        })
    }

    async fn confirm(
        &self,
        intent: &TransactionIntent,
        _config: &ConfirmConfig,
        _delegate: &dyn FlowDelegate,
    ) -> RemoteResult<TransactionIntent> {
        self.record(TerminalCall::Confirm);
        let step = self.queues().confirm.pop_front().unwrap_or_default();
        wait(step.delay_ms).await;
        if let Some(error) = &step.error {
            return Err(error.to_remote(Some(intent)));
        }
        Ok(intent.with_status(step.status.unwrap_or_else(|| Self::authorized_status(intent))))
    }

    async fn process(
        &self,
        intent: &TransactionIntent,
        _collect: &CollectConfig,
        _confirm: &ConfirmConfig,
        delegate: &dyn FlowDelegate,
        token: &CancellationToken,
    ) -> RemoteResult<TransactionIntent> {
        self.record(TerminalCall::Process);
        let step = self.queues().process.pop_front().unwrap_or_default();
        wait_cancelable(step.delay_ms, token).await?;
        if let Some(error) = &step.error {
            return Err(error.to_remote(Some(intent)));
        }

        let payment_method = self.choose_method(intent, &step, delegate)?;
        Ok(TransactionIntent {
            status: step
                .status
                .unwrap_or_else(|| Self::authorized_status(intent)),
            payment_method: Some(payment_method),
            ..intent.clone()
        })
    }

    async fn cancel(&self, intent: &TransactionIntent) -> RemoteResult<TransactionIntent> {
        self.record(TerminalCall::Cancel);
        let step = self.queues().cancel.pop_front().unwrap_or_default();
        wait(step.delay_ms).await;
        if let Some(error) = &step.error {
            return Err(error.to_remote(Some(intent)));
        }
        Ok(intent.with_status(step.status.unwrap_or(IntentStatus::Canceled)))
    }

    async fn collect_data(
        &self,
        config: &CollectDataConfig,
        token: &CancellationToken,
    ) -> RemoteResult<CollectedData> {
        self.record(TerminalCall::CollectData);
        let step = self.queues().collect_data.pop_front().unwrap_or_default();
        wait_cancelable(step.delay_ms, token).await?;
        if let Some(error) = &step.error {
            return Err(error.to_remote(None));
        }

        let n = self.next_id();
        Ok(step.data.unwrap_or_else(|| match config.data_type {
            CollectDataType::Magstripe => CollectedData::Magstripe {
                id: Some(format!("cd_{n}")),
            },
            CollectDataType::NfcUid => CollectedData::NfcUid {
                uid: format!("{n:08x}"),
            },
        }))
    }
}

/// Behavior of a [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackendScript {
    pub capture_error: Option<ScriptedError>,
    pub retrieve_error: Option<ScriptedError>,
    /// Returned by `retrieve_collected_data`. Defaults to `{"id": <id>}`.
    pub collected_data: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
struct BackendState {
    captures: Vec<(String, CaptureParams)>,
    retrievals: Vec<String>,
}

/// [`BackendClient`] that replays a [`BackendScript`] and records every request.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    script: Arc<BackendScript>,
    state: Arc<Mutex<BackendState>>,
}

impl ScriptedBackend {
    pub fn new(script: BackendScript) -> Self {
        Self {
            script: Arc::new(script),
            state: Arc::new(Mutex::new(BackendState::default())),
        }
    }

    /// Capture requests received so far, as `(intent id, params)`.
    pub fn captures(&self) -> Vec<(String, CaptureParams)> {
        lock(&self.state).captures.clone()
    }

    pub fn retrievals(&self) -> Vec<String> {
        lock(&self.state).retrievals.clone()
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn capture(&self, intent_id: &str, params: &CaptureParams) -> RemoteResult<()> {
        debug!(intent_id, amount = %params.amount_to_capture, "scripted capture");
        lock(&self.state)
            .captures
            .push((intent_id.to_string(), params.clone()));
        match &self.script.capture_error {
            Some(error) => Err(error.to_remote(None)),
            None => Ok(()),
        }
    }

    async fn retrieve_collected_data(&self, id: &str) -> RemoteResult<serde_json::Value> {
        debug!(id, "scripted retrieval");
        lock(&self.state).retrievals.push(id.to_string());
        if let Some(error) = &self.script.retrieve_error {
            return Err(error.to_remote(None));
        }
        Ok(self
            .script
            .collected_data
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "id": id })))
    }
}

/// Decisions a [`ScriptedDelegate`] makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DelegateScript {
    /// Payment method type to pick. The first option is taken when unset or not offered.
    pub prefer: Option<String>,
    pub refuse_selection: bool,
    pub refuse_qr_code: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedDelegate {
    script: DelegateScript,
}

impl ScriptedDelegate {
    pub fn new(script: DelegateScript) -> Self {
        Self { script }
    }
}

impl FlowDelegate for ScriptedDelegate {
    fn select_payment_option(
        &self,
        _intent: &TransactionIntent,
        options: &[PaymentOption],
    ) -> Option<PaymentOption> {
        if self.script.refuse_selection {
            return None;
        }
        self.script
            .prefer
            .as_deref()
            .and_then(|wanted| options.iter().find(|o| o.payment_method_type == wanted))
            .or_else(|| options.first())
            .cloned()
    }

    fn display_qr_code(&self, _intent: &TransactionIntent, _qr: &QrCodeDisplayData) -> bool {
        !self.script.refuse_qr_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::delegate::AutoSelectDelegate;
    use crate::domain::amount::{Amount, Currency};
    use crate::domain::parameters::{PaymentParameters, RefundParameters};
    use rust_decimal_macros::dec;

    fn payment(capture_method: CaptureMethod) -> TransactionParameters {
        TransactionParameters::Payment(PaymentParameters {
            amount: Amount::new(dec!(500)).unwrap(),
            currency: Currency::new("usd").unwrap(),
            capture_method,
            description: None,
            customer: None,
        })
    }

    #[tokio::test]
    async fn test_online_payment_lifecycle() {
        let terminal = ScriptedTerminal::new(TerminalScript {
            collect: vec![ScriptedStep::with_brand(CardBrand::Amex)],
            ..Default::default()
        });
        let token = CancellationToken::new();

        let created = terminal
            .create(&payment(CaptureMethod::Manual), OfflineBehavior::PreferOnline)
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("pi_1"));
        assert_eq!(created.status, IntentStatus::RequiresPaymentMethod);

        let collected = terminal
            .collect(&created, &CollectConfig::default(), &AutoSelectDelegate, &token)
            .await
            .unwrap();
        assert_eq!(collected.card_brand(), Some(CardBrand::Amex));

        let confirmed = terminal
            .confirm(&collected, &ConfirmConfig::default(), &AutoSelectDelegate)
            .await
            .unwrap();
        assert_eq!(confirmed.status, IntentStatus::RequiresCapture);

        assert_eq!(
            terminal.calls(),
            vec![
                TerminalCall::Create(OfflineBehavior::PreferOnline),
                TerminalCall::Collect,
                TerminalCall::Confirm
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_reader_creates_pending_upload_intents() {
        let terminal = ScriptedTerminal::new(TerminalScript {
            offline: true,
            ..Default::default()
        });

        let created = terminal
            .create(&payment(CaptureMethod::Automatic), OfflineBehavior::PreferOnline)
            .await
            .unwrap();
        assert!(created.id.is_none());
        assert!(created.is_pending_upload());

        let err = terminal
            .create(&payment(CaptureMethod::Automatic), OfflineBehavior::RequireOnline)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::OfflineNotAllowed);
    }

    #[tokio::test]
    async fn test_refunds_cannot_be_created_offline() {
        let terminal = ScriptedTerminal::new(TerminalScript::default());
        let refund = TransactionParameters::Refund(RefundParameters {
            charge_id: "ch_1".to_string(),
            payment_intent_id: None,
            amount: Amount::new(dec!(10)).unwrap(),
            currency: Currency::new("usd").unwrap(),
        });

        let err = terminal
            .create(&refund, OfflineBehavior::ForceOffline)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::OfflineNotAllowed);
    }

    #[tokio::test]
    async fn test_delayed_collect_observes_cancellation() {
        let terminal = ScriptedTerminal::new(TerminalScript {
            collect: vec![ScriptedStep {
                delay_ms: 10_000,
                ..Default::default()
            }],
            ..Default::default()
        });
        let created = terminal
            .create(&payment(CaptureMethod::Manual), OfflineBehavior::PreferOnline)
            .await
            .unwrap();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = terminal
            .collect(&created, &CollectConfig::default(), &AutoSelectDelegate, &token)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[tokio::test]
    async fn test_non_card_selection_shows_qr_code() {
        let terminal = ScriptedTerminal::new(TerminalScript {
            payment_options: vec![
                PaymentOption {
                    option_type: PaymentOptionType::Card,
                    payment_method_type: "card".to_string(),
                },
                PaymentOption {
                    option_type: PaymentOptionType::NonCard,
                    payment_method_type: "wechat_pay".to_string(),
                },
            ],
            qr_code: Some(QrCodeDisplayData {
                payment_method_type: "wechat_pay".to_string(),
                image_url_png: None,
                image_url_svg: None,
                expires_at_ms: 0,
            }),
            ..Default::default()
        });
        let delegate = ScriptedDelegate::new(DelegateScript {
            prefer: Some("wechat_pay".to_string()),
            ..Default::default()
        });
        let created = terminal
            .create(&payment(CaptureMethod::Automatic), OfflineBehavior::PreferOnline)
            .await
            .unwrap();

        let processed = terminal
            .process(
                &created,
                &CollectConfig::default(),
                &ConfirmConfig::default(),
                &delegate,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(processed.status, IntentStatus::Succeeded);
        assert_eq!(processed.card_brand(), None);

        let refusing = ScriptedDelegate::new(DelegateScript {
            refuse_qr_code: true,
            prefer: Some("wechat_pay".to_string()),
            ..Default::default()
        });
        let err = terminal
            .collect(&created, &CollectConfig::default(), &refusing, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[tokio::test]
    async fn test_backend_records_requests() {
        let backend = ScriptedBackend::new(BackendScript::default());
        backend
            .capture(
                "pi_1",
                &CaptureParams {
                    amount_to_capture: dec!(510),
                },
            )
            .await
            .unwrap();
        let value = backend.retrieve_collected_data("cd_1").await.unwrap();

        assert_eq!(backend.captures()[0].1.amount_to_capture, dec!(510));
        assert_eq!(value["id"], "cd_1");
    }

    #[test]
    fn test_script_deserializes_with_defaults() {
        let json = r#"{"collect":[{"brand":"visa"},{"brand":"mastercard","delay_ms":5}],"offline":true}"#;
        let script: TerminalScript = serde_json::from_str(json).unwrap();
        assert!(script.offline);
        assert_eq!(script.collect.len(), 2);
        assert_eq!(script.collect[1].brand, Some(CardBrand::Mastercard));
        assert!(script.confirm.is_empty());
    }
}
