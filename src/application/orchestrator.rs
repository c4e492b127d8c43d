use super::capture::CaptureCoordinator;
use super::delegate::{AuditedDelegate, AutoSelectDelegate};
use super::run_handle::{RunHandle, RunSlot};
use crate::domain::audit::{AuditEvent, AuditLog, Outcome, Stage};
use crate::domain::cancellation::CancellationToken;
use crate::domain::intent::{CardBrand, IntentStatus, TransactionIntent};
use crate::domain::offline::OfflineLimits;
use crate::domain::parameters::TransactionParameters;
use crate::domain::policy::{DeclineDecision, evaluate_decline};
use crate::domain::ports::{
    BackendClientArc, FlowDelegateArc, OfflineLogStoreArc, TerminalClientArc,
};
use crate::domain::run_config::{FlowMode, RunConfiguration};
use crate::error::{FlowError, RemoteError, Result};
use crate::infrastructure::in_memory::InMemoryOfflineLog;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The host canceled the run through its [`RunHandle`].
    Requested,
    /// The decline policy refused the collected card and retrying was not allowed.
    PolicyRejection { brand: CardBrand },
}

/// How a run ended.
///
/// A host cancellation takes precedence: once [`RunHandle::cancel`] has been called, a run
/// that has not completed ends as `Canceled(Requested)` even if the interrupted stage
/// failed or the decline policy rejected the card. The stage's own errored event is
/// still in the audit trail.
#[derive(Debug)]
pub enum TerminalOutcome {
    Completed(TransactionIntent),
    Canceled(CancelReason),
    Failed(FlowError),
}

impl TerminalOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TerminalOutcome::Completed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, TerminalOutcome::Canceled(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TerminalOutcome::Failed(_))
    }

    pub fn intent(&self) -> Option<&TransactionIntent> {
        match self {
            TerminalOutcome::Completed(intent) => Some(intent),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            TerminalOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalOutcome::Completed(intent) => write!(f, "completed: {intent}"),
            TerminalOutcome::Canceled(CancelReason::Requested) => {
                f.write_str("canceled: requested by host")
            }
            TerminalOutcome::Canceled(CancelReason::PolicyRejection { brand }) => {
                write!(f, "canceled: {brand} cards are declined")
            }
            TerminalOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

enum FlowState {
    Created,
    Collecting(TransactionIntent),
    Confirming(TransactionIntent),
    Processing(TransactionIntent),
    Capturing(TransactionIntent),
    /// The decline policy discarded the collected method; collect again on this intent.
    Restart(TransactionIntent),
    Done(TerminalOutcome),
}

enum AttemptResult {
    Finished(TerminalOutcome),
    Restart(TransactionIntent),
}

/// Everything one attempt of a run needs besides the orchestrator itself.
struct Attempt<'a> {
    params: &'a TransactionParameters,
    config: &'a RunConfiguration,
    slot: &'a RunSlot,
    token: &'a CancellationToken,
    restarts: u32,
}

impl Attempt<'_> {
    fn restarts_exhausted(&self) -> bool {
        self.config
            .max_decline_restarts
            .is_some_and(|max| self.restarts >= max)
    }
}

/// Clears the running flag when the run task ends, however it ends.
struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Drives a payment, setup or refund from creation to a terminal outcome.
///
/// One orchestrator runs at most one transaction at a time. The state machine is the
/// same for every transaction kind; kind-specific rules come from
/// [`TransactionKind`](crate::domain::intent::TransactionKind).
///
/// Every stage appends a `pending` audit event before its remote call and a
/// `succeeded` or `errored` event after it, so the audit trail records abandoned
/// attempts as well as the one that finished.
#[derive(Clone)]
pub struct TransactionOrchestrator {
    terminal: TerminalClientArc,
    capture: CaptureCoordinator,
    delegate: FlowDelegateArc,
    offline_limits: OfflineLimits,
    audit: AuditLog,
    running: Arc<AtomicBool>,
}

impl TransactionOrchestrator {
    pub fn builder() -> TransactionOrchestratorBuilder {
        TransactionOrchestratorBuilder::default()
    }

    /// Validates `config`, bakes the offline limits into it and spawns the run.
    ///
    /// Fails with [`FlowError::RunInProgress`] while a previous run is still active,
    /// and with [`FlowError::InvalidConfiguration`] before any remote call is made.
    pub fn start(
        &self,
        params: TransactionParameters,
        config: RunConfiguration,
    ) -> Result<RunHandle> {
        let config = self.prepare(&params, config)?;
        let guard = self.claim()?;
        let slot = Arc::new(RunSlot::new(self.audit.clone()));

        let orchestrator = self.clone();
        let run_slot = Arc::clone(&slot);
        let join = tokio::spawn(async move {
            let _guard = guard;
            orchestrator.drive(params, config, run_slot).await
        });
        Ok(RunHandle::new(slot, join))
    }

    /// Starts a run and waits for its outcome.
    pub async fn run(
        &self,
        params: TransactionParameters,
        config: RunConfiguration,
    ) -> Result<TerminalOutcome> {
        self.start(params, config)?.wait().await
    }

    /// Every event appended so far, in order.
    pub fn audit_trail(&self) -> Vec<AuditEvent> {
        self.audit.snapshot()
    }

    pub fn audit_log(&self) -> AuditLog {
        self.audit.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn prepare(
        &self,
        params: &TransactionParameters,
        config: RunConfiguration,
    ) -> Result<RunConfiguration> {
        config.validate(params)?;
        let requested = config.offline_behavior;
        let effective =
            self.offline_limits
                .effective_behavior(params.amount(), params.currency(), requested);
        if effective != requested {
            info!(
                amount = %params.amount(),
                currency = %params.currency(),
                ?requested,
                ?effective,
                "offline limits require online processing"
            );
        }
        Ok(config.with_offline_behavior(effective))
    }

    fn claim(&self) -> Result<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| FlowError::RunInProgress)?;
        Ok(RunGuard {
            running: Arc::clone(&self.running),
        })
    }

    async fn drive(
        &self,
        params: TransactionParameters,
        config: RunConfiguration,
        slot: Arc<RunSlot>,
    ) -> Result<TerminalOutcome> {
        let mut restarts = 0;
        let mut resume = None;
        let result = loop {
            let token = slot.begin_attempt();
            let attempt = Attempt {
                params: &params,
                config: &config,
                slot: &slot,
                token: &token,
                restarts,
            };
            let span = info_span!("attempt", kind = %params.kind(), attempt = slot.attempts());
            let entry = match resume.take() {
                Some(intent) => FlowState::Collecting(intent),
                None => FlowState::Created,
            };
            match self.run_attempt(entry, &attempt).instrument(span).await {
                Ok(AttemptResult::Restart(intent)) => {
                    restarts += 1;
                    resume = Some(intent);
                }
                Ok(AttemptResult::Finished(outcome)) => break Ok(outcome),
                Err(e) => break Err(e),
            }
        };
        slot.finish();
        match &result {
            Ok(outcome) => info!(kind = %params.kind(), outcome = %outcome, "run finished"),
            Err(e) => warn!(kind = %params.kind(), error = %e, "run aborted"),
        }
        result
    }

    /// Runs one attempt from `entry`. A host cancellation observed at a stage boundary
    /// ends the attempt as `Canceled(Requested)`, replacing any failure or policy
    /// outcome the interrupted stage produced. Only a completed run is kept as is.
    async fn run_attempt(&self, entry: FlowState, run: &Attempt<'_>) -> Result<AttemptResult> {
        let mut state = entry;
        loop {
            state = match state {
                FlowState::Done(TerminalOutcome::Completed(intent)) => {
                    return Ok(AttemptResult::Finished(TerminalOutcome::Completed(intent)));
                }
                _ if run.token.is_cancelled() => {
                    return Ok(AttemptResult::Finished(TerminalOutcome::Canceled(
                        CancelReason::Requested,
                    )));
                }
                FlowState::Done(outcome) => return Ok(AttemptResult::Finished(outcome)),
                FlowState::Restart(intent) => return Ok(AttemptResult::Restart(intent)),
                FlowState::Created => self.create(run).await,
                FlowState::Collecting(intent) => self.collect(intent, run).await,
                FlowState::Confirming(intent) => self.confirm(intent, run).await,
                FlowState::Processing(intent) => self.process(intent, run).await,
                FlowState::Capturing(intent) => self.capture(intent, run).await?,
            };
        }
    }

    async fn create(&self, run: &Attempt<'_>) -> FlowState {
        run.slot.enter_stage(Stage::Create);
        self.audit.append(AuditEvent::pending(Stage::Create));
        match self
            .terminal
            .create(run.params, run.config.offline_behavior)
            .await
        {
            Ok(intent) => {
                info!(intent = %intent, "intent created");
                self.audit.append(AuditEvent::succeeded(Stage::Create, &intent));
                match run.config.mode {
                    FlowMode::Separate => FlowState::Collecting(intent),
                    FlowMode::Combined => FlowState::Processing(intent),
                }
            }
            Err(e) => {
                warn!(kind = %e.kind, error = %e, "create failed");
                self.audit.append(AuditEvent::errored(Stage::Create, &e));
                FlowState::Done(TerminalOutcome::Failed(e.into()))
            }
        }
    }

    async fn collect(&self, intent: TransactionIntent, run: &Attempt<'_>) -> FlowState {
        run.slot.enter_stage(Stage::Collect);
        self.audit.append(AuditEvent::pending(Stage::Collect));
        let delegate = AuditedDelegate::new(self.delegate.as_ref(), &self.audit);
        let collected = match self
            .terminal
            .collect(&intent, &run.config.collect, &delegate, run.token)
            .await
        {
            Ok(collected) => collected,
            Err(e) => {
                warn!(kind = %e.kind, error = %e, "collect failed");
                self.audit.append(AuditEvent::errored(Stage::Collect, &e));
                self.cleanup_after(&intent, &e, run.token).await;
                return FlowState::Done(TerminalOutcome::Failed(e.into()));
            }
        };

        let decision = match evaluate_decline(
            collected.card_brand(),
            run.config.decline_brand,
            run.config.retry_on_decline,
        ) {
            DeclineDecision::Retry if run.restarts_exhausted() => DeclineDecision::RejectTerminal,
            decision => decision,
        };

        match (decision, collected.card_brand()) {
            (DeclineDecision::Retry, Some(brand)) => {
                warn!(%brand, restart = run.restarts + 1, "declined brand collected, restarting");
                self.audit.append(AuditEvent::errored(
                    Stage::Collect,
                    FlowError::PolicyRejection { brand },
                ));
                self.audit.append(AuditEvent::note(
                    Stage::Restart,
                    Outcome::Succeeded,
                    format!(
                        "Collecting again on {} after a declined {brand} card",
                        intent.reference().unwrap_or("<unidentified>")
                    ),
                ));
                FlowState::Restart(intent)
            }
            (DeclineDecision::RejectTerminal, Some(brand)) => {
                warn!(%brand, "declined brand collected, canceling");
                self.audit.append(AuditEvent::errored(
                    Stage::Collect,
                    FlowError::PolicyRejection { brand },
                ));
                self.cancel_remote(&collected, run.token).await;
                FlowState::Done(TerminalOutcome::Canceled(CancelReason::PolicyRejection {
                    brand,
                }))
            }
            _ if !run.params.kind().accepts_collected(collected.status) => {
                self.unexpected_status(Stage::Collect, &collected)
            }
            _ => {
                self.audit
                    .append(AuditEvent::succeeded(Stage::Collect, &collected));
                FlowState::Confirming(collected)
            }
        }
    }

    async fn confirm(&self, intent: TransactionIntent, run: &Attempt<'_>) -> FlowState {
        run.slot.enter_stage(Stage::Confirm);
        self.audit.append(AuditEvent::pending(Stage::Confirm));
        let delegate = AuditedDelegate::new(self.delegate.as_ref(), &self.audit);
        let result = self
            .terminal
            .confirm(&intent, &run.config.confirm, &delegate)
            .await;
        self.finish_authorization(Stage::Confirm, &intent, result, run)
            .await
    }

    async fn process(&self, intent: TransactionIntent, run: &Attempt<'_>) -> FlowState {
        run.slot.enter_stage(Stage::Process);
        self.audit.append(AuditEvent::pending(Stage::Process));
        let delegate = AuditedDelegate::new(self.delegate.as_ref(), &self.audit);
        let result = self
            .terminal
            .process(
                &intent,
                &run.config.collect,
                &run.config.confirm,
                &delegate,
                run.token,
            )
            .await;
        self.finish_authorization(Stage::Process, &intent, result, run)
            .await
    }

    /// Shared tail of confirm and process.
    async fn finish_authorization(
        &self,
        stage: Stage,
        intent: &TransactionIntent,
        result: std::result::Result<TransactionIntent, RemoteError>,
        run: &Attempt<'_>,
    ) -> FlowState {
        match result {
            Ok(confirmed) if !run.params.kind().accepts_confirmed(confirmed.status) => {
                self.unexpected_status(stage, &confirmed)
            }
            Ok(confirmed) => {
                info!(%stage, intent = %confirmed, "intent authorized");
                self.audit.append(AuditEvent::succeeded(stage, &confirmed));
                if run.config.emit_receipts {
                    self.receipt(&confirmed);
                }
                if confirmed.status == IntentStatus::RequiresCapture && !run.config.skip_capture {
                    FlowState::Capturing(confirmed)
                } else {
                    FlowState::Done(TerminalOutcome::Completed(confirmed))
                }
            }
            Err(e) => {
                warn!(%stage, kind = %e.kind, error = %e, "authorization failed");
                self.audit.append(AuditEvent::errored(stage, &e));
                let partial = e.intent.as_deref();
                if run.config.emit_receipts
                    && let Some(partial) = partial
                {
                    self.receipt(partial);
                }
                self.cleanup_after(partial.unwrap_or(intent), &e, run.token)
                    .await;
                FlowState::Done(TerminalOutcome::Failed(e.into()))
            }
        }
    }

    async fn capture(&self, intent: TransactionIntent, run: &Attempt<'_>) -> Result<FlowState> {
        run.slot.enter_stage(Stage::Capture);
        match self
            .capture
            .capture(&intent, run.config.tip_on_receipt, &self.audit)
            .await
        {
            Ok(_) => Ok(FlowState::Done(TerminalOutcome::Completed(intent))),
            Err(e @ FlowError::ContractViolation(_)) => Err(e),
            Err(e) => Ok(FlowState::Done(TerminalOutcome::Failed(e))),
        }
    }

    fn unexpected_status(&self, stage: Stage, intent: &TransactionIntent) -> FlowState {
        warn!(%stage, status = %intent.status, "unexpected intent status");
        self.audit.append(AuditEvent::rejected(stage, intent));
        FlowState::Done(TerminalOutcome::Failed(FlowError::UnexpectedStatus {
            stage,
            status: intent.status,
        }))
    }

    fn receipt(&self, intent: &TransactionIntent) {
        self.audit.append(AuditEvent::succeeded(Stage::Receipt, intent));
    }

    /// A canceled-kind failure leaves the intent open on the backend. Close it, unless
    /// the host canceled the run itself.
    async fn cleanup_after(
        &self,
        intent: &TransactionIntent,
        error: &RemoteError,
        token: &CancellationToken,
    ) {
        if error.is_canceled() {
            self.cancel_remote(intent, token).await;
        }
    }

    /// Best-effort remote cancel. Failures are recorded and otherwise ignored.
    async fn cancel_remote(&self, intent: &TransactionIntent, token: &CancellationToken) {
        if token.is_cancelled() {
            return;
        }
        self.audit.append(AuditEvent::pending(Stage::Cancel));
        match self.terminal.cancel(intent).await {
            Ok(canceled) => {
                info!(intent = %canceled, "intent canceled");
                self.audit.append(AuditEvent::succeeded(Stage::Cancel, &canceled));
            }
            Err(e) => {
                warn!(kind = %e.kind, error = %e, "best-effort cancel failed");
                self.audit.append(AuditEvent::errored(Stage::Cancel, &e));
            }
        }
    }
}

/// Builder for [`TransactionOrchestrator`]. A terminal and a backend are required.
#[derive(Default)]
pub struct TransactionOrchestratorBuilder {
    terminal: Option<TerminalClientArc>,
    backend: Option<BackendClientArc>,
    offline_log: Option<OfflineLogStoreArc>,
    delegate: Option<FlowDelegateArc>,
    offline_limits: OfflineLimits,
    audit: Option<AuditLog>,
}

impl TransactionOrchestratorBuilder {
    pub fn terminal(mut self, terminal: TerminalClientArc) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn backend(mut self, backend: BackendClientArc) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Where offline authorizations are recorded. Defaults to an in-memory log.
    pub fn offline_log(mut self, offline_log: OfflineLogStoreArc) -> Self {
        self.offline_log = Some(offline_log);
        self
    }

    /// Mid-flow decision maker. Defaults to [`AutoSelectDelegate`].
    pub fn delegate(mut self, delegate: FlowDelegateArc) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn offline_limits(mut self, offline_limits: OfflineLimits) -> Self {
        self.offline_limits = offline_limits;
        self
    }

    /// Shares an existing audit trail instead of starting a new one.
    pub fn audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> Result<TransactionOrchestrator> {
        let terminal = self.terminal.ok_or_else(|| {
            FlowError::InvalidConfiguration("a terminal client is required".to_string())
        })?;
        let backend = self.backend.ok_or_else(|| {
            FlowError::InvalidConfiguration("a backend client is required".to_string())
        })?;
        let offline_log = self
            .offline_log
            .unwrap_or_else(|| Arc::new(InMemoryOfflineLog::new()));

        Ok(TransactionOrchestrator {
            terminal,
            capture: CaptureCoordinator::new(backend, offline_log),
            delegate: self
                .delegate
                .unwrap_or_else(|| Arc::new(AutoSelectDelegate)),
            offline_limits: self.offline_limits,
            audit: self.audit.unwrap_or_default(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }
}
