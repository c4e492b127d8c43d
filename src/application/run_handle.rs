use super::orchestrator::TerminalOutcome;
use crate::domain::audit::{AuditEvent, AuditLog, Outcome, Stage};
use crate::domain::cancellation::CancellationToken;
use crate::error::{FlowError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Book-keeping for the single run an orchestrator may have in flight.
///
/// Each attempt of the run (the first one and every policy restart) gets its own
/// token. Installing a new attempt cancels and drops the previous token, so at most one
/// attempt token is live at any time.
#[derive(Debug)]
pub(crate) struct RunSlot {
    state: Mutex<SlotState>,
    audit: AuditLog,
}

#[derive(Debug, Default)]
struct SlotState {
    current: Option<CancellationToken>,
    canceled: bool,
    finished: bool,
    stage: Option<Stage>,
    attempts: u32,
}

impl RunSlot {
    pub(crate) fn new(audit: AuditLog) -> Self {
        Self {
            state: Mutex::new(SlotState::default()),
            audit,
        }
    }

    /// Replaces the current attempt token with a fresh one.
    pub(crate) fn begin_attempt(&self) -> CancellationToken {
        let mut state = self.lock();
        if let Some(previous) = state.current.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        if state.canceled {
            token.cancel();
        }
        state.attempts += 1;
        state.current = Some(token.clone());
        token
    }

    pub(crate) fn enter_stage(&self, stage: Stage) {
        self.lock().stage = Some(stage);
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// Cancels the run. Only the first call before the run finishes has an effect; it
    /// records a `cancel_requested` event naming the stage that was active.
    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.lock();
        if state.canceled || state.finished {
            return false;
        }
        state.canceled = true;
        if let Some(token) = &state.current {
            token.cancel();
        }
        let note = match state.stage {
            Some(stage) => format!("Cancel requested during {stage}"),
            None => "Cancel requested before the first stage".to_string(),
        };
        tracing::info!(stage = ?state.stage, "cancel requested");
        self.audit
            .append(AuditEvent::note(Stage::CancelRequested, Outcome::Succeeded, note));
        true
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.lock().canceled
    }

    pub(crate) fn finish(&self) {
        let mut state = self.lock();
        state.current = None;
        state.finished = true;
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a run started with [`TransactionOrchestrator::start`](super::orchestrator::TransactionOrchestrator::start).
pub struct RunHandle {
    slot: Arc<RunSlot>,
    join: JoinHandle<Result<TerminalOutcome>>,
}

impl RunHandle {
    pub(crate) fn new(slot: Arc<RunSlot>, join: JoinHandle<Result<TerminalOutcome>>) -> Self {
        Self { slot, join }
    }

    /// Asks the run to stop at its next stage boundary. Idempotent: returns `true` only
    /// for the call that actually requested cancellation, and `false` once the run is done.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    pub fn is_canceled(&self) -> bool {
        self.slot.is_canceled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the run to reach a terminal outcome.
    pub async fn wait(self) -> Result<TerminalOutcome> {
        self.join
            .await
            .map_err(|e| FlowError::InternalError(Box::new(e)))?
    }
}
