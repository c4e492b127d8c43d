#![allow(dead_code)]

use intentflow::application::orchestrator::TransactionOrchestrator;
use intentflow::domain::amount::{Amount, Currency};
use intentflow::domain::audit::{AuditEvent, Outcome, Stage};
use intentflow::domain::offline::{LimitPair, OfflineLimits};
use intentflow::domain::parameters::{
    PaymentParameters, RefundParameters, SetupParameters, TransactionParameters,
};
use intentflow::domain::run_config::{AllowRedisplay, CaptureMethod};
use intentflow::infrastructure::in_memory::InMemoryOfflineLog;
use intentflow::infrastructure::scripted::{
    BackendScript, DelegateScript, ScriptedBackend, ScriptedDelegate, ScriptedTerminal,
    TerminalScript,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub fn usd() -> Currency {
    Currency::new("usd").unwrap()
}

pub fn payment(amount: Decimal, capture_method: CaptureMethod) -> TransactionParameters {
    TransactionParameters::Payment(PaymentParameters {
        amount: Amount::new(amount).unwrap(),
        currency: usd(),
        capture_method,
        description: Some("integration test".to_string()),
        customer: None,
    })
}

pub fn setup() -> TransactionParameters {
    TransactionParameters::Setup(SetupParameters {
        amount: Amount::new(dec!(1)).unwrap(),
        currency: usd(),
        allow_redisplay: AllowRedisplay::Always,
        customer: Some("cus_1".to_string()),
    })
}

pub fn refund(amount: Decimal) -> TransactionParameters {
    TransactionParameters::Refund(RefundParameters {
        charge_id: "ch_1".to_string(),
        payment_intent_id: Some("pi_0".to_string()),
        amount: Amount::new(amount).unwrap(),
        currency: usd(),
    })
}

/// Single-transaction limit of 1000 for every currency.
pub fn limits() -> OfflineLimits {
    OfflineLimits {
        global: LimitPair {
            single_transaction: Some(dec!(1000)),
            cumulative: None,
        },
        ..Default::default()
    }
}

pub struct Harness {
    pub orchestrator: TransactionOrchestrator,
    pub terminal: ScriptedTerminal,
    pub backend: ScriptedBackend,
    pub offline_log: InMemoryOfflineLog,
}

pub fn harness(script: TerminalScript) -> Harness {
    harness_with(script, BackendScript::default(), DelegateScript::default(), limits())
}

pub fn harness_with(
    script: TerminalScript,
    backend: BackendScript,
    delegate: DelegateScript,
    offline_limits: OfflineLimits,
) -> Harness {
    let terminal = ScriptedTerminal::new(script);
    let backend = ScriptedBackend::new(backend);
    let offline_log = InMemoryOfflineLog::new();
    let orchestrator = TransactionOrchestrator::builder()
        .terminal(Arc::new(terminal.clone()))
        .backend(Arc::new(backend.clone()))
        .offline_log(Arc::new(offline_log.clone()))
        .delegate(Arc::new(ScriptedDelegate::new(delegate)))
        .offline_limits(offline_limits)
        .build()
        .unwrap();
    Harness {
        orchestrator,
        terminal,
        backend,
        offline_log,
    }
}

pub fn stages(events: &[AuditEvent]) -> Vec<(Stage, Outcome)> {
    events.iter().map(|e| (e.stage, e.outcome)).collect()
}

/// Stages of the events that opened a remote call, in order.
pub fn attempted(events: &[AuditEvent]) -> Vec<Stage> {
    events
        .iter()
        .filter(|e| e.outcome == Outcome::Pending)
        .map(|e| e.stage)
        .collect()
}
