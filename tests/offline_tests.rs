mod common;

use common::{harness, harness_with, limits, payment, usd};
use intentflow::application::orchestrator::TransactionOrchestrator;
use intentflow::domain::offline::{LimitPair, OfflineLimits};
use intentflow::domain::ports::OfflineLogStore;
use intentflow::domain::run_config::{CaptureMethod, OfflineBehavior, RunConfiguration};
use intentflow::error::{FlowError, RemoteErrorKind};
use intentflow::infrastructure::json_lines::JsonLinesOfflineLog;
use intentflow::infrastructure::scripted::{
    BackendScript, DelegateScript, ScriptedBackend, ScriptedTerminal, TerminalCall,
    TerminalScript,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::tempdir;

fn offline_reader() -> TerminalScript {
    TerminalScript {
        offline: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_single_limit_forces_online_processing() {
    let h = harness(TerminalScript::default());

    h.orchestrator
        .run(payment(dec!(1000), CaptureMethod::Manual), RunConfiguration::default())
        .await
        .unwrap();
    h.orchestrator
        .run(payment(dec!(999.99), CaptureMethod::Manual), RunConfiguration::default())
        .await
        .unwrap();

    let creates: Vec<TerminalCall> = h
        .terminal
        .calls()
        .into_iter()
        .filter(|c| matches!(c, TerminalCall::Create(_)))
        .collect();
    assert_eq!(
        creates,
        vec![
            TerminalCall::Create(OfflineBehavior::RequireOnline),
            TerminalCall::Create(OfflineBehavior::PreferOnline),
        ]
    );
}

#[tokio::test]
async fn test_cumulative_limit_counts_stored_offline_total() {
    let limits = OfflineLimits {
        per_currency: HashMap::from([(
            usd(),
            LimitPair {
                single_transaction: None,
                cumulative: Some(dec!(1000)),
            },
        )]),
        current_totals: HashMap::from([(usd(), dec!(900))]),
        ..limits()
    };
    let h = harness_with(
        TerminalScript::default(),
        BackendScript::default(),
        DelegateScript::default(),
        limits,
    );

    h.orchestrator
        .run(payment(dec!(100), CaptureMethod::Manual), RunConfiguration::default())
        .await
        .unwrap();

    assert_eq!(
        h.terminal.calls().first(),
        Some(&TerminalCall::Create(OfflineBehavior::RequireOnline))
    );
}

#[tokio::test]
async fn test_unrepresentable_offline_total_forces_online() {
    let limits = OfflineLimits {
        global: LimitPair {
            single_transaction: None,
            cumulative: Some(Decimal::MAX),
        },
        current_totals: HashMap::from([(usd(), Decimal::MAX)]),
        ..Default::default()
    };
    let h = harness_with(
        TerminalScript::default(),
        BackendScript::default(),
        DelegateScript::default(),
        limits,
    );

    let outcome = h
        .orchestrator
        .run(payment(dec!(1), CaptureMethod::Manual), RunConfiguration::default())
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(
        h.terminal.calls().first(),
        Some(&TerminalCall::Create(OfflineBehavior::RequireOnline))
    );
}

#[tokio::test]
async fn test_offline_reader_rejects_online_only_transaction() {
    let h = harness(offline_reader());

    let outcome = h
        .orchestrator
        .run(payment(dec!(1500), CaptureMethod::Manual), RunConfiguration::default())
        .await
        .unwrap();

    match outcome.error() {
        Some(FlowError::Remote(err)) => assert_eq!(err.kind, RemoteErrorKind::OfflineNotAllowed),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.terminal.calls().len(), 1);
    assert!(h.offline_log.records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_force_offline_skips_the_backend() {
    let h = harness(TerminalScript::default());
    let config = RunConfiguration {
        offline_behavior: OfflineBehavior::ForceOffline,
        ..Default::default()
    };

    let outcome = h
        .orchestrator
        .run(payment(dec!(20), CaptureMethod::Automatic), config)
        .await
        .unwrap();

    let intent = outcome.intent().cloned().unwrap();
    assert!(intent.is_pending_upload());
    assert_eq!(intent.id, None);
    assert!(h.backend.captures().is_empty());
    // Automatic payments finish at confirm; only manual ones reach the offline log.
    assert!(h.offline_log.records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_offline_records_survive_a_new_orchestrator() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("offline.jsonl");

    for _ in 0..2 {
        let orchestrator = TransactionOrchestrator::builder()
            .terminal(Arc::new(ScriptedTerminal::new(offline_reader())))
            .backend(Arc::new(ScriptedBackend::new(BackendScript::default())))
            .offline_log(Arc::new(JsonLinesOfflineLog::new(&path)))
            .build()
            .unwrap();
        let outcome = orchestrator
            .run(payment(dec!(40), CaptureMethod::Manual), RunConfiguration::default())
            .await
            .unwrap();
        assert!(outcome.is_completed());
    }

    let records = JsonLinesOfflineLog::new(&path).records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.intent.is_pending_upload()));
    assert!(records.iter().all(|r| r.intent.amount.value() == dec!(40)));
}
