mod common;

use common::{attempted, harness, harness_with, limits, payment, refund, setup};
use intentflow::domain::audit::{Outcome, Stage};
use intentflow::domain::intent::{
    CardBrand, IntentStatus, PaymentOption, PaymentOptionType, QrCodeDisplayData,
};
use intentflow::domain::run_config::{CaptureMethod, FlowMode, RunConfiguration};
use intentflow::error::{FlowError, RemoteErrorKind};
use intentflow::infrastructure::scripted::{
    BackendScript, DelegateScript, ScriptedError, ScriptedStep, TerminalCall, TerminalScript,
};
use rust_decimal_macros::dec;

fn combined() -> RunConfiguration {
    RunConfiguration {
        mode: FlowMode::Combined,
        ..Default::default()
    }
}

fn wallet_options() -> TerminalScript {
    TerminalScript {
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
            image_url_png: Some("https://qr.example/wechat.png".to_string()),
            image_url_svg: None,
            expires_at_ms: 1_700_000_000_000,
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_combined_mode_uses_process() {
    let h = harness(TerminalScript::default());

    let outcome = h
        .orchestrator
        .run(payment(dec!(500), CaptureMethod::Manual), combined())
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(
        attempted(&h.orchestrator.audit_trail()),
        vec![Stage::Create, Stage::Process, Stage::Capture]
    );
    assert!(!h.terminal.calls().contains(&TerminalCall::Collect));
    assert_eq!(h.backend.captures().len(), 1);
}

#[tokio::test]
async fn test_canceled_process_triggers_cleanup_cancel() {
    let h = harness(TerminalScript {
        process: vec![ScriptedStep::failing(RemoteErrorKind::Canceled, "canceled")],
        ..Default::default()
    });

    let outcome = h
        .orchestrator
        .run(payment(dec!(500), CaptureMethod::Manual), combined())
        .await
        .unwrap();

    assert!(outcome.is_failed());
    assert_eq!(
        attempted(&h.orchestrator.audit_trail()),
        vec![Stage::Create, Stage::Process, Stage::Cancel]
    );
}

#[tokio::test]
async fn test_canceled_collect_triggers_cleanup_cancel() {
    let h = harness(TerminalScript {
        collect: vec![ScriptedStep::failing(
            RemoteErrorKind::Canceled,
            "customer pressed cancel",
        )],
        ..Default::default()
    });

    let outcome = h
        .orchestrator
        .run(payment(dec!(500), CaptureMethod::Manual), RunConfiguration::default())
        .await
        .unwrap();

    assert!(outcome.is_failed());
    assert_eq!(h.terminal.calls().last(), Some(&TerminalCall::Cancel));
}

#[tokio::test]
async fn test_receipts_follow_authorization() {
    let h = harness(TerminalScript::default());
    let config = RunConfiguration {
        emit_receipts: true,
        ..Default::default()
    };

    h.orchestrator
        .run(payment(dec!(500), CaptureMethod::Manual), config)
        .await
        .unwrap();

    let trail = h.orchestrator.audit_trail();
    let confirmed = trail
        .iter()
        .position(|e| e.stage == Stage::Confirm && e.outcome == Outcome::Succeeded)
        .unwrap();
    assert_eq!(trail[confirmed + 1].stage, Stage::Receipt);
    assert_eq!(
        trail[confirmed + 1].intent().map(|i| i.status),
        Some(IntentStatus::RequiresCapture)
    );
}

#[tokio::test]
async fn test_failed_confirm_with_partial_intent_emits_receipt() {
    let h = harness(TerminalScript {
        confirm: vec![ScriptedStep {
            error: Some(ScriptedError {
                kind: RemoteErrorKind::Declined,
                message: "card declined".to_string(),
                with_intent: true,
            }),
            ..Default::default()
        }],
        ..Default::default()
    });
    let config = RunConfiguration {
        emit_receipts: true,
        ..Default::default()
    };

    let outcome = h
        .orchestrator
        .run(payment(dec!(500), CaptureMethod::Manual), config)
        .await
        .unwrap();

    assert!(outcome.is_failed());
    let trail = h.orchestrator.audit_trail();
    assert_eq!(
        trail.last().map(|e| (e.stage, e.outcome)),
        Some((Stage::Receipt, Outcome::Succeeded))
    );
}

#[tokio::test]
async fn test_payment_option_selection_is_audited() {
    let h = harness_with(
        wallet_options(),
        BackendScript::default(),
        DelegateScript {
            prefer: Some("wechat_pay".to_string()),
            ..Default::default()
        },
        limits(),
    );

    let outcome = h
        .orchestrator
        .run(
            payment(dec!(88), CaptureMethod::Automatic),
            RunConfiguration::default(),
        )
        .await
        .unwrap();

    assert!(outcome.is_completed());
    let trail = h.orchestrator.audit_trail();
    let details: Vec<(Stage, Outcome, String)> = trail
        .iter()
        .filter(|e| {
            matches!(
                e.stage,
                Stage::PaymentMethodSelection | Stage::QrCodeDisplay
            )
        })
        .map(|e| {
            (
                e.stage,
                e.outcome,
                e.payload.as_ref().map(ToString::to_string).unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        details,
        vec![
            (
                Stage::PaymentMethodSelection,
                Outcome::Succeeded,
                "Selected: Wechat Pay (QR Code)".to_string()
            ),
            (
                Stage::QrCodeDisplay,
                Outcome::Pending,
                "Payment Method: wechat_pay, PNG URL: https://qr.example/wechat.png".to_string()
            ),
            (
                Stage::QrCodeDisplay,
                Outcome::Succeeded,
                "QR code displayed".to_string()
            ),
        ]
    );
    assert_eq!(outcome.intent().and_then(|i| i.card_brand()), None);
}

#[tokio::test]
async fn test_declined_selection_fails_collect() {
    let h = harness_with(
        wallet_options(),
        BackendScript::default(),
        DelegateScript {
            refuse_selection: true,
            ..Default::default()
        },
        limits(),
    );

    let outcome = h
        .orchestrator
        .run(payment(dec!(88), CaptureMethod::Manual), RunConfiguration::default())
        .await
        .unwrap();

    assert!(outcome.is_failed());
    let trail = h.orchestrator.audit_trail();
    assert!(
        trail
            .iter()
            .any(|e| e.stage == Stage::PaymentMethodSelection && e.outcome == Outcome::Errored)
    );
    assert!(
        trail
            .iter()
            .any(|e| e.stage == Stage::Collect && e.outcome == Outcome::Errored)
    );
}

#[tokio::test]
async fn test_setup_collect_with_unexpected_status_fails() {
    let h = harness(TerminalScript {
        collect: vec![ScriptedStep::with_status(IntentStatus::RequiresPaymentMethod)],
        ..Default::default()
    });

    let outcome = h
        .orchestrator
        .run(setup(), RunConfiguration::default())
        .await
        .unwrap();

    assert!(matches!(
        outcome.error(),
        Some(FlowError::UnexpectedStatus {
            stage: Stage::Collect,
            status: IntentStatus::RequiresPaymentMethod
        })
    ));
    assert!(!h.terminal.calls().contains(&TerminalCall::Confirm));
}

#[tokio::test]
async fn test_refund_only_succeeds_on_succeeded() {
    let h = harness(TerminalScript {
        confirm: vec![ScriptedStep::with_status(IntentStatus::Pending)],
        ..Default::default()
    });

    let outcome = h
        .orchestrator
        .run(refund(dec!(25)), RunConfiguration::default())
        .await
        .unwrap();

    assert!(outcome.is_failed());
    assert!(h.backend.captures().is_empty());
}

#[tokio::test]
async fn test_refund_rejects_decline_brand() {
    let h = harness(TerminalScript::default());
    let config = RunConfiguration {
        decline_brand: Some(CardBrand::Visa),
        ..Default::default()
    };

    let err = h
        .orchestrator
        .run(refund(dec!(25)), config)
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::InvalidConfiguration(_)));
}
