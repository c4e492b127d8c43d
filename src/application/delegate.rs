use crate::domain::audit::{AuditEvent, AuditLog, Outcome, Stage};
use crate::domain::intent::{PaymentOption, QrCodeDisplayData, TransactionIntent};
use crate::domain::ports::FlowDelegate;

/// Default delegate: takes the first payment option offered and reports every QR
/// code as displayed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoSelectDelegate;

impl FlowDelegate for AutoSelectDelegate {
    fn select_payment_option(
        &self,
        _intent: &TransactionIntent,
        options: &[PaymentOption],
    ) -> Option<PaymentOption> {
        options.first().cloned()
    }

    fn display_qr_code(&self, _intent: &TransactionIntent, _qr: &QrCodeDisplayData) -> bool {
        true
    }
}

/// Records every decision the terminal asks for in the audit trail, then forwards it.
pub(crate) struct AuditedDelegate<'a> {
    inner: &'a dyn FlowDelegate,
    audit: &'a AuditLog,
}

impl<'a> AuditedDelegate<'a> {
    pub(crate) fn new(inner: &'a dyn FlowDelegate, audit: &'a AuditLog) -> Self {
        Self { inner, audit }
    }
}

impl FlowDelegate for AuditedDelegate<'_> {
    fn select_payment_option(
        &self,
        intent: &TransactionIntent,
        options: &[PaymentOption],
    ) -> Option<PaymentOption> {
        let selected = self.inner.select_payment_option(intent, options);
        let event = match &selected {
            Some(option) => AuditEvent::note(
                Stage::PaymentMethodSelection,
                Outcome::Succeeded,
                format!("Selected: {}", option.label()),
            ),
            None => AuditEvent::errored(
                Stage::PaymentMethodSelection,
                "Payment method selection was declined",
            ),
        };
        self.audit.append(event);
        selected
    }

    fn display_qr_code(&self, intent: &TransactionIntent, qr: &QrCodeDisplayData) -> bool {
        self.audit.append(AuditEvent::note(
            Stage::QrCodeDisplay,
            Outcome::Pending,
            format!(
                "Payment Method: {}, PNG URL: {}",
                qr.payment_method_type,
                qr.image_url_png.as_deref().unwrap_or("nil")
            ),
        ));
        let displayed = self.inner.display_qr_code(intent, qr);
        self.audit.append(if displayed {
            AuditEvent::note(Stage::QrCodeDisplay, Outcome::Succeeded, "QR code displayed")
        } else {
            AuditEvent::errored(Stage::QrCodeDisplay, "QR code could not be displayed")
        });
        displayed
    }
}
