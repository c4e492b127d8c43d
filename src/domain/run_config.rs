use super::intent::{CardBrand, TransactionKind};
use super::parameters::TransactionParameters;
use crate::error::FlowError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    #[default]
    Automatic,
    Manual,
}

/// Whether the payment method may be shown again to the customer in later sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllowRedisplay {
    #[default]
    Unspecified,
    Limited,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomerCancellation {
    #[default]
    EnableIfAvailable,
    Disable,
}

/// Whether a transaction may be created and processed while disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfflineBehavior {
    /// Go online when possible, fall back to offline processing otherwise.
    #[default]
    #[serde(alias = "allowed")]
    PreferOnline,
    RequireOnline,
    ForceOffline,
}

/// Collect and confirm run as two remote calls, or as a single `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    #[default]
    Separate,
    Combined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CollectConfig {
    pub skip_tipping: bool,
    pub update_intent: bool,
    pub customer_cancellation: CustomerCancellation,
    pub allow_redisplay: AllowRedisplay,
    pub request_dynamic_currency_conversion: bool,
    pub surcharge_notice: Option<String>,
    pub moto: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfirmConfig {
    pub return_url: Option<String>,
    pub surcharge_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectDataType {
    #[default]
    Magstripe,
    NfcUid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CollectDataConfig {
    pub data_type: CollectDataType,
    pub customer_cancellation: CustomerCancellation,
    /// Fetch the stored magstripe data from the backend once the reader returns its id.
    pub retrieve: bool,
}

/// Per-run policy bundle. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfiguration {
    pub collect: CollectConfig,
    pub confirm: ConfirmConfig,
    pub offline_behavior: OfflineBehavior,
    /// Card network the integration refuses after collection.
    pub decline_brand: Option<CardBrand>,
    /// Restart the flow instead of giving up when the declined brand is collected.
    pub retry_on_decline: bool,
    /// Upper bound on policy restarts; further matching declines end the run.
    pub max_decline_restarts: Option<u32>,
    pub skip_capture: bool,
    pub mode: FlowMode,
    /// Extra amount added on top of the intent amount when capturing online.
    pub tip_on_receipt: Decimal,
    /// Append a receipt event after every confirmed intent.
    pub emit_receipts: bool,
}

impl RunConfiguration {
    /// Rejects combinations the orchestrator cannot honor.
    pub fn validate(&self, params: &TransactionParameters) -> Result<(), FlowError> {
        if self.mode == FlowMode::Combined && self.decline_brand.is_some() {
            return Err(FlowError::InvalidConfiguration(
                "a decline brand cannot be enforced in combined mode: the collected brand is not visible before confirmation".to_string(),
            ));
        }
        if self.retry_on_decline && self.decline_brand.is_none() {
            return Err(FlowError::InvalidConfiguration(
                "retry_on_decline requires a decline brand".to_string(),
            ));
        }
        if self.tip_on_receipt < Decimal::ZERO {
            return Err(FlowError::InvalidConfiguration(
                "tip_on_receipt must not be negative".to_string(),
            ));
        }
        if self.decline_brand.is_some() && params.kind() == TransactionKind::Refund {
            return Err(FlowError::InvalidConfiguration(
                "a decline brand only applies to payments and setups".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_offline_behavior(self, offline_behavior: OfflineBehavior) -> Self {
        Self {
            offline_behavior,
            ..self
        }
    }
}
