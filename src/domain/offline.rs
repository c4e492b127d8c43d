use super::amount::{Amount, Currency};
use super::intent::TransactionIntent;
use super::run_config::OfflineBehavior;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Thresholds above which a transaction must go online. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LimitPair {
    pub single_transaction: Option<Decimal>,
    pub cumulative: Option<Decimal>,
}

/// Configured offline thresholds plus the offline totals the terminal reported when the
/// run was prepared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OfflineLimits {
    pub global: LimitPair,
    /// Overrides `global` for the listed currencies.
    pub per_currency: HashMap<Currency, LimitPair>,
    /// Sum of the offline transactions already stored on the reader, per currency.
    pub current_totals: HashMap<Currency, Decimal>,
}

impl OfflineLimits {
    pub fn limits_for(&self, currency: &Currency) -> LimitPair {
        self.per_currency
            .get(currency)
            .copied()
            .unwrap_or(self.global)
    }

    pub fn current_total(&self, currency: &Currency) -> Decimal {
        self.current_totals
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Effective offline behavior for a transaction of `amount` in `currency`.
    pub fn effective_behavior(
        &self,
        amount: Amount,
        currency: &Currency,
        default: OfflineBehavior,
    ) -> OfflineBehavior {
        let limits = self.limits_for(currency);
        effective_offline_behavior(
            amount.value(),
            limits.single_transaction,
            limits.cumulative,
            self.current_total(currency),
            default,
        )
    }
}

/// Forces `RequireOnline` when the amount reaches the single-transaction limit, or when it
/// would bring the stored offline total to the cumulative limit. Both bounds are inclusive,
/// and a total too large to represent counts as over the limit. Otherwise the caller's
/// default is returned unchanged.
pub fn effective_offline_behavior(
    amount: Decimal,
    single_transaction_limit: Option<Decimal>,
    cumulative_limit: Option<Decimal>,
    current_total: Decimal,
    default: OfflineBehavior,
) -> OfflineBehavior {
    let over_single = single_transaction_limit.is_some_and(|limit| amount >= limit);
    let over_cumulative = cumulative_limit.is_some_and(|limit| {
        current_total
            .checked_add(amount)
            .is_none_or(|total| total >= limit)
    });
    if over_single || over_cumulative {
        OfflineBehavior::RequireOnline
    } else {
        default
    }
}

/// A transaction authorized offline and waiting for upload, kept for later reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    pub recorded_at: DateTime<Utc>,
    pub reference: String,
    pub intent: TransactionIntent,
}

impl OfflineRecord {
    pub fn new(intent: &TransactionIntent) -> Self {
        Self {
            recorded_at: Utc::now(),
            reference: intent
                .reference()
                .map(str::to_string)
                .unwrap_or_else(|| intent.to_string()),
            intent: intent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        Currency::new("usd").unwrap()
    }

    #[test]
    fn test_single_limit_boundary_is_inclusive() {
        let at_limit = effective_offline_behavior(
            dec!(1000),
            Some(dec!(1000)),
            None,
            Decimal::ZERO,
            OfflineBehavior::PreferOnline,
        );
        assert_eq!(at_limit, OfflineBehavior::RequireOnline);

        let below = effective_offline_behavior(
            dec!(999),
            Some(dec!(1000)),
            None,
            Decimal::ZERO,
            OfflineBehavior::PreferOnline,
        );
        assert_eq!(below, OfflineBehavior::PreferOnline);
    }

    #[test]
    fn test_cumulative_limit_counts_current_total() {
        let behavior = effective_offline_behavior(
            dec!(100),
            Some(dec!(1000)),
            Some(dec!(5000)),
            dec!(4900),
            OfflineBehavior::ForceOffline,
        );
        assert_eq!(behavior, OfflineBehavior::RequireOnline);

        let behavior = effective_offline_behavior(
            dec!(99),
            Some(dec!(1000)),
            Some(dec!(5000)),
            dec!(4900),
            OfflineBehavior::ForceOffline,
        );
        assert_eq!(behavior, OfflineBehavior::ForceOffline);
    }

    #[test]
    fn test_cumulative_overflow_counts_as_over_limit() {
        let behavior = effective_offline_behavior(
            dec!(1),
            None,
            Some(Decimal::MAX),
            Decimal::MAX,
            OfflineBehavior::PreferOnline,
        );
        assert_eq!(behavior, OfflineBehavior::RequireOnline);
    }

    #[test]
    fn test_no_limits_keeps_default() {
        let limits = OfflineLimits::default();
        let amount = Amount::new(dec!(1_000_000)).unwrap();
        assert_eq!(
            limits.effective_behavior(amount, &usd(), OfflineBehavior::ForceOffline),
            OfflineBehavior::ForceOffline
        );
    }

    #[test]
    fn test_per_currency_override() {
        let mut limits = OfflineLimits {
            global: LimitPair {
                single_transaction: Some(dec!(1000)),
                cumulative: None,
            },
            ..Default::default()
        };
        limits.per_currency.insert(
            Currency::new("eur").unwrap(),
            LimitPair {
                single_transaction: Some(dec!(100)),
                cumulative: None,
            },
        );
        let amount = Amount::new(dec!(500)).unwrap();

        assert_eq!(
            limits.effective_behavior(amount, &usd(), OfflineBehavior::PreferOnline),
            OfflineBehavior::PreferOnline
        );
        assert_eq!(
            limits.effective_behavior(
                amount,
                &Currency::new("eur").unwrap(),
                OfflineBehavior::PreferOnline
            ),
            OfflineBehavior::RequireOnline
        );
    }

    #[test]
    fn test_totals_deserialize_by_currency() {
        let json = r#"{"global":{"cumulative":"2000"},"current_totals":{"usd":"1500"}}"#;
        let limits: OfflineLimits = serde_json::from_str(json).unwrap();
        assert_eq!(limits.current_total(&usd()), dec!(1500));
        let amount = Amount::new(dec!(500)).unwrap();
        assert_eq!(
            limits.effective_behavior(amount, &usd(), OfflineBehavior::PreferOnline),
            OfflineBehavior::RequireOnline
        );
    }
}
