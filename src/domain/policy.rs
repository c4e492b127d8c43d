use super::intent::CardBrand;

/// What the flow should do with a payment method that was just collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineDecision {
    Allow,
    /// Discard the collected method and restart the flow from `create`.
    Retry,
    /// Cancel the intent and end the run.
    RejectTerminal,
}

/// Decline policy. Must run after a successful collect and before confirm.
pub fn evaluate_decline(
    collected: Option<CardBrand>,
    rejected: Option<CardBrand>,
    retry_on_decline: bool,
) -> DeclineDecision {
    match (collected, rejected) {
        (Some(collected), Some(rejected)) if collected == rejected => {
            if retry_on_decline {
                DeclineDecision::Retry
            } else {
                DeclineDecision::RejectTerminal
            }
        }
        _ => DeclineDecision::Allow,
    }
}
