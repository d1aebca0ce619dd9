use crate::checkpoint::AdoptionTracker;
use crate::curve::CurveOutcome;
use crate::license::License;
use tessera_types::TokenAmount;
use tracing::debug;

/// Split of one claim's curve release into immediate payout, newly withheld
/// buffer, and released carryover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub immediate: TokenAmount,
    pub withheld: TokenAmount,
    pub carryover: TokenAmount,
    pub awb_after: TokenAmount,
}

impl GateOutcome {
    pub fn payout(&self) -> TokenAmount {
        self.immediate.saturating_add(self.carryover)
    }
}

/// Apply the adoption gate to a curve outcome.
///
/// Each epoch's weighted marginal is split at that epoch's adoption
/// percentage: `immediate = marginal * p / 255`, the rest joins the
/// withholding buffer. Carryover is then evaluated once at the adoption
/// percentage of the claim's highest epoch: the buffer above
/// `released * (255 - p) / 255` (the buffer implied had adoption always
/// been at the current level, with `released` the cumulative curve release
/// including this claim) is eligible, capped per claim at
/// `released * max_carryover_factor / 255`. Falling adoption only shrinks
/// future releases; it never claws back.
pub async fn apply_gate(
    tracker: &AdoptionTracker,
    license: &License,
    outcome: &CurveOutcome,
    max_carryover_factor: u8,
) -> GateOutcome {
    let mut immediate = TokenAmount::ZERO;
    let mut withheld = TokenAmount::ZERO;

    for &(epoch, marginal) in &outcome.marginals {
        if marginal.is_zero() {
            continue;
        }
        let adoption = tracker.adoption_at(epoch).await;
        let paid = marginal.mul_div(adoption as u128, 255);
        immediate = immediate.saturating_add(paid);
        withheld = withheld.saturating_add(marginal.saturating_sub(paid));
    }

    let mut awb = license.awb.saturating_add(withheld);
    let released = license.released.saturating_add(outcome.total);

    let adoption_now = tracker.adoption_at(outcome.max_epoch).await;
    let target = released.mul_div(255 - adoption_now as u128, 255);
    let excess = awb.saturating_sub(target);
    let cap = released.mul_div(max_carryover_factor as u128, 255);
    let carryover = excess.min(cap);
    awb = awb.saturating_sub(carryover);

    debug!(
        license = %license.id,
        adoption = adoption_now,
        immediate = %immediate,
        withheld = %withheld,
        carryover = %carryover,
        awb = %awb,
        "Adoption gate applied"
    );

    GateOutcome {
        immediate,
        withheld,
        carryover,
        awb_after: awb,
    }
}
