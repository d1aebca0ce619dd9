use crate::error::{Result, RewardError};
use crate::license::License;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tessera_types::{Epoch, TokenAmount};

/// Hard bound on epochs per claim call.
pub const MAX_CLAIM_EPOCHS: usize = 100;

pub const RATE_SCALE: u128 = 1_000_000_000; // parts per billion

/// Cumulative vesting schedule over elapsed epochs since the cliff.
///
/// Contract: `cumulative(assigned, 0) == 0`, monotone non-decreasing in
/// `elapsed`, and `cumulative(assigned, e) == assigned` for all
/// `e >= duration()` (flat plateau).
///
/// The schedule is a pluggable strategy: deployments configure the shape,
/// and nothing else in the engine assumes a closed form.
pub trait VestingCurve: Send + Sync {
    fn duration(&self) -> u64;
    fn cumulative(&self, assigned: TokenAmount, elapsed: u64) -> TokenAmount;
}

/// Releases a constant fraction of the remaining allowance each epoch, so
/// the marginal release decays geometrically; past the duration the
/// plateau lands exactly on `assigned`.
#[derive(Debug)]
pub struct HalfLifeCurve {
    rate_ppb: u128,
    duration: u64,
    /// Remaining-fraction prefix on the `RATE_SCALE` scale: `fractions[e]`
    /// is the unreleased fraction after `e` epochs. Independent of the
    /// assigned amount and extended on demand, so repeated queries are
    /// O(1) amortized instead of O(elapsed) per call.
    fractions: Mutex<Vec<u128>>,
}

impl HalfLifeCurve {
    pub fn new(rate_ppb: u128, duration: u64) -> Result<Self> {
        if rate_ppb == 0 || rate_ppb > RATE_SCALE || duration == 0 {
            return Err(RewardError::InvalidConfiguration(
                "curve rate must be in (0, 10^9] and duration non-zero".into(),
            ));
        }
        Ok(Self {
            rate_ppb,
            duration,
            fractions: Mutex::new(vec![RATE_SCALE]),
        })
    }

    fn fraction_at(&self, elapsed: u64) -> u128 {
        let keep = RATE_SCALE - self.rate_ppb;
        let mut fractions = self
            .fractions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while fractions.len() <= elapsed as usize {
            let last = fractions[fractions.len() - 1];
            fractions.push(last * keep / RATE_SCALE);
        }
        fractions[elapsed as usize]
    }
}

impl VestingCurve for HalfLifeCurve {
    fn duration(&self) -> u64 {
        self.duration
    }

    fn cumulative(&self, assigned: TokenAmount, elapsed: u64) -> TokenAmount {
        if elapsed >= self.duration {
            return assigned;
        }
        // The cached fraction sequence is non-increasing, so the release
        // is monotone in `elapsed` for every assigned amount.
        let frac = self.fraction_at(elapsed);
        assigned.saturating_sub(assigned.mul_div(frac, RATE_SCALE))
    }
}

/// Equal release every epoch across the duration.
#[derive(Debug)]
pub struct LinearCurve {
    duration: u64,
}

impl LinearCurve {
    pub fn new(duration: u64) -> Result<Self> {
        if duration == 0 {
            return Err(RewardError::InvalidConfiguration(
                "curve duration must be non-zero".into(),
            ));
        }
        Ok(Self { duration })
    }
}

impl VestingCurve for LinearCurve {
    fn duration(&self) -> u64 {
        self.duration
    }

    fn cumulative(&self, assigned: TokenAmount, elapsed: u64) -> TokenAmount {
        if elapsed >= self.duration {
            return assigned;
        }
        assigned.mul_div(elapsed as u128, self.duration as u128)
    }
}

/// Explicit sampled cumulative schedule, forward-filled between samples.
/// Used for deployments whose schedule is produced off-line.
#[derive(Debug)]
pub struct TableCurve {
    points: BTreeMap<u64, TokenAmount>,
    duration: u64,
}

impl TableCurve {
    pub fn new(points: Vec<(u64, TokenAmount)>, duration: u64) -> Result<Self> {
        if duration == 0 || points.is_empty() {
            return Err(RewardError::InvalidConfiguration(
                "table curve needs samples and a non-zero duration".into(),
            ));
        }
        let mut map = BTreeMap::new();
        let mut last_elapsed = None;
        let mut last_value = TokenAmount::ZERO;
        for (elapsed, value) in points {
            if elapsed == 0 && !value.is_zero() {
                return Err(RewardError::InvalidConfiguration(
                    "cumulative release at elapsed 0 must be zero".into(),
                ));
            }
            if let Some(prev) = last_elapsed {
                if elapsed <= prev {
                    return Err(RewardError::InvalidEpochOrder);
                }
            }
            if value < last_value {
                return Err(RewardError::InvalidTotalsOrder);
            }
            if elapsed >= duration {
                return Err(RewardError::InvalidConfiguration(
                    "table samples must precede the plateau".into(),
                ));
            }
            last_elapsed = Some(elapsed);
            last_value = value;
            map.insert(elapsed, value);
        }
        Ok(Self {
            points: map,
            duration,
        })
    }
}

impl VestingCurve for TableCurve {
    fn duration(&self) -> u64 {
        self.duration
    }

    fn cumulative(&self, assigned: TokenAmount, elapsed: u64) -> TokenAmount {
        if elapsed >= self.duration {
            return assigned;
        }
        self.points
            .range(..=elapsed)
            .next_back()
            .map(|(_, &value)| value.min(assigned))
            .unwrap_or(TokenAmount::ZERO)
    }
}

/// Availability-weighted release for one claim window.
#[derive(Debug, Clone)]
pub struct CurveOutcome {
    /// Post-clamp weighted marginal per requested epoch, zero entries
    /// included so the gate can weight each epoch by its own adoption.
    pub marginals: Vec<(Epoch, TokenAmount)>,
    pub total: TokenAmount,
    pub max_epoch: Epoch,
}

/// Compute the curve release for `epochs`/`availabilities` against a
/// license. Epochs at or before `last_claimed_epoch` (or before the cliff)
/// contribute zero, which makes resubmission of processed epochs a safe
/// no-op. The running total is clamped to the license's remaining
/// allowance.
pub fn weighted_release(
    curve: &dyn VestingCurve,
    license: &License,
    epochs: &[Epoch],
    availabilities: &[u8],
) -> Result<CurveOutcome> {
    if epochs.is_empty()
        || epochs.len() != availabilities.len()
        || epochs.len() > MAX_CLAIM_EPOCHS
    {
        return Err(RewardError::IncorrectParams);
    }
    for window in epochs.windows(2) {
        if window[1] <= window[0] {
            return Err(RewardError::IncorrectParams);
        }
    }

    let allowance = license.remaining();
    let mut marginals = Vec::with_capacity(epochs.len());
    let mut total = TokenAmount::ZERO;

    for (&epoch, &availability) in epochs.iter().zip(availabilities.iter()) {
        let mut weighted = TokenAmount::ZERO;
        let unprocessed = license.last_claimed_epoch.map_or(true, |last| epoch > last);
        if unprocessed && epoch >= license.cliff_epoch {
            let elapsed = epoch - license.cliff_epoch + 1;
            let marginal = curve
                .cumulative(license.assigned, elapsed)
                .saturating_sub(curve.cumulative(license.assigned, elapsed - 1));
            weighted = marginal.mul_div(availability as u128, 255);
            let headroom = allowance.saturating_sub(total);
            weighted = weighted.min(headroom);
        }
        total = total.saturating_add(weighted);
        marginals.push((epoch, weighted));
    }

    Ok(CurveOutcome {
        marginals,
        total,
        max_epoch: epochs[epochs.len() - 1],
    })
}
