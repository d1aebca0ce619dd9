use crate::error::{Result, RewardError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_types::Epoch;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Full adoption score on the same 0-255 scale availabilities use.
pub const ADOPTION_FULL: u8 = 255;

/// One monotonic checkpoint series: cumulative totals keyed by epoch,
/// queried with step-function forward-fill. Epochs strictly increase,
/// totals never decrease.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointSeries {
    points: BTreeMap<Epoch, u128>,
}

impl CheckpointSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Add `amount` at `epoch`. Zero amounts are no-ops; recording at the
    /// latest epoch accumulates onto it; recording into the past is
    /// rejected.
    pub fn record(&mut self, epoch: Epoch, amount: u128) -> Result<u128> {
        if amount == 0 {
            return Ok(self.latest_total());
        }
        let total = match self.points.last_key_value() {
            Some((&last_epoch, &last_total)) => {
                if epoch < last_epoch {
                    return Err(RewardError::InvalidEpochOrder);
                }
                last_total.saturating_add(amount)
            }
            None => amount,
        };
        self.points.insert(epoch, total);
        Ok(total)
    }

    /// One-time bulk load of (epoch, cumulative total) pairs, usable only
    /// while the series is empty.
    pub fn initialize(&mut self, epochs: &[Epoch], totals: &[u128]) -> Result<()> {
        if !self.points.is_empty() {
            return Err(RewardError::AlreadySet);
        }
        if epochs.len() != totals.len() || epochs.is_empty() {
            return Err(RewardError::IncorrectParams);
        }
        for window in epochs.windows(2) {
            if window[1] <= window[0] {
                return Err(RewardError::InvalidEpochOrder);
            }
        }
        for window in totals.windows(2) {
            if window[1] < window[0] {
                return Err(RewardError::InvalidTotalsOrder);
            }
        }
        for (&epoch, &total) in epochs.iter().zip(totals.iter()) {
            self.points.insert(epoch, total);
        }
        Ok(())
    }

    /// Cumulative total at the latest checkpoint with key <= `epoch`, or 0
    /// before the first checkpoint.
    pub fn at(&self, epoch: Epoch) -> u128 {
        self.points
            .range(..=epoch)
            .next_back()
            .map(|(_, &total)| total)
            .unwrap_or(0)
    }

    /// Forward-filled totals for every epoch in `[from, to]` inclusive.
    pub fn range(&self, from: Epoch, to: Epoch) -> Result<Vec<u128>> {
        if from > to {
            return Err(RewardError::InvalidEpochRange);
        }
        Ok((from..=to).map(|epoch| self.at(epoch)).collect())
    }

    fn latest_total(&self) -> u128 {
        self.points
            .last_key_value()
            .map(|(_, &total)| total)
            .unwrap_or(0)
    }
}

/// Thresholds against which each series is normalized to 0-255. A raised
/// threshold lowers future percentages for the same recorded totals; claims
/// already settled are never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionThresholds {
    pub sales_full_release: u128,
    pub volume_full_release: u128,
    /// When set, the volume series is normalized over a trailing window of
    /// this many epochs instead of its cumulative total.
    pub volume_window: Option<u64>,
}

impl AdoptionThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.sales_full_release == 0 || self.volume_full_release == 0 {
            return Err(RewardError::InvalidConfiguration(
                "full-release thresholds must be non-zero".into(),
            ));
        }
        if self.volume_window == Some(0) {
            return Err(RewardError::InvalidConfiguration(
                "volume window must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// The two independent adoption series (licenses sold, aggregate volume)
/// plus the thresholds combining them into a single adoption percentage.
pub struct AdoptionTracker {
    sales: Arc<RwLock<CheckpointSeries>>,
    volume: Arc<RwLock<CheckpointSeries>>,
    thresholds: Arc<RwLock<AdoptionThresholds>>,
}

impl AdoptionTracker {
    pub fn new(thresholds: AdoptionThresholds) -> Self {
        Self {
            sales: Arc::new(RwLock::new(CheckpointSeries::new())),
            volume: Arc::new(RwLock::new(CheckpointSeries::new())),
            thresholds: Arc::new(RwLock::new(thresholds)),
        }
    }

    pub async fn record_sales(&self, epoch: Epoch, amount: u128) -> Result<()> {
        let total = self.sales.write().await.record(epoch, amount)?;
        debug!(epoch, amount, total, "Sales checkpoint recorded");
        Ok(())
    }

    pub async fn record_volume(&self, epoch: Epoch, amount: u128) -> Result<()> {
        let total = self.volume.write().await.record(epoch, amount)?;
        debug!(epoch, amount, total, "Volume checkpoint recorded");
        Ok(())
    }

    pub async fn initialize_sales(&self, epochs: &[Epoch], totals: &[u128]) -> Result<()> {
        self.sales.write().await.initialize(epochs, totals)?;
        info!(points = epochs.len(), "Sales series initialized");
        Ok(())
    }

    pub async fn initialize_volume(&self, epochs: &[Epoch], totals: &[u128]) -> Result<()> {
        self.volume.write().await.initialize(epochs, totals)?;
        info!(points = epochs.len(), "Volume series initialized");
        Ok(())
    }

    pub async fn sales_at(&self, epoch: Epoch) -> u128 {
        self.sales.read().await.at(epoch)
    }

    pub async fn volume_at(&self, epoch: Epoch) -> u128 {
        self.volume.read().await.at(epoch)
    }

    pub async fn sales_range(&self, from: Epoch, to: Epoch) -> Result<Vec<u128>> {
        self.sales.read().await.range(from, to)
    }

    pub async fn volume_range(&self, from: Epoch, to: Epoch) -> Result<Vec<u128>> {
        self.volume.read().await.range(from, to)
    }

    pub async fn set_sales_threshold(&self, threshold: u128) -> Result<()> {
        let mut thresholds = self.thresholds.write().await;
        let updated = AdoptionThresholds {
            sales_full_release: threshold,
            ..thresholds.clone()
        };
        updated.validate()?;
        *thresholds = updated;
        info!(threshold, "Sales full-release threshold updated");
        Ok(())
    }

    pub async fn set_volume_threshold(&self, threshold: u128, window: Option<u64>) -> Result<()> {
        let mut thresholds = self.thresholds.write().await;
        let updated = AdoptionThresholds {
            volume_full_release: threshold,
            volume_window: window,
            ..thresholds.clone()
        };
        updated.validate()?;
        *thresholds = updated;
        info!(threshold, ?window, "Volume full-release threshold updated");
        Ok(())
    }

    /// Combined adoption percentage at `epoch`: each series normalized
    /// against its own threshold as `min(255, 255 * total / threshold)`,
    /// then combined with the minimum of the two. Minimum is the documented
    /// choice: it is monotone in both series and the most conservative rule.
    pub async fn adoption_at(&self, epoch: Epoch) -> u8 {
        let thresholds = self.thresholds.read().await;

        let sales_total = self.sales.read().await.at(epoch);
        let sales_score = normalize(sales_total, thresholds.sales_full_release);

        let volume = self.volume.read().await;
        let volume_total = match thresholds.volume_window {
            Some(window) => {
                // Trailing window covers (epoch - window, epoch].
                let prior = if epoch >= window {
                    volume.at(epoch - window)
                } else {
                    0
                };
                volume.at(epoch).saturating_sub(prior)
            }
            None => volume.at(epoch),
        };
        let volume_score = normalize(volume_total, thresholds.volume_full_release);

        sales_score.min(volume_score)
    }
}

fn normalize(total: u128, threshold: u128) -> u8 {
    if threshold == 0 {
        return ADOPTION_FULL;
    }
    let scaled = total.saturating_mul(ADOPTION_FULL as u128) / threshold;
    scaled.min(ADOPTION_FULL as u128) as u8
}
