use crate::error::{Result, RewardError};
use serde::{Deserialize, Serialize};
use tessera_types::Epoch;

/// Maps wall-clock time onto the epoch sequence:
/// `epoch = floor((now - start) / epoch_duration)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpochClock {
    pub start_timestamp: i64,
    pub epoch_duration_secs: i64,
}

impl EpochClock {
    pub fn new(start_timestamp: i64, epoch_duration_secs: i64) -> Result<Self> {
        if epoch_duration_secs <= 0 {
            return Err(RewardError::InvalidConfiguration(
                "epoch duration must be positive".into(),
            ));
        }
        Ok(Self {
            start_timestamp,
            epoch_duration_secs,
        })
    }

    pub fn epoch_at(&self, timestamp: i64) -> Epoch {
        if timestamp < self.start_timestamp {
            return 0;
        }
        ((timestamp - self.start_timestamp) / self.epoch_duration_secs) as Epoch
    }

    pub fn current_epoch(&self) -> Epoch {
        self.epoch_at(chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_mapping() {
        let clock = EpochClock::new(1_000, 60).unwrap();
        assert_eq!(clock.epoch_at(999), 0);
        assert_eq!(clock.epoch_at(1_000), 0);
        assert_eq!(clock.epoch_at(1_059), 0);
        assert_eq!(clock.epoch_at(1_060), 1);
        assert_eq!(clock.epoch_at(1_000 + 60 * 227), 227);
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(EpochClock::new(0, 0).is_err());
    }
}
