use crate::checkpoint::AdoptionThresholds;
use crate::clock::EpochClock;
use crate::error::{Result, RewardError};
use serde::{Deserialize, Serialize};
use tessera_types::{AccountAddress, LicenseId};

pub const SHARE_SCALE_BPS: u16 = 10_000;

/// Company wallet receiving a fixed share of the genesis license's rewards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisWallet {
    pub address: AccountAddress,
    pub share_bps: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub admin: AccountAddress,
    /// Per-claim carryover release cap, on the 0-255 scale.
    pub max_carryover_factor: u8,
    pub thresholds: AdoptionThresholds,
    pub clock: EpochClock,
    /// The designated license whose rewards route to `genesis_wallets`
    /// instead of its holder.
    pub genesis_license: Option<LicenseId>,
    pub genesis_wallets: Vec<GenesisWallet>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;

        if self.genesis_license.is_some() {
            if self.genesis_wallets.is_empty() {
                return Err(RewardError::InvalidConfiguration(
                    "genesis license configured without company wallets".into(),
                ));
            }
            let total: u32 = self
                .genesis_wallets
                .iter()
                .map(|wallet| wallet.share_bps as u32)
                .sum();
            if total != SHARE_SCALE_BPS as u32 {
                return Err(RewardError::InvalidConfiguration(format!(
                    "genesis wallet shares must sum to {} bps, got {}",
                    SHARE_SCALE_BPS, total
                )));
            }
        } else if !self.genesis_wallets.is_empty() {
            return Err(RewardError::InvalidConfiguration(
                "company wallets configured without a genesis license".into(),
            ));
        }
        Ok(())
    }
}
