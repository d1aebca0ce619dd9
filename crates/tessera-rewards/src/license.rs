use crate::error::{Result, RewardError};
use crate::storage::RewardStorage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_types::{AccountAddress, Epoch, LicenseId, TokenAmount};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Minimum seconds between node re-binds on one license.
pub const NODE_REBIND_COOLDOWN_SECS: i64 = 24 * 3600;

/// Two-phase destructive-operation marker. Admin initiates a transfer or
/// burn; only the holder can execute it, so a single compromised key cannot
/// destroy a license outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicensePhase {
    Normal,
    TransferPending(AccountAddress),
    BurnPending,
    Burned,
}

/// Claim-lifecycle position derived from the ledger fields, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VestingState {
    Unclaimable,
    Vesting,
    FullyVested,
    Burned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    /// Total vestable amount, fixed at creation.
    pub assigned: TokenAmount,
    /// Cumulative curve release to date; never exceeds `assigned`.
    pub released: TokenAmount,
    /// Sum ever paid out (immediate + carryover); never exceeds `released`.
    pub claimed: TokenAmount,
    /// Adoption withholding buffer: released but not yet paid out.
    pub awb: TokenAmount,
    pub cliff_epoch: Epoch,
    /// Highest epoch settled by a claim; `None` until the first claim.
    pub last_claimed_epoch: Option<Epoch>,
    pub node: Option<AccountAddress>,
    /// Timestamp of the last binding change; `None` until the first bind.
    pub node_changed_at: Option<i64>,
    pub banned: bool,
    pub phase: LicensePhase,
}

impl License {
    pub fn new(id: LicenseId, assigned: TokenAmount, cliff_epoch: Epoch) -> Self {
        Self {
            id,
            assigned,
            released: TokenAmount::ZERO,
            claimed: TokenAmount::ZERO,
            awb: TokenAmount::ZERO,
            cliff_epoch,
            last_claimed_epoch: None,
            node: None,
            node_changed_at: None,
            banned: false,
            phase: LicensePhase::Normal,
        }
    }

    pub fn remaining(&self) -> TokenAmount {
        self.assigned.saturating_sub(self.released)
    }

    pub fn is_burned(&self) -> bool {
        self.phase == LicensePhase::Burned
    }

    pub fn vesting_state(&self, current_epoch: Epoch, curve_duration: u64) -> VestingState {
        if self.is_burned() {
            return VestingState::Burned;
        }
        if current_epoch < self.cliff_epoch {
            return VestingState::Unclaimable;
        }
        if self.remaining().is_zero() || current_epoch >= self.cliff_epoch + curve_duration {
            return VestingState::FullyVested;
        }
        VestingState::Vesting
    }
}

/// Manager over the persisted license records with a write-through cache.
pub struct LicenseLedger {
    storage: Arc<dyn RewardStorage>,
    cache: Arc<RwLock<HashMap<LicenseId, License>>>,
}

impl LicenseLedger {
    pub fn new(storage: Arc<dyn RewardStorage>) -> Self {
        Self {
            storage,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(
        &self,
        id: LicenseId,
        assigned: TokenAmount,
        cliff_epoch: Epoch,
    ) -> Result<License> {
        if self.get(id).await.is_ok() {
            return Err(RewardError::LicenseExists(id));
        }
        let license = License::new(id, assigned, cliff_epoch);
        self.commit(license.clone()).await?;
        info!(
            license = %id,
            assigned = %assigned,
            cliff = cliff_epoch,
            "License created"
        );
        Ok(license)
    }

    pub async fn get(&self, id: LicenseId) -> Result<License> {
        {
            let cache = self.cache.read().await;
            if let Some(license) = cache.get(&id) {
                return Ok(license.clone());
            }
        }
        let license = self
            .storage
            .load_license(id)
            .await?
            .ok_or(RewardError::UnknownLicense(id))?;
        let mut cache = self.cache.write().await;
        cache.insert(id, license.clone());
        Ok(license)
    }

    pub async fn commit(&self, license: License) -> Result<()> {
        self.storage.store_license(&license).await?;
        let mut cache = self.cache.write().await;
        cache.insert(license.id, license);
        Ok(())
    }

    pub async fn all_ids(&self) -> Result<Vec<LicenseId>> {
        self.storage.all_license_ids().await
    }

    pub async fn bind_node(&self, id: LicenseId, node: AccountAddress, now: i64) -> Result<()> {
        let mut license = self.get(id).await?;
        if license.is_burned() {
            return Err(RewardError::LicenseBurned);
        }
        if license.node.is_some() {
            return Err(RewardError::NodeAlreadyBound);
        }
        if let Some(changed_at) = license.node_changed_at {
            if now - changed_at < NODE_REBIND_COOLDOWN_SECS {
                return Err(RewardError::RebindCooldown);
            }
        }
        license.node = Some(node);
        license.node_changed_at = Some(now);
        self.commit(license).await?;
        info!(license = %id, node = %node, "Node bound");
        Ok(())
    }

    pub async fn unbind_node(&self, id: LicenseId, now: i64) -> Result<()> {
        let mut license = self.get(id).await?;
        if license.node.is_none() {
            return Err(RewardError::NodeMismatch);
        }
        license.node = None;
        license.node_changed_at = Some(now);
        self.commit(license).await?;
        debug!(license = %id, "Node unbound");
        Ok(())
    }

    pub async fn set_banned(&self, id: LicenseId, banned: bool) -> Result<()> {
        let mut license = self.get(id).await?;
        license.banned = banned;
        self.commit(license).await?;
        info!(license = %id, banned, "Ban flag updated");
        Ok(())
    }

    pub async fn initiate_transfer(&self, id: LicenseId, target: AccountAddress) -> Result<()> {
        let mut license = self.get(id).await?;
        if license.is_burned() {
            return Err(RewardError::LicenseBurned);
        }
        if license.banned {
            return Err(RewardError::LicenseBanned);
        }
        if license.phase != LicensePhase::Normal {
            return Err(RewardError::ActionPending);
        }
        license.phase = LicensePhase::TransferPending(target);
        self.commit(license).await?;
        info!(license = %id, target = %target, "Transfer initiated");
        Ok(())
    }

    /// Returns the pending target; the caller moves ownership in the
    /// external registry.
    pub async fn execute_transfer(&self, id: LicenseId) -> Result<AccountAddress> {
        let mut license = self.get(id).await?;
        if license.banned {
            return Err(RewardError::LicenseBanned);
        }
        let target = match license.phase {
            LicensePhase::TransferPending(target) => target,
            _ => return Err(RewardError::NoPendingAction),
        };
        license.phase = LicensePhase::Normal;
        self.commit(license).await?;
        info!(license = %id, target = %target, "Transfer executed");
        Ok(target)
    }

    pub async fn initiate_burn(&self, id: LicenseId) -> Result<()> {
        let mut license = self.get(id).await?;
        if license.is_burned() {
            return Err(RewardError::LicenseBurned);
        }
        if license.phase != LicensePhase::Normal {
            return Err(RewardError::ActionPending);
        }
        license.phase = LicensePhase::BurnPending;
        self.commit(license).await?;
        info!(license = %id, "Burn initiated");
        Ok(())
    }

    pub async fn execute_burn(&self, id: LicenseId) -> Result<()> {
        let mut license = self.get(id).await?;
        if license.phase != LicensePhase::BurnPending {
            return Err(RewardError::NoPendingAction);
        }
        license.phase = LicensePhase::Burned;
        license.node = None;
        self.commit(license).await?;
        info!(license = %id, "Burn executed");
        Ok(())
    }

    pub async fn cancel_pending(&self, id: LicenseId) -> Result<()> {
        let mut license = self.get(id).await?;
        match license.phase {
            LicensePhase::TransferPending(_) | LicensePhase::BurnPending => {
                license.phase = LicensePhase::Normal;
            }
            _ => return Err(RewardError::NoPendingAction),
        }
        self.commit(license).await?;
        debug!(license = %id, "Pending action cancelled");
        Ok(())
    }

    /// Repair pass for drift introduced by historical bookkeeping errors:
    /// restores the ledger invariants `released <= assigned` and
    /// `claimed + awb <= released`. Availability history is not retained, so
    /// this clamps rather than replays.
    pub async fn reconcile(&self, id: LicenseId) -> Result<License> {
        let mut license = self.get(id).await?;
        let before = (license.released, license.claimed, license.awb);

        license.released = license.released.min(license.assigned);
        if license.claimed > license.released {
            license.claimed = license.released;
        }
        let awb_ceiling = license.released.saturating_sub(license.claimed);
        if license.awb > awb_ceiling {
            license.awb = awb_ceiling;
        }

        if before != (license.released, license.claimed, license.awb) {
            info!(
                license = %id,
                released = %license.released,
                claimed = %license.claimed,
                awb = %license.awb,
                "Ledger reconciled"
            );
        }
        self.commit(license.clone()).await?;
        Ok(license)
    }
}
