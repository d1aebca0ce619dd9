use crate::attestation::{verify_attestations, Attestation, OracleRoster};
use crate::checkpoint::AdoptionTracker;
use crate::clock::EpochClock;
use crate::config::{EngineConfig, SHARE_SCALE_BPS};
use crate::curve::{weighted_release, CurveOutcome, VestingCurve};
use crate::error::{Result, RewardError};
use crate::gate::{apply_gate, GateOutcome};
use crate::license::{License, LicenseLedger, LicensePhase};
use crate::registry::{OwnershipRegistry, TokenIssuance};
use crate::storage::RewardStorage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_types::{AccountAddress, Epoch, LicenseId, TokenAmount};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub license_id: LicenseId,
    pub node: AccountAddress,
    pub epochs: Vec<Epoch>,
    pub availabilities: Vec<u8>,
    pub attestations: Vec<Attestation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimEvent {
    pub license_id: LicenseId,
    pub rewards_amount: TokenAmount,
    pub immediate: TokenAmount,
    pub carryover: TokenAmount,
    pub withheld: TokenAmount,
    pub claimed_through: Epoch,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    pub licenses: usize,
    pub total_assigned: TokenAmount,
    pub total_released: TokenAmount,
    pub total_claimed: TokenAmount,
    pub total_withheld: TokenAmount,
}

/// Facade wiring the ledger, curve, adoption tracker, gate, and the
/// external collaborators into the exposed claim and admin operations.
pub struct RewardEngine {
    pub ledger: Arc<LicenseLedger>,
    pub tracker: Arc<AdoptionTracker>,
    curve: Arc<dyn VestingCurve>,
    clock: EpochClock,
    ownership: Arc<dyn OwnershipRegistry>,
    issuance: Arc<dyn TokenIssuance>,
    roster: Arc<RwLock<OracleRoster>>,
    config: Arc<RwLock<EngineConfig>>,
    events: Arc<RwLock<Vec<ClaimEvent>>>,
    /// Serializes mutating claims: held across read, compute, mint, and
    /// commit so concurrent submissions settle one at a time.
    claim_lock: Mutex<()>,
}

struct ClaimComputation {
    license: License,
    curve_outcome: CurveOutcome,
    gate_outcome: GateOutcome,
}

impl RewardEngine {
    pub fn new(
        config: EngineConfig,
        curve: Arc<dyn VestingCurve>,
        storage: Arc<dyn RewardStorage>,
        ownership: Arc<dyn OwnershipRegistry>,
        issuance: Arc<dyn TokenIssuance>,
        roster: OracleRoster,
    ) -> Result<Self> {
        config.validate()?;
        let tracker = Arc::new(AdoptionTracker::new(config.thresholds.clone()));
        Ok(Self {
            ledger: Arc::new(LicenseLedger::new(storage)),
            tracker,
            curve,
            clock: config.clock,
            ownership,
            issuance,
            roster: Arc::new(RwLock::new(roster)),
            config: Arc::new(RwLock::new(config)),
            events: Arc::new(RwLock::new(Vec::new())),
            claim_lock: Mutex::new(()),
        })
    }

    // ---- claim path ----------------------------------------------------

    /// Verify, compute, and commit one claim; returns the emitted event.
    /// Claims are serialized under `claim_lock`, so two racing submissions
    /// for the same epochs settle once and once only.
    pub async fn claim_rewards(
        &self,
        caller: AccountAddress,
        request: &ClaimRequest,
    ) -> Result<ClaimEvent> {
        let _claims = self.claim_lock.lock().await;

        let computation = self.compute_claim(caller, request).await?;
        let ClaimComputation {
            mut license,
            curve_outcome,
            gate_outcome,
        } = computation;

        license.released = license.released.saturating_add(curve_outcome.total);
        license.awb = gate_outcome.awb_after;
        license.claimed = license.claimed.saturating_add(gate_outcome.payout());
        let claimed_through = match license.last_claimed_epoch {
            Some(last) => last.max(curve_outcome.max_epoch),
            None => curve_outcome.max_epoch,
        };
        license.last_claimed_epoch = Some(claimed_through);
        let license_id = license.id;

        // Mint before persisting: a failed mint must leave the ledger
        // untouched so the holder can resubmit.
        self.pay_out(license_id, caller, gate_outcome.payout()).await?;
        self.ledger.commit(license).await?;

        let event = ClaimEvent {
            license_id,
            rewards_amount: gate_outcome.payout(),
            immediate: gate_outcome.immediate,
            carryover: gate_outcome.carryover,
            withheld: gate_outcome.withheld,
            claimed_through,
            timestamp: chrono::Utc::now().timestamp(),
        };
        self.events.write().await.push(event.clone());
        info!(
            license = %license_id,
            rewards = %event.rewards_amount,
            carryover = %event.carryover,
            through = claimed_through,
            "Claim settled"
        );
        Ok(event)
    }

    /// Pure preview: identical computation, no mutation, no payout.
    pub async fn calculate_rewards(
        &self,
        caller: AccountAddress,
        request: &ClaimRequest,
    ) -> Result<TokenAmount> {
        let computation = self.compute_claim(caller, request).await?;
        Ok(computation.gate_outcome.payout())
    }

    async fn compute_claim(
        &self,
        caller: AccountAddress,
        request: &ClaimRequest,
    ) -> Result<ClaimComputation> {
        let license = self.ledger.get(request.license_id).await?;
        if license.is_burned() {
            return Err(RewardError::LicenseBurned);
        }
        if license.banned {
            return Err(RewardError::LicenseBanned);
        }

        let owner = self.ownership.owner_of(request.license_id).await?;
        if owner != caller {
            return Err(RewardError::NotOwner);
        }
        if license.node != Some(request.node) {
            return Err(RewardError::NodeMismatch);
        }

        let current = self.clock.current_epoch();
        if let Some(&last) = request.epochs.last() {
            if last > current {
                return Err(RewardError::FutureEpoch {
                    epoch: last,
                    current,
                });
            }
        }

        let digest =
            tessera_crypto::report_digest(&request.node, &request.epochs, &request.availabilities);
        {
            let roster = self.roster.read().await;
            verify_attestations(&roster, &digest, &request.attestations)?;
        }

        let curve_outcome =
            weighted_release(self.curve.as_ref(), &license, &request.epochs, &request.availabilities)?;

        let factor = self.config.read().await.max_carryover_factor;
        let gate_outcome = apply_gate(&self.tracker, &license, &curve_outcome, factor).await;

        Ok(ClaimComputation {
            license,
            curve_outcome,
            gate_outcome,
        })
    }

    /// Mint the payout. The genesis license routes to the configured
    /// company wallets by share instead of the caller; the final wallet
    /// absorbs the division remainder so the split conserves the payout.
    async fn pay_out(
        &self,
        license_id: LicenseId,
        caller: AccountAddress,
        payout: TokenAmount,
    ) -> Result<()> {
        if payout.is_zero() {
            return Ok(());
        }
        let config = self.config.read().await;
        if config.genesis_license == Some(license_id) {
            let mut distributed = TokenAmount::ZERO;
            let last = config.genesis_wallets.len() - 1;
            for (index, wallet) in config.genesis_wallets.iter().enumerate() {
                let share = if index == last {
                    payout.saturating_sub(distributed)
                } else {
                    payout.mul_div(wallet.share_bps as u128, SHARE_SCALE_BPS as u128)
                };
                distributed = distributed.saturating_add(share);
                self.issuance.mint(wallet.address, share).await?;
            }
        } else {
            self.issuance.mint(caller, payout).await?;
        }
        Ok(())
    }

    // ---- checkpoint views ----------------------------------------------

    pub async fn licenses_sold_at(&self, epoch: Epoch) -> u128 {
        self.tracker.sales_at(epoch).await
    }

    pub async fn volume_at(&self, epoch: Epoch) -> u128 {
        self.tracker.volume_at(epoch).await
    }

    pub async fn licenses_sold_range(&self, from: Epoch, to: Epoch) -> Result<Vec<u128>> {
        self.tracker.sales_range(from, to).await
    }

    pub async fn volume_range(&self, from: Epoch, to: Epoch) -> Result<Vec<u128>> {
        self.tracker.volume_range(from, to).await
    }

    pub async fn adoption_at(&self, epoch: Epoch) -> u8 {
        self.tracker.adoption_at(epoch).await
    }

    pub fn current_epoch(&self) -> Epoch {
        self.clock.current_epoch()
    }

    // ---- admin operations ----------------------------------------------

    async fn ensure_admin(&self, caller: AccountAddress) -> Result<()> {
        if self.config.read().await.admin != caller {
            return Err(RewardError::AdminOnly);
        }
        Ok(())
    }

    pub async fn set_max_carryover_factor(
        &self,
        caller: AccountAddress,
        factor: u8,
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.config.write().await.max_carryover_factor = factor;
        info!(factor, "Max carryover release factor updated");
        Ok(())
    }

    pub async fn set_sales_threshold(
        &self,
        caller: AccountAddress,
        threshold: u128,
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.tracker.set_sales_threshold(threshold).await?;
        self.config.write().await.thresholds.sales_full_release = threshold;
        Ok(())
    }

    pub async fn set_volume_threshold(
        &self,
        caller: AccountAddress,
        threshold: u128,
        window: Option<u64>,
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.tracker.set_volume_threshold(threshold, window).await?;
        let mut config = self.config.write().await;
        config.thresholds.volume_full_release = threshold;
        config.thresholds.volume_window = window;
        Ok(())
    }

    pub async fn initialize_sales(
        &self,
        caller: AccountAddress,
        epochs: &[Epoch],
        totals: &[u128],
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.tracker.initialize_sales(epochs, totals).await
    }

    pub async fn initialize_volume(
        &self,
        caller: AccountAddress,
        epochs: &[Epoch],
        totals: &[u128],
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.tracker.initialize_volume(epochs, totals).await
    }

    pub async fn record_sales(
        &self,
        caller: AccountAddress,
        epoch: Epoch,
        amount: u128,
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.tracker.record_sales(epoch, amount).await
    }

    pub async fn record_volume(
        &self,
        caller: AccountAddress,
        epoch: Epoch,
        amount: u128,
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.tracker.record_volume(epoch, amount).await
    }

    pub async fn set_roster(&self, caller: AccountAddress, roster: OracleRoster) -> Result<()> {
        self.ensure_admin(caller).await?;
        let members = roster.members.len();
        let min = roster.min_signatures;
        *self.roster.write().await = roster;
        info!(members, min_signatures = min, "Oracle roster updated");
        Ok(())
    }

    pub async fn create_license(
        &self,
        caller: AccountAddress,
        id: LicenseId,
        owner: AccountAddress,
        assigned: TokenAmount,
        cliff_epoch: Epoch,
    ) -> Result<License> {
        self.ensure_admin(caller).await?;
        let license = self
            .ledger
            .create(id, assigned, cliff_epoch)
            .await?;
        self.ownership.set_owner(id, owner).await?;
        Ok(license)
    }

    pub async fn set_banned(
        &self,
        caller: AccountAddress,
        id: LicenseId,
        banned: bool,
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.ledger.set_banned(id, banned).await
    }

    pub async fn reconcile(&self, caller: AccountAddress, id: LicenseId) -> Result<License> {
        self.ensure_admin(caller).await?;
        self.ledger.reconcile(id).await
    }

    pub async fn initiate_transfer(
        &self,
        caller: AccountAddress,
        id: LicenseId,
        target: AccountAddress,
    ) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.ledger.initiate_transfer(id, target).await
    }

    /// Holder-triggered completion of a pending transfer. The registry is
    /// updated before the pending phase clears, so a failed registry write
    /// leaves the transfer pending and retryable.
    pub async fn execute_transfer(&self, caller: AccountAddress, id: LicenseId) -> Result<()> {
        let owner = self.ownership.owner_of(id).await?;
        if owner != caller {
            return Err(RewardError::NotOwner);
        }
        let license = self.ledger.get(id).await?;
        if license.banned {
            return Err(RewardError::LicenseBanned);
        }
        let target = match license.phase {
            LicensePhase::TransferPending(target) => target,
            _ => return Err(RewardError::NoPendingAction),
        };
        self.ownership.set_owner(id, target).await?;
        self.ledger.execute_transfer(id).await?;
        Ok(())
    }

    pub async fn initiate_burn(&self, caller: AccountAddress, id: LicenseId) -> Result<()> {
        self.ensure_admin(caller).await?;
        self.ledger.initiate_burn(id).await
    }

    /// Holder-triggered completion of a pending burn.
    pub async fn execute_burn(&self, caller: AccountAddress, id: LicenseId) -> Result<()> {
        let owner = self.ownership.owner_of(id).await?;
        if owner != caller {
            return Err(RewardError::NotOwner);
        }
        self.ledger.execute_burn(id).await
    }

    // ---- holder operations ---------------------------------------------

    pub async fn bind_node(
        &self,
        caller: AccountAddress,
        id: LicenseId,
        node: AccountAddress,
    ) -> Result<()> {
        let owner = self.ownership.owner_of(id).await?;
        if owner != caller {
            return Err(RewardError::NotOwner);
        }
        self.ledger
            .bind_node(id, node, chrono::Utc::now().timestamp())
            .await
    }

    pub async fn unbind_node(&self, caller: AccountAddress, id: LicenseId) -> Result<()> {
        let owner = self.ownership.owner_of(id).await?;
        if owner != caller {
            return Err(RewardError::NotOwner);
        }
        self.ledger
            .unbind_node(id, chrono::Utc::now().timestamp())
            .await
    }

    // ---- views ----------------------------------------------------------

    pub async fn license(&self, id: LicenseId) -> Result<License> {
        self.ledger.get(id).await
    }

    pub async fn claim_events(&self) -> Vec<ClaimEvent> {
        self.events.read().await.clone()
    }

    pub async fn metrics(&self) -> Result<EngineMetrics> {
        let ids = self.ledger.all_ids().await?;
        let mut metrics = EngineMetrics {
            licenses: ids.len(),
            ..Default::default()
        };
        for id in ids {
            let license = self.ledger.get(id).await?;
            metrics.total_assigned = metrics.total_assigned.saturating_add(license.assigned);
            metrics.total_released = metrics.total_released.saturating_add(license.released);
            metrics.total_claimed = metrics.total_claimed.saturating_add(license.claimed);
            metrics.total_withheld = metrics.total_withheld.saturating_add(license.awb);
        }
        Ok(metrics)
    }
}
