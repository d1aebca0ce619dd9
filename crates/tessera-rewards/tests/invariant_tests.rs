//! Conservation and monotonicity invariants across claim sequences.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_crypto::{report_digest, AttesterKeypair};
use tessera_rewards::{
    AdoptionThresholds, Attestation, ClaimRequest, EngineConfig, EpochClock, License,
    LicensePhase, LinearCurve, MemoryOwnershipRegistry, MemoryStorage, MemoryTokenIssuance,
    OracleRoster, OwnershipRegistry, RewardEngine, RewardError, TokenIssuance,
};
use tessera_types::{AccountAddress, Epoch, LicenseId, TokenAmount};

const ADMIN: AccountAddress = AccountAddress::from_bytes([0xAA; 32]);
const HOLDER: AccountAddress = AccountAddress::from_bytes([0x01; 32]);
const NODE: AccountAddress = AccountAddress::from_bytes([0x02; 32]);

fn engine_with(
    issuance: Arc<dyn TokenIssuance>,
    ownership: Arc<dyn OwnershipRegistry>,
    oracle: &AttesterKeypair,
) -> RewardEngine {
    RewardEngine::new(
        EngineConfig {
            admin: ADMIN,
            max_carryover_factor: 128,
            thresholds: AdoptionThresholds {
                sales_full_release: 255,
                volume_full_release: 255,
                volume_window: None,
            },
            clock: EpochClock::new(0, 1).unwrap(),
            genesis_license: None,
            genesis_wallets: vec![],
        },
        Arc::new(LinearCurve::new(20).unwrap()),
        Arc::new(MemoryStorage::new()),
        ownership,
        issuance,
        OracleRoster::new([oracle.public_key()], 1),
    )
    .unwrap()
}

fn engine(issuance: Arc<MemoryTokenIssuance>, oracle: &AttesterKeypair) -> RewardEngine {
    engine_with(issuance, Arc::new(MemoryOwnershipRegistry::new()), oracle)
}

/// Registry that yields at every lookup, like any collaborator backed by
/// real I/O, widening the interleaving window between racing claims.
struct YieldingRegistry {
    inner: MemoryOwnershipRegistry,
}

#[async_trait]
impl OwnershipRegistry for YieldingRegistry {
    async fn owner_of(&self, id: LicenseId) -> tessera_rewards::Result<AccountAddress> {
        tokio::task::yield_now().await;
        self.inner.owner_of(id).await
    }

    async fn set_owner(&self, id: LicenseId, owner: AccountAddress) -> tessera_rewards::Result<()> {
        tokio::task::yield_now().await;
        self.inner.set_owner(id, owner).await
    }
}

/// Issuance whose mint can be switched to fail, for abort-path coverage.
struct SwitchableIssuance {
    inner: MemoryTokenIssuance,
    fail: AtomicBool,
}

impl SwitchableIssuance {
    fn new() -> Self {
        Self {
            inner: MemoryTokenIssuance::new(),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TokenIssuance for SwitchableIssuance {
    async fn mint(&self, to: AccountAddress, amount: TokenAmount) -> tessera_rewards::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RewardError::Storage("mint unavailable".into()));
        }
        self.inner.mint(to, amount).await
    }
}

/// Registry whose owner writes can be switched to fail.
struct SwitchableRegistry {
    inner: MemoryOwnershipRegistry,
    fail_writes: AtomicBool,
}

impl SwitchableRegistry {
    fn new() -> Self {
        Self {
            inner: MemoryOwnershipRegistry::new(),
            fail_writes: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl OwnershipRegistry for SwitchableRegistry {
    async fn owner_of(&self, id: LicenseId) -> tessera_rewards::Result<AccountAddress> {
        self.inner.owner_of(id).await
    }

    async fn set_owner(&self, id: LicenseId, owner: AccountAddress) -> tessera_rewards::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RewardError::Storage("registry unavailable".into()));
        }
        self.inner.set_owner(id, owner).await
    }
}

fn signed_request(
    oracle: &AttesterKeypair,
    license_id: LicenseId,
    epochs: Vec<Epoch>,
    availabilities: Vec<u8>,
) -> ClaimRequest {
    let digest = report_digest(&NODE, &epochs, &availabilities);
    ClaimRequest {
        license_id,
        node: NODE,
        epochs,
        availabilities,
        attestations: vec![Attestation {
            signer: oracle.public_key(),
            signature: oracle.sign(&digest),
        }],
    }
}

fn assert_conservation(license: &License) {
    // claimed + AWB <= cumulative curve release <= assigned
    let held = license.claimed.saturating_add(license.awb);
    assert!(
        held <= license.released,
        "claimed {} + awb {} exceeds released {}",
        license.claimed,
        license.awb,
        license.released
    );
    assert!(license.released <= license.assigned);
}

#[tokio::test]
async fn test_conservation_across_claim_sequence() {
    let oracle = AttesterKeypair::generate();
    let issuance = Arc::new(MemoryTokenIssuance::new());
    let engine = engine(issuance.clone(), &oracle);

    let id = LicenseId::new(1);
    engine
        .create_license(ADMIN, id, HOLDER, TokenAmount::from_whole(1000), 0)
        .await
        .unwrap();
    engine.bind_node(HOLDER, id, NODE).await.unwrap();

    // Adoption climbs over time; availabilities vary per window.
    let schedule: [(Vec<Epoch>, Vec<u8>, u8); 4] = [
        (vec![0, 1, 2], vec![255, 200, 10], 0),
        (vec![3, 4], vec![130, 250], 64),
        (vec![5, 6, 7, 8], vec![0, 12, 178, 255], 192),
        (vec![9], vec![255], 255),
    ];

    for (epochs, availabilities, adoption) in schedule {
        let at = *epochs.first().unwrap();
        // Series only move forward; record the increment that lifts the
        // total to the target adoption value.
        let current = engine.licenses_sold_at(at).await;
        engine
            .record_sales(ADMIN, at, (adoption as u128).saturating_sub(current))
            .await
            .unwrap();
        let current = engine.volume_at(at).await;
        engine
            .record_volume(ADMIN, at, (adoption as u128).saturating_sub(current))
            .await
            .unwrap();

        let request = signed_request(&oracle, id, epochs, availabilities);
        engine.claim_rewards(HOLDER, &request).await.unwrap();

        let license = engine.license(id).await.unwrap();
        assert_conservation(&license);

        // Everything ever minted equals the license's claimed total.
        assert_eq!(issuance.total_minted().await, license.claimed);
    }
}

#[tokio::test]
async fn test_released_never_exceeds_assigned_under_saturation() {
    let oracle = AttesterKeypair::generate();
    let issuance = Arc::new(MemoryTokenIssuance::new());
    let engine = engine(issuance.clone(), &oracle);

    let id = LicenseId::new(1);
    // Tiny allowance: the 20-epoch linear curve would release far more.
    let assigned = TokenAmount::from_base_units(7);
    engine
        .create_license(ADMIN, id, HOLDER, assigned, 0)
        .await
        .unwrap();
    engine.bind_node(HOLDER, id, NODE).await.unwrap();
    engine.record_sales(ADMIN, 0, 255).await.unwrap();
    engine.record_volume(ADMIN, 0, 255).await.unwrap();

    let epochs: Vec<Epoch> = (0..20).collect();
    let availabilities = vec![255u8; 20];
    let request = signed_request(&oracle, id, epochs, availabilities);
    engine.claim_rewards(HOLDER, &request).await.unwrap();

    let license = engine.license(id).await.unwrap();
    assert_eq!(license.released, assigned);
    assert_conservation(&license);
    assert_eq!(issuance.total_minted().await, license.claimed);
}

#[tokio::test]
async fn test_checkpoint_monotonicity_under_interleaved_records() {
    let oracle = AttesterKeypair::generate();
    let engine = engine(Arc::new(MemoryTokenIssuance::new()), &oracle);

    engine.record_sales(ADMIN, 3, 5).await.unwrap();
    engine.record_sales(ADMIN, 3, 2).await.unwrap();
    engine.record_sales(ADMIN, 8, 1).await.unwrap();
    engine.record_volume(ADMIN, 1, 100).await.unwrap();

    let mut last = 0;
    for epoch in 0..12 {
        let value = engine.licenses_sold_at(epoch).await;
        assert!(value >= last, "sales regressed at epoch {}", epoch);
        last = value;
    }
    assert_eq!(engine.licenses_sold_at(3).await, 7);
    assert_eq!(engine.licenses_sold_at(11).await, 8);
}

#[tokio::test]
async fn test_carryover_never_exceeds_cap_over_random_walk() {
    let oracle = AttesterKeypair::generate();
    let issuance = Arc::new(MemoryTokenIssuance::new());
    let engine = engine(issuance.clone(), &oracle);

    let id = LicenseId::new(1);
    engine
        .create_license(ADMIN, id, HOLDER, TokenAmount::from_whole(500), 0)
        .await
        .unwrap();
    engine.bind_node(HOLDER, id, NODE).await.unwrap();

    // Adoption oscillates upward; cap factor is 128/255.
    let adoption_steps: [(Epoch, u8); 5] = [(0, 20), (2, 20), (4, 120), (6, 90), (8, 255)];
    let mut recorded = 0u128;
    for (epoch, adoption) in adoption_steps {
        let delta = (adoption as u128).saturating_sub(recorded);
        engine.record_sales(ADMIN, epoch, delta).await.unwrap();
        engine.record_volume(ADMIN, epoch, delta).await.unwrap();
        if delta > 0 {
            recorded = adoption as u128;
        }

        let avail = ((epoch * 37) % 256) as u8;
        let request = signed_request(&oracle, id, vec![epoch], vec![avail]);
        let event = engine.claim_rewards(HOLDER, &request).await.unwrap();

        let license = engine.license(id).await.unwrap();
        let cap = license.released.mul_div(128, 255);
        assert!(
            event.carryover <= cap,
            "carryover {} exceeded cap {} at epoch {}",
            event.carryover,
            cap,
            epoch
        );
        assert_conservation(&license);
    }
}

#[tokio::test]
async fn test_reconcile_restores_invariants() {
    let oracle = AttesterKeypair::generate();
    let engine = engine(Arc::new(MemoryTokenIssuance::new()), &oracle);

    let id = LicenseId::new(1);
    engine
        .create_license(ADMIN, id, HOLDER, TokenAmount::from_whole(100), 0)
        .await
        .unwrap();

    // Inject drift the way a historical double-subtraction would.
    let mut license = engine.license(id).await.unwrap();
    license.released = TokenAmount::from_whole(60);
    license.claimed = TokenAmount::from_whole(25);
    license.awb = TokenAmount::from_whole(90);
    engine.ledger.commit(license).await.unwrap();

    let repaired = engine.reconcile(ADMIN, id).await.unwrap();
    assert_conservation(&repaired);
    assert_eq!(repaired.awb, TokenAmount::from_whole(35));
}

#[tokio::test]
async fn test_concurrent_claims_settle_once() {
    let oracle = AttesterKeypair::generate();
    let issuance = Arc::new(MemoryTokenIssuance::new());
    let registry = Arc::new(YieldingRegistry {
        inner: MemoryOwnershipRegistry::new(),
    });
    let engine = engine_with(issuance.clone(), registry, &oracle);

    let id = LicenseId::new(1);
    engine
        .create_license(ADMIN, id, HOLDER, TokenAmount::from_whole(1000), 0)
        .await
        .unwrap();
    engine.bind_node(HOLDER, id, NODE).await.unwrap();
    engine.record_sales(ADMIN, 0, 255).await.unwrap();
    engine.record_volume(ADMIN, 0, 255).await.unwrap();

    // Two identical claims race; exactly one epoch's release may be paid.
    let request = signed_request(&oracle, id, vec![0], vec![255]);
    let (first, second) = tokio::join!(
        engine.claim_rewards(HOLDER, &request),
        engine.claim_rewards(HOLDER, &request)
    );
    let paid = first
        .unwrap()
        .rewards_amount
        .saturating_add(second.unwrap().rewards_amount);
    assert_eq!(paid, TokenAmount::from_whole(50));

    let license = engine.license(id).await.unwrap();
    assert_eq!(license.claimed, paid);
    assert_eq!(issuance.total_minted().await, license.claimed);
    assert_conservation(&license);
}

#[tokio::test]
async fn test_failed_mint_leaves_ledger_unchanged() {
    let oracle = AttesterKeypair::generate();
    let issuance = Arc::new(SwitchableIssuance::new());
    let engine = engine_with(
        issuance.clone(),
        Arc::new(MemoryOwnershipRegistry::new()),
        &oracle,
    );

    let id = LicenseId::new(1);
    engine
        .create_license(ADMIN, id, HOLDER, TokenAmount::from_whole(1000), 0)
        .await
        .unwrap();
    engine.bind_node(HOLDER, id, NODE).await.unwrap();
    engine.record_sales(ADMIN, 0, 255).await.unwrap();
    engine.record_volume(ADMIN, 0, 255).await.unwrap();

    issuance.fail.store(true, Ordering::SeqCst);
    let request = signed_request(&oracle, id, vec![0], vec![255]);
    let err = engine.claim_rewards(HOLDER, &request).await.unwrap_err();
    assert!(matches!(err, RewardError::Storage(_)));

    // The aborted call committed nothing.
    let license = engine.license(id).await.unwrap();
    assert_eq!(license.released, TokenAmount::ZERO);
    assert_eq!(license.claimed, TokenAmount::ZERO);
    assert_eq!(license.last_claimed_epoch, None);

    // A resubmission after the outage pays in full.
    issuance.fail.store(false, Ordering::SeqCst);
    let event = engine.claim_rewards(HOLDER, &request).await.unwrap();
    assert_eq!(event.rewards_amount, TokenAmount::from_whole(50));
    assert_eq!(issuance.inner.total_minted().await, TokenAmount::from_whole(50));
}

#[tokio::test]
async fn test_failed_owner_update_keeps_transfer_pending() {
    let oracle = AttesterKeypair::generate();
    let registry = Arc::new(SwitchableRegistry::new());
    let engine = engine_with(
        Arc::new(MemoryTokenIssuance::new()),
        registry.clone(),
        &oracle,
    );

    let id = LicenseId::new(1);
    engine
        .create_license(ADMIN, id, HOLDER, TokenAmount::from_whole(100), 0)
        .await
        .unwrap();

    let target = AccountAddress::from_bytes([0x55; 32]);
    engine.initiate_transfer(ADMIN, id, target).await.unwrap();

    registry.fail_writes.store(true, Ordering::SeqCst);
    let err = engine.execute_transfer(HOLDER, id).await.unwrap_err();
    assert!(matches!(err, RewardError::Storage(_)));
    // Ownership did not move and the transfer is still pending.
    assert_eq!(registry.owner_of(id).await.unwrap(), HOLDER);
    assert_eq!(
        engine.license(id).await.unwrap().phase,
        LicensePhase::TransferPending(target)
    );

    registry.fail_writes.store(false, Ordering::SeqCst);
    engine.execute_transfer(HOLDER, id).await.unwrap();
    assert_eq!(registry.owner_of(id).await.unwrap(), target);
    assert_eq!(engine.license(id).await.unwrap().phase, LicensePhase::Normal);
}
