//! Epoch-indexed reward computation and release engine for compute
//! licenses: attestation verification, bounded vesting, adoption-gated
//! withholding with capped carryover, and the monotonic checkpoint series
//! feeding adoption percentages.

pub mod attestation;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod curve;
pub mod engine;
pub mod error;
pub mod gate;
pub mod license;
pub mod registry;
pub mod storage;

pub use attestation::{verify_attestations, Attestation, OracleRoster};
pub use checkpoint::{AdoptionThresholds, AdoptionTracker, CheckpointSeries};
pub use clock::EpochClock;
pub use config::{EngineConfig, GenesisWallet};
pub use curve::{
    weighted_release, CurveOutcome, HalfLifeCurve, LinearCurve, TableCurve, VestingCurve,
    MAX_CLAIM_EPOCHS,
};
pub use engine::{ClaimEvent, ClaimRequest, EngineMetrics, RewardEngine};
pub use error::{Result, RewardError};
pub use gate::{apply_gate, GateOutcome};
pub use license::{License, LicenseLedger, LicensePhase, VestingState};
pub use registry::{
    MemoryOwnershipRegistry, MemoryTokenIssuance, OwnershipRegistry, TokenIssuance,
};
pub use storage::{MemoryStorage, RewardStorage};
