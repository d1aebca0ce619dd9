use tessera_types::{Epoch, LicenseId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewardError {
    // Authorization
    #[error("caller is not the license owner")]
    NotOwner,

    #[error("admin only")]
    AdminOnly,

    #[error("invalid attestation")]
    InvalidAttestation,

    // Validation
    #[error("incorrect number of params")]
    IncorrectParams,

    #[error("invalid epoch order")]
    InvalidEpochOrder,

    #[error("invalid epoch range")]
    InvalidEpochRange,

    #[error("invalid totals order")]
    InvalidTotalsOrder,

    #[error("epoch {epoch} is in the future (current epoch {current})")]
    FutureEpoch { epoch: Epoch, current: Epoch },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // State
    #[error("duplicate attestation")]
    DuplicateAttestation,

    #[error("insufficient signatures: {got} distinct of {needed} required")]
    InsufficientSignatures { got: usize, needed: usize },

    #[error("already set")]
    AlreadySet,

    #[error("unknown license {0}")]
    UnknownLicense(LicenseId),

    #[error("license {0} already exists")]
    LicenseExists(LicenseId),

    #[error("license is banned")]
    LicenseBanned,

    #[error("license is burned")]
    LicenseBurned,

    #[error("node address mismatch")]
    NodeMismatch,

    #[error("node already bound")]
    NodeAlreadyBound,

    #[error("node rebind cooldown active")]
    RebindCooldown,

    #[error("no pending action for license")]
    NoPendingAction,

    #[error("pending action already initiated")]
    ActionPending,

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, RewardError>;
