use crate::error::{Result, RewardError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tessera_types::{PublicKey, Signature};
use tracing::debug;

/// Externally-governed attester set plus the minimum distinct-signer count.
/// Injected by value into verification so the roster is never global
/// mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRoster {
    pub members: HashSet<PublicKey>,
    pub min_signatures: usize,
}

impl OracleRoster {
    pub fn new(members: impl IntoIterator<Item = PublicKey>, min_signatures: usize) -> Self {
        Self {
            members: members.into_iter().collect(),
            min_signatures,
        }
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.members.contains(key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestation {
    pub signer: PublicKey,
    pub signature: Signature,
}

/// Validate a set of oracle attestations over a report digest.
///
/// Every supplied attestation must come from a roster member, verify
/// cryptographically, and name a signer not seen earlier in the call; the
/// count of distinct valid signers must reach the roster threshold. Pure
/// validation over O(k) signatures.
pub fn verify_attestations(
    roster: &OracleRoster,
    digest: &[u8; 32],
    attestations: &[Attestation],
) -> Result<()> {
    let mut seen: HashSet<PublicKey> = HashSet::with_capacity(attestations.len());

    for attestation in attestations {
        if !roster.contains(&attestation.signer) {
            debug!(signer = %attestation.signer, "Attestation from non-roster signer");
            return Err(RewardError::InvalidAttestation);
        }
        tessera_crypto::verify_report_signature(
            &attestation.signer,
            digest,
            &attestation.signature,
        )
        .map_err(|_| RewardError::InvalidAttestation)?;
        if !seen.insert(attestation.signer) {
            return Err(RewardError::DuplicateAttestation);
        }
    }

    if seen.len() < roster.min_signatures {
        return Err(RewardError::InsufficientSignatures {
            got: seen.len(),
            needed: roster.min_signatures,
        });
    }
    Ok(())
}
