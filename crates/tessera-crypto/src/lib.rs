use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use tessera_types::{AccountAddress, Epoch, PublicKey, Signature};
use thiserror::Error;

const REPORT_DOMAIN: &[u8] = b"tessera.availability.v1";

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("malformed public key")]
    MalformedPublicKey,

    #[error("malformed signature")]
    MalformedSignature,

    #[error("signature verification failed")]
    VerificationFailed,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Canonical digest of an availability report. Oracles sign this digest, so
/// the byte layout is consensus-relevant and must not change: domain tag,
/// node address, epoch count, then little-endian epochs followed by raw
/// availability bytes.
pub fn report_digest(node: &AccountAddress, epochs: &[Epoch], availabilities: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(REPORT_DOMAIN);
    hasher.update(node.as_bytes());
    hasher.update(&(epochs.len() as u64).to_le_bytes());
    for epoch in epochs {
        hasher.update(&epoch.to_le_bytes());
    }
    hasher.update(availabilities);
    *hasher.finalize().as_bytes()
}

/// Verify one oracle signature over a report digest.
pub fn verify_report_signature(
    signer: &PublicKey,
    digest: &[u8; 32],
    signature: &Signature,
) -> Result<()> {
    let key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|_| CryptoError::MalformedPublicKey)?;
    let sig = ed25519_dalek::Signature::from_slice(signature.as_bytes())
        .map_err(|_| CryptoError::MalformedSignature)?;
    key.verify(digest, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Oracle signing identity. Production signers hold these keys outside the
/// engine; tests use them to produce attestations.
pub struct AttesterKeypair {
    signing: SigningKey,
}

impl AttesterKeypair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, digest: &[u8; 32]) -> Signature {
        Signature::new(self.signing.sign(digest).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = AttesterKeypair::generate();
        let node = AccountAddress::from_bytes([1u8; 32]);
        let digest = report_digest(&node, &[10, 11, 12], &[255, 200, 0]);

        let sig = keypair.sign(&digest);
        assert!(verify_report_signature(&keypair.public_key(), &digest, &sig).is_ok());
    }

    #[test]
    fn test_digest_binds_all_fields() {
        let node = AccountAddress::from_bytes([1u8; 32]);
        let base = report_digest(&node, &[10, 11], &[255, 200]);

        let other_node = AccountAddress::from_bytes([2u8; 32]);
        assert_ne!(base, report_digest(&other_node, &[10, 11], &[255, 200]));
        assert_ne!(base, report_digest(&node, &[10, 12], &[255, 200]));
        assert_ne!(base, report_digest(&node, &[10, 11], &[255, 201]));
    }

    #[test]
    fn test_wrong_signer_rejected() {
        let keypair = AttesterKeypair::generate();
        let other = AttesterKeypair::generate();
        let node = AccountAddress::from_bytes([1u8; 32]);
        let digest = report_digest(&node, &[5], &[128]);

        let sig = keypair.sign(&digest);
        assert!(verify_report_signature(&other.public_key(), &digest, &sig).is_err());
    }

    #[test]
    fn test_malformed_signature_rejected() {
        let keypair = AttesterKeypair::generate();
        let node = AccountAddress::from_bytes([1u8; 32]);
        let digest = report_digest(&node, &[5], &[128]);

        let err = verify_report_signature(&keypair.public_key(), &digest, &Signature::empty());
        assert!(matches!(err, Err(CryptoError::MalformedSignature)));
    }
}
