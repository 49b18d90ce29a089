//! Off-chain voucher signing (the rewards operator's side of the protocol).

use crate::primitives::{keccak256, Address};
use crate::voucher::typed_data::{signing_digest, DomainDescriptor};
use crate::voucher::{RewardVoucher, VoucherClaim, VoucherSignature};
use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Account address of a secp256k1 public key: low 20 bytes of the
/// Keccak-256 of the uncompressed point without its 0x04 tag.
pub fn signer_address(key: &VerifyingKey) -> Address {
    let point = key.as_affine().to_encoded_point(false);
    Address::from_word(&keccak256(&point.as_bytes()[1..]))
}

pub struct VoucherSigner {
    key: SigningKey,
    address: Address,
}

impl VoucherSigner {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        let key =
            SigningKey::from_slice(secret).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = signer_address(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Parse a hex private key, with or without `0x`.
    pub fn from_hex(secret_hex: &str) -> Result<Self, SignerError> {
        let raw = hex::decode(secret_hex.trim().trim_start_matches("0x"))
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&raw)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(
        &self,
        domain: &DomainDescriptor,
        claim: VoucherClaim,
    ) -> Result<RewardVoucher, SignerError> {
        let digest = signing_digest(domain, &claim);
        let (mut signature, mut recid) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        // Verifiers reject high-s; negating s flips the y parity.
        if let Some(low) = signature.normalize_s() {
            signature = low;
            recid = RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced());
        }
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(RewardVoucher {
            claim,
            signature: VoucherSignature {
                v: 27 + recid.to_byte(),
                r,
                s,
            },
        })
    }
}
