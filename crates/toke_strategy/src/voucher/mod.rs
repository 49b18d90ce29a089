//! Reward vouchers: EIP-712 payload hashing, off-chain signing, and verification
//! with per-recipient replay protection.

mod signer;
mod typed_data;
mod verifier;

pub use signer::{signer_address, SignerError, VoucherSigner};
pub use typed_data::{signing_digest, DomainDescriptor, DOMAIN_TYPE, RECIPIENT_TYPE};
pub use verifier::{recover_signer, verify, ConsumedCycles, VerifyError, VoucherVerifier};

use crate::primitives::{Address, Amount};
use serde::{Deserialize, Serialize};

/// Unsigned reward claim, the `Recipient` struct of the signed payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherClaim {
    pub chain_id: u64,
    pub cycle: u64,
    pub recipient: Address,
    pub amount: Amount,
}

/// Recoverable ECDSA signature as `(v, r, s)`; `v` is 27/28 (0/1 accepted).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherSignature {
    pub v: u8,
    #[serde(with = "hex_word")]
    pub r: [u8; 32],
    #[serde(with = "hex_word")]
    pub s: [u8; 32],
}

/// Signed reward voucher. Immutable once issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardVoucher {
    pub claim: VoucherClaim,
    pub signature: VoucherSignature,
}

impl RewardVoucher {
    pub fn chain_id(&self) -> u64 {
        self.claim.chain_id
    }

    pub fn cycle(&self) -> u64 {
        self.claim.cycle
    }

    pub fn recipient(&self) -> Address {
        self.claim.recipient
    }

    pub fn amount(&self) -> Amount {
        self.claim.amount
    }
}

mod hex_word {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(word: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(word)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(s.trim().trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        raw.as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected 32 bytes, got {}", raw.len())))
    }
}
