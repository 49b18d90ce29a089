//! EIP-712 typed-data hashing for reward vouchers.
//!
//! ```text
//! domainSeparator = keccak256(DOMAIN_TYPEHASH ‖ keccak(name) ‖ keccak(version)
//!                             ‖ uint256(chainId) ‖ address(verifyingContract))
//! structHash      = keccak256(RECIPIENT_TYPEHASH ‖ uint256(chainId) ‖ uint256(cycle)
//!                             ‖ address(wallet) ‖ uint256(amount))
//! digest          = keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ structHash)
//! ```
//!
//! Changing the domain name or version invalidates every issued voucher.

use crate::primitives::{keccak256, uint_word, Address};
use crate::voucher::VoucherClaim;
use serde::{Deserialize, Serialize};

pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
pub const RECIPIENT_TYPE: &str =
    "Recipient(uint256 chainId,uint256 cycle,address wallet,uint256 amount)";

/// Binds voucher signatures to one deployment on one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDescriptor {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl DomainDescriptor {
    pub fn separator(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(32 * 5);
        buf.extend_from_slice(&keccak256(DOMAIN_TYPE));
        buf.extend_from_slice(&keccak256(self.name.as_bytes()));
        buf.extend_from_slice(&keccak256(self.version.as_bytes()));
        buf.extend_from_slice(&uint_word(u128::from(self.chain_id)));
        buf.extend_from_slice(&self.verifying_contract.to_word());
        keccak256(buf)
    }
}

fn struct_hash(claim: &VoucherClaim) -> [u8; 32] {
    let mut buf = Vec::with_capacity(32 * 5);
    buf.extend_from_slice(&keccak256(RECIPIENT_TYPE));
    buf.extend_from_slice(&uint_word(u128::from(claim.chain_id)));
    buf.extend_from_slice(&uint_word(u128::from(claim.cycle)));
    buf.extend_from_slice(&claim.recipient.to_word());
    buf.extend_from_slice(&uint_word(claim.amount));
    keccak256(buf)
}

/// Digest the trusted signer signs for `claim` under `domain`.
pub fn signing_digest(domain: &DomainDescriptor, claim: &VoucherClaim) -> [u8; 32] {
    let mut buf = Vec::with_capacity(2 + 64);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(&domain.separator());
    buf.extend_from_slice(&struct_hash(claim));
    keccak256(buf)
}
