//! Voucher authentication: chain binding, replay protection, signature recovery.

use crate::primitives::Address;
use crate::voucher::signer::signer_address;
use crate::voucher::typed_data::{signing_digest, DomainDescriptor};
use crate::voucher::{RewardVoucher, VoucherSignature};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("wrong chain: voucher {voucher}, domain {domain}, runtime {runtime}")]
    WrongChain { voucher: u64, domain: u64, runtime: u64 },
    #[error("stale cycle {cycle} for {recipient}: last consumed {last_consumed}")]
    StaleCycle {
        recipient: Address,
        cycle: u64,
        last_consumed: u64,
    },
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Highest consumed cycle per recipient. Cycles must strictly increase.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedCycles {
    last: BTreeMap<Address, u64>,
}

impl ConsumedCycles {
    pub fn last_consumed(&self, recipient: &Address) -> Option<u64> {
        self.last.get(recipient).copied()
    }

    /// Record `cycle` as consumed. Callers verify first; a lower cycle never
    /// overwrites a higher one.
    pub fn record(&mut self, recipient: Address, cycle: u64) {
        let entry = self.last.entry(recipient).or_insert(cycle);
        *entry = (*entry).max(cycle);
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

fn invalid(reason: impl Into<String>) -> VerifyError {
    VerifyError::InvalidSignature(reason.into())
}

/// Recover the signing address from `(v, r, s)` over a prehashed digest.
/// High-s (malleable) signatures are rejected.
pub fn recover_signer(digest: &[u8; 32], sig: &VoucherSignature) -> Result<Address, VerifyError> {
    let recid_byte = match sig.v {
        0 | 1 => sig.v,
        27 | 28 => sig.v - 27,
        other => return Err(invalid(format!("v = {other}"))),
    };
    let recid = RecoveryId::from_byte(recid_byte).ok_or_else(|| invalid("recovery id"))?;
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&sig.r);
    rs[32..].copy_from_slice(&sig.s);
    let signature = Signature::from_slice(&rs).map_err(|e| invalid(e.to_string()))?;
    if signature.normalize_s().is_some() {
        return Err(invalid("s in upper half of curve order"));
    }
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recid)
        .map_err(|e| invalid(e.to_string()))?;
    Ok(signer_address(&key))
}

/// Authenticate `voucher`. Replays fail `StaleCycle` before the signature is
/// looked at. Does not record the cycle; the caller does that before any
/// external effect.
pub fn verify(
    voucher: &RewardVoucher,
    domain: &DomainDescriptor,
    trusted_signer: &Address,
    runtime_chain_id: u64,
    consumed: &ConsumedCycles,
) -> Result<(), VerifyError> {
    if voucher.chain_id() != runtime_chain_id || domain.chain_id != runtime_chain_id {
        return Err(VerifyError::WrongChain {
            voucher: voucher.chain_id(),
            domain: domain.chain_id,
            runtime: runtime_chain_id,
        });
    }
    let recipient = voucher.recipient();
    if let Some(last_consumed) = consumed.last_consumed(&recipient) {
        if voucher.cycle() <= last_consumed {
            return Err(VerifyError::StaleCycle {
                recipient,
                cycle: voucher.cycle(),
                last_consumed,
            });
        }
    }
    let digest = signing_digest(domain, &voucher.claim);
    let recovered = recover_signer(&digest, &voucher.signature)?;
    if recovered != *trusted_signer {
        return Err(invalid(format!(
            "recovered {recovered}, expected {trusted_signer}"
        )));
    }
    debug!(%recipient, cycle = voucher.cycle(), "voucher verified");
    Ok(())
}

/// Verifier bound to one deployment's domain, signer and runtime chain.
#[derive(Clone, Debug)]
pub struct VoucherVerifier {
    domain: DomainDescriptor,
    trusted_signer: Address,
    runtime_chain_id: u64,
}

impl VoucherVerifier {
    pub fn new(domain: DomainDescriptor, trusted_signer: Address, runtime_chain_id: u64) -> Self {
        Self {
            domain,
            trusted_signer,
            runtime_chain_id,
        }
    }

    pub fn domain(&self) -> &DomainDescriptor {
        &self.domain
    }

    pub fn trusted_signer(&self) -> Address {
        self.trusted_signer
    }

    pub fn verify(
        &self,
        voucher: &RewardVoucher,
        consumed: &ConsumedCycles,
    ) -> Result<(), VerifyError> {
        verify(
            voucher,
            &self.domain,
            &self.trusted_signer,
            self.runtime_chain_id,
            consumed,
        )
    }
}
