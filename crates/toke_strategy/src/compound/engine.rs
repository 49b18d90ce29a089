//! Auto-compound: verify voucher, claim, swap to LP token, credit, restake.

use crate::compound::collaborators::{CollaboratorError, Exchange, RewardsDistributor, StakingPool};
use crate::error::ErrorKind;
use crate::ledger::{CompoundCredit, CreditError, StakeLedger};
use crate::primitives::{Address, Amount};
use crate::voucher::{ConsumedCycles, RewardVoucher, VerifyError, VoucherVerifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompoundError {
    #[error("voucher amount must be non-zero")]
    ZeroReward,
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("voucher pays {found}, strategy is {expected}")]
    RecipientMismatch { expected: Address, found: Address },
    #[error("reward claim failed: {0}")]
    ClaimTransferFailed(CollaboratorError),
    #[error("reward swap failed: {0}")]
    SwapFailed(CollaboratorError),
    #[error("restake failed: {0}")]
    StakeFailed(CollaboratorError),
    #[error(transparent)]
    Credit(#[from] CreditError),
}

impl CompoundError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompoundError::ZeroReward => ErrorKind::Input,
            CompoundError::Verify(_) | CompoundError::RecipientMismatch { .. } => {
                ErrorKind::Authentication
            }
            CompoundError::ClaimTransferFailed(_)
            | CompoundError::SwapFailed(_)
            | CompoundError::StakeFailed(_) => ErrorKind::Collaborator,
            CompoundError::Credit(e) => e.kind(),
        }
    }
}

/// External protocols the strategy talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub staking: Arc<dyn StakingPool>,
    pub exchange: Arc<dyn Exchange>,
    pub rewards: Arc<dyn RewardsDistributor>,
}

/// Tokens involved in a compound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundAssets {
    pub reward_token: Address,
    pub lp_token: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundOutcome {
    pub recipient: Address,
    pub cycle: u64,
    pub reward: Amount,
    pub lp_acquired: Amount,
    pub credit: CompoundCredit,
}

/// Stateless orchestration over the caller's ledger and consumed-cycle record.
pub struct CompoundEngine {
    verifier: VoucherVerifier,
    collaborators: Collaborators,
    assets: CompoundAssets,
    strategy_address: Address,
}

impl CompoundEngine {
    pub fn new(
        verifier: VoucherVerifier,
        collaborators: Collaborators,
        assets: CompoundAssets,
        strategy_address: Address,
    ) -> Self {
        Self {
            verifier,
            collaborators,
            assets,
            strategy_address,
        }
    }

    pub fn verifier(&self) -> &VoucherVerifier {
        &self.verifier
    }

    /// Run one compound against `ledger` and `consumed`. On error both may be
    /// partially updated; callers pass a working copy and drop it on failure.
    pub fn auto_compound(
        &self,
        voucher: &RewardVoucher,
        ledger: &mut StakeLedger,
        consumed: &mut ConsumedCycles,
    ) -> Result<CompoundOutcome, CompoundError> {
        if voucher.amount() == 0 {
            return Err(CompoundError::ZeroReward);
        }
        self.verifier.verify(voucher, consumed)?;
        if voucher.recipient() != self.strategy_address {
            return Err(CompoundError::RecipientMismatch {
                expected: self.strategy_address,
                found: voucher.recipient(),
            });
        }
        // Consumed before any external effect.
        consumed.record(voucher.recipient(), voucher.cycle());

        let reward = self
            .collaborators
            .rewards
            .claim(voucher)
            .map_err(CompoundError::ClaimTransferFailed)?;
        debug!(cycle = voucher.cycle(), reward, "reward claimed");

        let lp_acquired = self
            .collaborators
            .exchange
            .swap(self.assets.reward_token, self.assets.lp_token, reward)
            .map_err(CompoundError::SwapFailed)?;
        debug!(reward, lp_acquired, "reward swapped");

        let credit = ledger.credit_compound(lp_acquired)?;

        self.collaborators
            .staking
            .stake(self.assets.lp_token, lp_acquired)
            .map_err(CompoundError::StakeFailed)?;

        info!(
            cycle = voucher.cycle(),
            reward,
            lp_acquired,
            distributed = credit.distributed,
            unattributed = credit.unattributed,
            total_staked = ledger.total_staked(),
            "auto-compound"
        );
        Ok(CompoundOutcome {
            recipient: voucher.recipient(),
            cycle: voucher.cycle(),
            reward,
            lp_acquired,
            credit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compound::memory::{FixedRateExchange, MemoryRewards, MemoryStaking};
    use crate::voucher::{DomainDescriptor, VoucherClaim, VoucherSigner};

    const STRATEGY: Address = Address::new([0x5f; 20]);

    struct Fixture {
        engine: CompoundEngine,
        signer: VoucherSigner,
        domain: DomainDescriptor,
        staking: Arc<MemoryStaking>,
        exchange: Arc<FixedRateExchange>,
        rewards: Arc<MemoryRewards>,
    }

    fn fixture() -> Fixture {
        let signer = VoucherSigner::from_bytes(&[0x11; 32]).unwrap();
        let domain = DomainDescriptor {
            name: "TOKE Distribution".into(),
            version: "1".into(),
            chain_id: 31337,
            verifying_contract: STRATEGY,
        };
        let staking = Arc::new(MemoryStaking::default());
        let exchange = Arc::new(FixedRateExchange::new(1, 2));
        let rewards = Arc::new(MemoryRewards::default());
        let engine = CompoundEngine::new(
            VoucherVerifier::new(domain.clone(), signer.address(), 31337),
            Collaborators {
                staking: staking.clone(),
                exchange: exchange.clone(),
                rewards: rewards.clone(),
            },
            CompoundAssets {
                reward_token: Address::new([0x2e; 20]),
                lp_token: Address::new([0xb4; 20]),
            },
            STRATEGY,
        );
        Fixture {
            engine,
            signer,
            domain,
            staking,
            exchange,
            rewards,
        }
    }

    fn voucher(f: &Fixture, recipient: Address, cycle: u64, amount: Amount) -> RewardVoucher {
        f.signer
            .sign(
                &f.domain,
                VoucherClaim {
                    chain_id: 31337,
                    cycle,
                    recipient,
                    amount,
                },
            )
            .unwrap()
    }

    #[test]
    fn compounds_swap_output_not_reward() {
        let f = fixture();
        let mut ledger = StakeLedger::default();
        ledger.deposit(Address::new([1; 20]), 100).unwrap();
        let mut consumed = ConsumedCycles::default();
        let out = f
            .engine
            .auto_compound(&voucher(&f, STRATEGY, 1, 1000), &mut ledger, &mut consumed)
            .unwrap();
        assert_eq!(out.reward, 1000);
        assert_eq!(out.lp_acquired, 500);
        assert_eq!(ledger.total_staked(), 600);
        assert_eq!(f.staking.balance().unwrap(), 500);
        assert_eq!(f.rewards.total_paid(), 1000);
        assert_eq!(consumed.last_consumed(&STRATEGY), Some(1));
    }

    #[test]
    fn wrong_recipient_rejected_before_claim() {
        let f = fixture();
        let mut ledger = StakeLedger::default();
        let mut consumed = ConsumedCycles::default();
        let v = voucher(&f, Address::new([0x7a; 20]), 1, 1000);
        assert!(matches!(
            f.engine.auto_compound(&v, &mut ledger, &mut consumed),
            Err(CompoundError::RecipientMismatch { .. })
        ));
        assert_eq!(f.rewards.total_paid(), 0);
        assert!(consumed.is_empty());
    }

    #[test]
    fn swap_failure_surfaces_as_collaborator_error() {
        let f = fixture();
        f.exchange.set_failing(true);
        let mut ledger = StakeLedger::default();
        let mut consumed = ConsumedCycles::default();
        let err = f
            .engine
            .auto_compound(&voucher(&f, STRATEGY, 1, 1000), &mut ledger, &mut consumed)
            .unwrap_err();
        assert!(matches!(err, CompoundError::SwapFailed(_)));
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        assert_eq!(ledger.total_staked(), 0);
    }

    #[test]
    fn zero_reward_is_input_error() {
        let f = fixture();
        let err = f
            .engine
            .auto_compound(
                &voucher(&f, STRATEGY, 1, 0),
                &mut StakeLedger::default(),
                &mut ConsumedCycles::default(),
            )
            .unwrap_err();
        assert_eq!(err, CompoundError::ZeroReward);
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}
