//! The strategy: ledger, withdrawal queue and consumed cycles behind one lock.
//!
//! Every public call is a transaction. It locks the state, works on a copy,
//! performs its collaborator calls, re-checks the ledger invariant, and only
//! then swaps the copy in. A failed call leaves no trace.

use crate::compound::{
    CollaboratorError, Collaborators, CompoundAssets, CompoundEngine, CompoundError,
    CompoundOutcome, StakingPool,
};
use crate::error::ErrorKind;
use crate::ledger::{DepositError, Deposited, Event, EventKind, InvariantViolation, StakeLedger};
use crate::primitives::{Address, Amount, Epoch};
use crate::voucher::{ConsumedCycles, DomainDescriptor, RewardVoucher, VoucherVerifier};
use crate::withdraw::{EpochClock, RequestState, WithdrawError, WithdrawalQueue, WithdrawalRequest};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error(transparent)]
    Deposit(#[from] DepositError),
    #[error(transparent)]
    Withdraw(#[from] WithdrawError),
    #[error(transparent)]
    Compound(#[from] CompoundError),
    #[error("staking call failed: {0}")]
    Staking(CollaboratorError),
    #[error("ledger invariant broken: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("strategy state lock poisoned")]
    LockPoisoned,
}

impl StrategyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StrategyError::Deposit(e) => e.kind(),
            StrategyError::Withdraw(e) => e.kind(),
            StrategyError::Compound(e) => e.kind(),
            StrategyError::Staking(_) => ErrorKind::Collaborator,
            StrategyError::Invariant(_) | StrategyError::LockPoisoned => ErrorKind::Internal,
        }
    }
}

/// Static facts about one deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Chain the strategy runs on; vouchers for any other chain are rejected.
    pub chain_id: u64,
    /// The strategy's own address: voucher recipient and domain verifying contract.
    pub strategy_address: Address,
    pub lp_token: Address,
    pub reward_token: Address,
    pub domain: DomainDescriptor,
    pub trusted_signer: Address,
}

/// Mutable strategy state. Cloned per transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyState {
    pub ledger: StakeLedger,
    pub queue: WithdrawalQueue,
    pub consumed: ConsumedCycles,
}

/// State plus its committed event journal, as persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub state: StrategyState,
    pub events: Vec<Event>,
}

/// A depositor's position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub depositor: Address,
    pub principal: Amount,
    pub reserved: Amount,
    pub request_state: RequestState,
    pub pending: Option<WithdrawalRequest>,
}

pub struct Strategy {
    deployment: Deployment,
    inner: Mutex<StrategySnapshot>,
    engine: CompoundEngine,
    staking: Arc<dyn StakingPool>,
    clock: Arc<dyn EpochClock>,
}

impl Strategy {
    pub fn new(
        deployment: Deployment,
        collaborators: Collaborators,
        clock: Arc<dyn EpochClock>,
    ) -> Self {
        Self::from_snapshot(deployment, collaborators, clock, StrategySnapshot::default())
    }

    /// Resume from a persisted snapshot. Collaborators must not call back into
    /// the strategy; the state lock is not reentrant.
    pub fn from_snapshot(
        deployment: Deployment,
        collaborators: Collaborators,
        clock: Arc<dyn EpochClock>,
        snapshot: StrategySnapshot,
    ) -> Self {
        let verifier = VoucherVerifier::new(
            deployment.domain.clone(),
            deployment.trusted_signer,
            deployment.chain_id,
        );
        let staking = collaborators.staking.clone();
        let engine = CompoundEngine::new(
            verifier,
            collaborators,
            CompoundAssets {
                reward_token: deployment.reward_token,
                lp_token: deployment.lp_token,
            },
            deployment.strategy_address,
        );
        Self {
            deployment,
            inner: Mutex::new(snapshot),
            engine,
            staking,
            clock,
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn current_epoch(&self) -> Epoch {
        self.clock.current_epoch()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StrategySnapshot>, StrategyError> {
        self.inner.lock().map_err(|_| StrategyError::LockPoisoned)
    }

    /// Run `op` against a working copy; commit the copy and its events only
    /// if `op` succeeds and the ledger invariant still holds.
    fn transact<T, E>(
        &self,
        op: impl FnOnce(&mut StrategyState, Epoch, &mut Vec<EventKind>) -> Result<T, E>,
    ) -> Result<T, StrategyError>
    where
        StrategyError: From<E>,
    {
        let mut guard = self.lock()?;
        let now = self.clock.current_epoch();
        let mut work = guard.state.clone();
        let mut emitted = Vec::new();
        let out = match op(&mut work, now, &mut emitted) {
            Ok(out) => out,
            Err(e) => {
                let err = StrategyError::from(e);
                warn!(kind = %err.kind(), error = %err, "transaction aborted");
                return Err(err);
            }
        };
        work.ledger.check_invariant()?;
        guard.state = work;
        guard
            .events
            .extend(emitted.into_iter().map(|kind| Event::new(kind, now)));
        Ok(out)
    }

    pub fn deposit(&self, depositor: Address, amount: Amount) -> Result<Deposited, StrategyError> {
        let lp_token = self.deployment.lp_token;
        self.transact(|state, _, events| {
            let deposited = state.ledger.deposit(depositor, amount)?;
            self.staking
                .stake(lp_token, amount)
                .map_err(StrategyError::Staking)?;
            events.push(EventKind::Deposited {
                depositor,
                amount,
                principal: deposited.principal,
                total_staked: deposited.total_staked,
            });
            info!(
                %depositor,
                amount,
                principal = deposited.principal,
                total_staked = deposited.total_staked,
                "deposit"
            );
            Ok::<_, StrategyError>(deposited)
        })
    }

    pub fn request_withdrawal(
        &self,
        depositor: Address,
        amount: Amount,
    ) -> Result<WithdrawalRequest, StrategyError> {
        self.transact(|state, now, events| {
            let request = state
                .queue
                .request_withdrawal(depositor, amount, &state.ledger, now)?;
            events.push(EventKind::WithdrawalRequested {
                depositor,
                amount,
                requested_at_epoch: request.requested_at_epoch,
                claimable_at_epoch: request.claimable_at(),
            });
            info!(
                %depositor,
                amount,
                requested_at_epoch = now,
                claimable_at_epoch = request.claimable_at(),
                "withdrawal requested"
            );
            Ok::<_, StrategyError>(request)
        })
    }

    /// Release a matured request; returns the amount paid out.
    pub fn withdraw(&self, depositor: Address) -> Result<Amount, StrategyError> {
        self.transact(|state, now, events| {
            let amount = state.queue.withdraw(&depositor, &mut state.ledger, now)?;
            self.staking
                .unstake(amount)
                .map_err(StrategyError::Staking)?;
            let principal = state.ledger.principal_of(&depositor);
            let total_staked = state.ledger.total_staked();
            events.push(EventKind::Withdrawn {
                depositor,
                amount,
                principal,
                total_staked,
            });
            info!(%depositor, amount, principal, total_staked, "withdrawn");
            Ok::<_, StrategyError>(amount)
        })
    }

    /// Claim a voucher's reward and reinvest it; returns the LP amount added.
    pub fn auto_compound(&self, voucher: &RewardVoucher) -> Result<CompoundOutcome, StrategyError> {
        self.transact(|state, _, events| {
            let outcome =
                self.engine
                    .auto_compound(voucher, &mut state.ledger, &mut state.consumed)?;
            events.push(EventKind::Compounded {
                recipient: outcome.recipient,
                cycle: outcome.cycle,
                reward: outcome.reward,
                lp_acquired: outcome.lp_acquired,
                distributed: outcome.credit.distributed,
                unattributed: outcome.credit.unattributed,
                total_staked: state.ledger.total_staked(),
            });
            Ok::<_, StrategyError>(outcome)
        })
    }

    pub fn principal_of(&self, depositor: &Address) -> Result<Amount, StrategyError> {
        Ok(self.lock()?.state.ledger.principal_of(depositor))
    }

    pub fn total_staked(&self) -> Result<Amount, StrategyError> {
        Ok(self.lock()?.state.ledger.total_staked())
    }

    pub fn last_consumed_cycle(&self, recipient: &Address) -> Result<Option<u64>, StrategyError> {
        Ok(self.lock()?.state.consumed.last_consumed(recipient))
    }

    pub fn position(&self, depositor: &Address) -> Result<Position, StrategyError> {
        let now = self.clock.current_epoch();
        let guard = self.lock()?;
        let state = &guard.state;
        Ok(Position {
            depositor: *depositor,
            principal: state.ledger.principal_of(depositor),
            reserved: state.queue.reserved(depositor),
            request_state: state.queue.state(depositor, now),
            pending: state.queue.pending(depositor).copied(),
        })
    }

    pub fn snapshot(&self) -> Result<StrategySnapshot, StrategyError> {
        Ok(self.lock()?.clone())
    }
}
