//! Two-phase withdrawals: request, wait `EPOCH_DELAY` epochs, release.

use crate::error::ErrorKind;
use crate::ledger::{DebitError, StakeLedger};
use crate::primitives::{Address, Amount, Epoch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Epochs between a request and its release (seven one-day epochs).
pub const EPOCH_DELAY: Epoch = 7;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WithdrawError {
    #[error("withdrawal amount must be non-zero")]
    ZeroAmount,
    #[error("insufficient balance for {depositor}: requested {requested}, available {available}")]
    InsufficientBalance {
        depositor: Address,
        requested: Amount,
        available: Amount,
    },
    #[error("{depositor} already has a pending request of {amount} from epoch {requested_at_epoch}")]
    RequestAlreadyPending {
        depositor: Address,
        amount: Amount,
        requested_at_epoch: Epoch,
    },
    #[error("no pending withdrawal request for {depositor}")]
    NoPendingRequest { depositor: Address },
    #[error("request for {depositor} claimable at epoch {claimable_at}, now {now}")]
    NotYetClaimable {
        depositor: Address,
        claimable_at: Epoch,
        now: Epoch,
    },
    #[error(transparent)]
    Debit(#[from] DebitError),
}

impl WithdrawError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WithdrawError::ZeroAmount => ErrorKind::Input,
            WithdrawError::InsufficientBalance { .. }
            | WithdrawError::RequestAlreadyPending { .. }
            | WithdrawError::NoPendingRequest { .. }
            | WithdrawError::NotYetClaimable { .. } => ErrorKind::State,
            WithdrawError::Debit(e) => e.kind(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub depositor: Address,
    pub amount: Amount,
    pub requested_at_epoch: Epoch,
}

impl WithdrawalRequest {
    pub fn claimable_at(&self) -> Epoch {
        self.requested_at_epoch.saturating_add(EPOCH_DELAY)
    }

    pub fn is_claimable(&self, now: Epoch) -> bool {
        now >= self.claimable_at()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    None,
    Requested,
    Claimable,
}

/// Outstanding requests, at most one per depositor. Reserved amounts stay in
/// the ledger until release.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQueue {
    requests: BTreeMap<Address, WithdrawalRequest>,
}

impl WithdrawalQueue {
    pub fn pending(&self, depositor: &Address) -> Option<&WithdrawalRequest> {
        self.requests.get(depositor)
    }

    pub fn state(&self, depositor: &Address, now: Epoch) -> RequestState {
        match self.requests.get(depositor) {
            None => RequestState::None,
            Some(r) if r.is_claimable(now) => RequestState::Claimable,
            Some(_) => RequestState::Requested,
        }
    }

    /// Amount reserved for `depositor` by pending requests.
    pub fn reserved(&self, depositor: &Address) -> Amount {
        self.requests.get(depositor).map_or(0, |r| r.amount)
    }

    pub fn reserved_total(&self) -> Amount {
        self.requests
            .values()
            .fold(0u128, |acc, r| acc.saturating_add(r.amount))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn request_withdrawal(
        &mut self,
        depositor: Address,
        amount: Amount,
        ledger: &StakeLedger,
        now: Epoch,
    ) -> Result<WithdrawalRequest, WithdrawError> {
        if amount == 0 {
            return Err(WithdrawError::ZeroAmount);
        }
        if let Some(existing) = self.requests.get(&depositor) {
            return Err(WithdrawError::RequestAlreadyPending {
                depositor,
                amount: existing.amount,
                requested_at_epoch: existing.requested_at_epoch,
            });
        }
        // No request is pending here, so the whole principal is available.
        let available = ledger.principal_of(&depositor);
        if amount > available {
            return Err(WithdrawError::InsufficientBalance {
                depositor,
                requested: amount,
                available,
            });
        }
        let request = WithdrawalRequest {
            depositor,
            amount,
            requested_at_epoch: now,
        };
        self.requests.insert(depositor, request);
        Ok(request)
    }

    /// Release a matured request: debit the ledger, drop the request, return
    /// the released amount.
    pub fn withdraw(
        &mut self,
        depositor: &Address,
        ledger: &mut StakeLedger,
        now: Epoch,
    ) -> Result<Amount, WithdrawError> {
        let request = *self
            .requests
            .get(depositor)
            .ok_or(WithdrawError::NoPendingRequest {
                depositor: *depositor,
            })?;
        if !request.is_claimable(now) {
            return Err(WithdrawError::NotYetClaimable {
                depositor: *depositor,
                claimable_at: request.claimable_at(),
                now,
            });
        }
        ledger.debit(depositor, request.amount)?;
        self.requests.remove(depositor);
        Ok(request.amount)
    }
}
