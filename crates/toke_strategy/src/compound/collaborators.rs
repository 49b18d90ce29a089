//! Narrow capability interfaces to the external protocols.

use crate::primitives::{Address, Amount};
use crate::voucher::RewardVoucher;
use thiserror::Error;

/// Failure reported by an external protocol call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{collaborator}: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Third-party staking pool holding the strategy's LP tokens.
pub trait StakingPool: Send + Sync {
    fn stake(&self, token: Address, amount: Amount) -> Result<(), CollaboratorError>;
    fn unstake(&self, amount: Amount) -> Result<(), CollaboratorError>;
    fn balance(&self) -> Result<Amount, CollaboratorError>;
}

/// Asset exchange. The realized output is whatever the exchange reports.
pub trait Exchange: Send + Sync {
    fn swap(
        &self,
        asset_in: Address,
        asset_out: Address,
        amount_in: Amount,
    ) -> Result<Amount, CollaboratorError>;
}

/// Rewards protocol releasing the reward asset against a valid voucher.
pub trait RewardsDistributor: Send + Sync {
    fn claim(&self, voucher: &RewardVoucher) -> Result<Amount, CollaboratorError>;
}
