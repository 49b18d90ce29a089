//! In-memory collaborators with failure injection, for tests and local runs.

use crate::compound::collaborators::{CollaboratorError, Exchange, RewardsDistributor, StakingPool};
use crate::primitives::{Address, Amount};
use crate::voucher::RewardVoucher;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

fn lock_err(name: &'static str) -> CollaboratorError {
    CollaboratorError::new(name, "lock poisoned")
}

/// Staking pool tracking a single staked balance.
#[derive(Debug, Default)]
pub struct MemoryStaking {
    staked: Mutex<Amount>,
    fail: AtomicBool,
}

impl MemoryStaking {
    pub fn with_balance(balance: Amount) -> Self {
        Self {
            staked: Mutex::new(balance),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every following call fail until reset.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("staking", "injected failure"));
        }
        Ok(())
    }
}

impl StakingPool for MemoryStaking {
    fn stake(&self, token: Address, amount: Amount) -> Result<(), CollaboratorError> {
        self.check()?;
        let mut staked = self.staked.lock().map_err(|_| lock_err("staking"))?;
        *staked = staked
            .checked_add(amount)
            .ok_or_else(|| CollaboratorError::new("staking", "balance overflow"))?;
        debug!(%token, amount, staked = *staked, "staked");
        Ok(())
    }

    fn unstake(&self, amount: Amount) -> Result<(), CollaboratorError> {
        self.check()?;
        let mut staked = self.staked.lock().map_err(|_| lock_err("staking"))?;
        *staked = staked.checked_sub(amount).ok_or_else(|| {
            CollaboratorError::new("staking", format!("unstake {amount} exceeds {}", *staked))
        })?;
        debug!(amount, staked = *staked, "unstaked");
        Ok(())
    }

    fn balance(&self) -> Result<Amount, CollaboratorError> {
        self.check()?;
        let staked = self.staked.lock().map_err(|_| lock_err("staking"))?;
        Ok(*staked)
    }
}

/// Exchange converting at a fixed `numerator / denominator` rate, rounding down.
#[derive(Debug)]
pub struct FixedRateExchange {
    numerator: Amount,
    denominator: Amount,
    fail: AtomicBool,
    swaps: AtomicU64,
}

impl FixedRateExchange {
    pub fn new(numerator: Amount, denominator: Amount) -> Self {
        Self {
            numerator,
            denominator: denominator.max(1),
            fail: AtomicBool::new(false),
            swaps: AtomicU64::new(0),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    pub fn quote(&self, amount_in: Amount) -> Option<Amount> {
        amount_in
            .checked_mul(self.numerator)
            .map(|scaled| scaled / self.denominator)
    }
}

impl Exchange for FixedRateExchange {
    fn swap(
        &self,
        asset_in: Address,
        asset_out: Address,
        amount_in: Amount,
    ) -> Result<Amount, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("exchange", "injected failure"));
        }
        let out = self
            .quote(amount_in)
            .ok_or_else(|| CollaboratorError::new("exchange", "quote overflow"))?;
        self.swaps.fetch_add(1, Ordering::Relaxed);
        debug!(%asset_in, %asset_out, amount_in, out, "swapped");
        Ok(out)
    }
}

/// Rewards protocol paying out the voucher amount.
#[derive(Debug, Default)]
pub struct MemoryRewards {
    paid: Mutex<Amount>,
    fail: AtomicBool,
}

impl MemoryRewards {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn total_paid(&self) -> Amount {
        self.paid.lock().map(|p| *p).unwrap_or_else(|e| *e.into_inner())
    }
}

impl RewardsDistributor for MemoryRewards {
    fn claim(&self, voucher: &RewardVoucher) -> Result<Amount, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("rewards", "injected failure"));
        }
        let mut paid = self.paid.lock().map_err(|_| lock_err("rewards"))?;
        *paid = paid
            .checked_add(voucher.amount())
            .ok_or_else(|| CollaboratorError::new("rewards", "payout overflow"))?;
        Ok(voucher.amount())
    }
}
