//! Per-depositor principal and the strategy's aggregate staked position.

use crate::error::ErrorKind;
use crate::primitives::{mul_div_floor, Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("total staked {total_staked} != principals {principals} + unattributed {unattributed}")]
pub struct InvariantViolation {
    pub total_staked: Amount,
    pub principals: Amount,
    pub unattributed: Amount,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepositError {
    #[error("deposit amount must be non-zero")]
    ZeroAmount,
    #[error("deposit of {amount} overflows the ledger")]
    Overflow { amount: Amount },
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl DepositError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DepositError::ZeroAmount | DepositError::Overflow { .. } => ErrorKind::Input,
            DepositError::Invariant(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebitError {
    #[error("insufficient balance for {depositor}: requested {requested}, available {available}")]
    InsufficientBalance {
        depositor: Address,
        requested: Amount,
        available: Amount,
    },
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl DebitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DebitError::InsufficientBalance { .. } => ErrorKind::State,
            DebitError::Invariant(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreditError {
    #[error("compound credit of {amount} overflows the ledger")]
    Overflow { amount: Amount },
    #[error("no share computable for {depositor} (principal {principal})")]
    Distribution { depositor: Address, principal: Amount },
    #[error("distribution handed out {distributed}, only {available} available")]
    OverDistributed {
        distributed: Amount,
        available: Amount,
    },
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl CreditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CreditError::Overflow { .. } => ErrorKind::Input,
            CreditError::Distribution { .. }
            | CreditError::OverDistributed { .. }
            | CreditError::Invariant(_) => ErrorKind::Internal,
        }
    }
}

/// Result of a deposit: the depositor's new principal and the new total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub depositor: Address,
    pub amount: Amount,
    pub principal: Amount,
    pub total_staked: Amount,
}

/// Result of a compound credit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundCredit {
    pub amount: Amount,
    /// Per-depositor increments, in address order. Zero shares are omitted.
    pub shares: Vec<(Address, Amount)>,
    pub distributed: Amount,
    /// Remainder carried in `total_staked` after this credit.
    pub unattributed: Amount,
}

/// Floor of `principal * distributable / total_principal`, computed at 256
/// bits. Always `Some` while `principal <= total_principal`.
pub fn pro_rata(principal: Amount, distributable: Amount, total_principal: Amount) -> Option<Amount> {
    if total_principal == 0 {
        return Some(0);
    }
    mul_div_floor(principal, distributable, total_principal)
}

/// Depositor principals plus the aggregate `total_staked`.
///
/// `total_staked == Σ principal + unattributed` after every mutation.
/// `unattributed` holds integer-rounding remainders of compound credits; it is
/// folded into the next credit's distribution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeLedger {
    principals: BTreeMap<Address, Amount>,
    total_staked: Amount,
    unattributed: Amount,
}

impl StakeLedger {
    pub fn principal_of(&self, depositor: &Address) -> Amount {
        self.principals.get(depositor).copied().unwrap_or(0)
    }

    pub fn total_staked(&self) -> Amount {
        self.total_staked
    }

    pub fn unattributed(&self) -> Amount {
        self.unattributed
    }

    /// Every depositor ever seen, including those at zero.
    pub fn depositors(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.principals.iter()
    }

    pub fn depositor_count(&self) -> usize {
        self.principals.len()
    }

    pub fn deposit(&mut self, depositor: Address, amount: Amount) -> Result<Deposited, DepositError> {
        if amount == 0 {
            return Err(DepositError::ZeroAmount);
        }
        let principal = self
            .principal_of(&depositor)
            .checked_add(amount)
            .ok_or(DepositError::Overflow { amount })?;
        let total_staked = self
            .total_staked
            .checked_add(amount)
            .ok_or(DepositError::Overflow { amount })?;
        self.principals.insert(depositor, principal);
        self.total_staked = total_staked;
        self.check_invariant()?;
        Ok(Deposited {
            depositor,
            amount,
            principal,
            total_staked,
        })
    }

    /// Pro-rata compound credit.
    pub fn credit_compound(&mut self, amount: Amount) -> Result<CompoundCredit, CreditError> {
        self.credit_compound_with(amount, pro_rata)
    }

    /// Credit `amount` using `distribution(principal, distributable, total_principal)`
    /// to size each depositor's share. Shares are taken against balances as of
    /// the call; whatever is not handed out stays unattributed. An amount
    /// carried while nobody held principal goes to the next holders.
    pub fn credit_compound_with<F>(
        &mut self,
        amount: Amount,
        distribution: F,
    ) -> Result<CompoundCredit, CreditError>
    where
        F: Fn(Amount, Amount, Amount) -> Option<Amount>,
    {
        let total_staked = self
            .total_staked
            .checked_add(amount)
            .ok_or(CreditError::Overflow { amount })?;
        let distributable = self
            .unattributed
            .checked_add(amount)
            .ok_or(CreditError::Overflow { amount })?;
        let total_principal = self.total_staked - self.unattributed;

        let mut shares = Vec::new();
        let mut distributed: Amount = 0;
        if total_principal > 0 {
            for (depositor, principal) in &self.principals {
                let share = distribution(*principal, distributable, total_principal).ok_or(
                    CreditError::Distribution {
                        depositor: *depositor,
                        principal: *principal,
                    },
                )?;
                if share == 0 {
                    continue;
                }
                distributed = distributed.checked_add(share).ok_or(
                    CreditError::OverDistributed {
                        distributed: Amount::MAX,
                        available: distributable,
                    },
                )?;
                shares.push((*depositor, share));
            }
        }
        if distributed > distributable {
            return Err(CreditError::OverDistributed {
                distributed,
                available: distributable,
            });
        }

        let mut principals = self.principals.clone();
        for (depositor, share) in &shares {
            let p = principals.entry(*depositor).or_insert(0);
            // Bounded by the checked `total_staked` above.
            *p = p.checked_add(*share).ok_or(CreditError::OverDistributed {
                distributed,
                available: distributable,
            })?;
        }
        self.principals = principals;
        self.total_staked = total_staked;
        self.unattributed = distributable - distributed;
        self.check_invariant()?;
        Ok(CompoundCredit {
            amount,
            shares,
            distributed,
            unattributed: self.unattributed,
        })
    }

    pub fn debit(&mut self, depositor: &Address, amount: Amount) -> Result<(), DebitError> {
        let available = self.principal_of(depositor);
        if amount > available {
            return Err(DebitError::InsufficientBalance {
                depositor: *depositor,
                requested: amount,
                available,
            });
        }
        self.principals.insert(*depositor, available - amount);
        self.total_staked -= amount;
        self.check_invariant()?;
        Ok(())
    }

    pub fn check_invariant(&self) -> Result<(), InvariantViolation> {
        let principals = self
            .principals
            .values()
            .try_fold(0u128, |acc, p| acc.checked_add(*p));
        let ok = principals
            .and_then(|p| p.checked_add(self.unattributed))
            .is_some_and(|sum| sum == self.total_staked);
        if ok {
            Ok(())
        } else {
            Err(InvariantViolation {
                total_staked: self.total_staked,
                principals: principals.unwrap_or(Amount::MAX),
                unattributed: self.unattributed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn deposit_tracks_principal_and_total() {
        let mut ledger = StakeLedger::default();
        let d = ledger.deposit(addr(1), 100).unwrap();
        assert_eq!(d.principal, 100);
        assert_eq!(d.total_staked, 100);
        let d = ledger.deposit(addr(1), 50).unwrap();
        assert_eq!(d.principal, 150);
        ledger.deposit(addr(2), 25).unwrap();
        assert_eq!(ledger.total_staked(), 175);
        assert_eq!(ledger.depositor_count(), 2);
    }

    #[test]
    fn deposit_zero_rejected() {
        let mut ledger = StakeLedger::default();
        assert_eq!(ledger.deposit(addr(1), 0), Err(DepositError::ZeroAmount));
        assert_eq!(ledger, StakeLedger::default());
    }

    #[test]
    fn deposit_overflow_rejected_without_mutation() {
        let mut ledger = StakeLedger::default();
        ledger.deposit(addr(1), Amount::MAX).unwrap();
        let before = ledger.clone();
        assert!(matches!(
            ledger.deposit(addr(2), 1),
            Err(DepositError::Overflow { .. })
        ));
        assert_eq!(ledger, before);
    }

    #[test]
    fn pro_rata_sixty_forty() {
        let mut ledger = StakeLedger::default();
        ledger.deposit(addr(1), 60).unwrap();
        ledger.deposit(addr(2), 40).unwrap();
        let credit = ledger.credit_compound(10).unwrap();
        assert_eq!(ledger.principal_of(&addr(1)), 66);
        assert_eq!(ledger.principal_of(&addr(2)), 44);
        assert_eq!(ledger.total_staked(), 110);
        assert_eq!(credit.distributed, 10);
        assert_eq!(credit.unattributed, 0);
    }

    #[test]
    fn remainder_is_carried_not_dropped() {
        let mut ledger = StakeLedger::default();
        for b in 1..=3 {
            ledger.deposit(addr(b), 1).unwrap();
        }
        let credit = ledger.credit_compound(10).unwrap();
        assert_eq!(credit.distributed, 9);
        assert_eq!(ledger.unattributed(), 1);
        assert_eq!(ledger.total_staked(), 13);
        for b in 1..=3 {
            assert_eq!(ledger.principal_of(&addr(b)), 4);
        }
        // 2 new + 1 carried = 3, split evenly.
        let credit = ledger.credit_compound(2).unwrap();
        assert_eq!(credit.distributed, 3);
        assert_eq!(ledger.unattributed(), 0);
        for b in 1..=3 {
            assert_eq!(ledger.principal_of(&addr(b)), 5);
        }
        assert_eq!(ledger.total_staked(), 15);
    }

    #[test]
    fn credit_with_no_principal_is_carried() {
        let mut ledger = StakeLedger::default();
        let credit = ledger.credit_compound(7).unwrap();
        assert!(credit.shares.is_empty());
        assert_eq!(ledger.total_staked(), 7);
        assert_eq!(ledger.unattributed(), 7);
        ledger.deposit(addr(1), 10).unwrap();
        ledger.credit_compound(0).unwrap();
        assert_eq!(ledger.principal_of(&addr(1)), 17);
        assert_eq!(ledger.unattributed(), 0);
    }

    #[test]
    fn eighteen_decimal_amounts_compound() {
        let e18: Amount = 1_000_000_000_000_000_000;
        let mut ledger = StakeLedger::default();
        ledger.deposit(addr(1), e18).unwrap();
        let credit = ledger.credit_compound(1000 * e18).unwrap();
        assert_eq!(credit.distributed, 1000 * e18);
        assert_eq!(ledger.principal_of(&addr(1)), 1001 * e18);

        // 10k LP across two depositors, 50 LP credited.
        let mut ledger = StakeLedger::default();
        ledger.deposit(addr(1), 6_000 * e18).unwrap();
        ledger.deposit(addr(2), 4_000 * e18 + 1).unwrap();
        let credit = ledger.credit_compound(50 * e18).unwrap();
        assert_eq!(credit.distributed + credit.unattributed, 50 * e18);
        assert!(credit.unattributed < 2);
        assert_eq!(ledger.total_staked(), 10_050 * e18 + 1);
        ledger.check_invariant().unwrap();
    }

    #[test]
    fn failed_share_is_internal() {
        let mut ledger = StakeLedger::default();
        ledger.deposit(addr(1), 10).unwrap();
        let before = ledger.clone();
        let err = ledger.credit_compound_with(5, |_, _, _| None).unwrap_err();
        assert_eq!(
            err,
            CreditError::Distribution {
                depositor: addr(1),
                principal: 10,
            }
        );
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(ledger, before);
    }

    #[test]
    fn over_distribution_rejected() {
        let mut ledger = StakeLedger::default();
        ledger.deposit(addr(1), 10).unwrap();
        let before = ledger.clone();
        let err = ledger
            .credit_compound_with(5, |p, _, _| Some(p))
            .unwrap_err();
        assert!(matches!(err, CreditError::OverDistributed { .. }));
        assert_eq!(ledger, before);
    }

    #[test]
    fn debit_checks_balance() {
        let mut ledger = StakeLedger::default();
        ledger.deposit(addr(1), 10).unwrap();
        assert_eq!(
            ledger.debit(&addr(1), 11),
            Err(DebitError::InsufficientBalance {
                depositor: addr(1),
                requested: 11,
                available: 10,
            })
        );
        ledger.debit(&addr(1), 10).unwrap();
        assert_eq!(ledger.principal_of(&addr(1)), 0);
        assert_eq!(ledger.total_staked(), 0);
        // Depositor record survives at zero.
        assert_eq!(ledger.depositor_count(), 1);
    }

    #[test]
    fn invariant_holds_on_fresh_ledger() {
        assert!(StakeLedger::default().check_invariant().is_ok());
    }
}
