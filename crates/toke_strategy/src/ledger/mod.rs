//! Depositor balances, aggregate stake, and the event journal.

mod events;
mod stake;

pub use events::{Event, EventKind};
pub use stake::{
    pro_rata, CompoundCredit, CreditError, DebitError, DepositError, Deposited,
    InvariantViolation, StakeLedger,
};
