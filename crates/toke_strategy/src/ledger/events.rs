//! Strategy event journal: one entry per committed state transition.

use crate::primitives::{Address, Amount, Epoch};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Deposited {
        depositor: Address,
        amount: Amount,
        principal: Amount,
        total_staked: Amount,
    },
    Compounded {
        recipient: Address,
        cycle: u64,
        reward: Amount,
        lp_acquired: Amount,
        distributed: Amount,
        unattributed: Amount,
        total_staked: Amount,
    },
    WithdrawalRequested {
        depositor: Address,
        amount: Amount,
        requested_at_epoch: Epoch,
        claimable_at_epoch: Epoch,
    },
    Withdrawn {
        depositor: Address,
        amount: Amount,
        principal: Amount,
        total_staked: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub epoch: Epoch,
}

impl Event {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            kind,
            timestamp: OffsetDateTime::now_utc(),
            epoch,
        }
    }

    /// Depositor the event concerns, if any.
    pub fn depositor(&self) -> Option<&Address> {
        match &self.kind {
            EventKind::Deposited { depositor, .. }
            | EventKind::WithdrawalRequested { depositor, .. }
            | EventKind::Withdrawn { depositor, .. } => Some(depositor),
            EventKind::Compounded { .. } => None,
        }
    }
}
