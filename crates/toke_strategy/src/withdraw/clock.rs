//! Epoch sources for withdrawal maturity.

use crate::primitives::Epoch;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

/// One epoch is one day.
pub const EPOCH_LENGTH_SECS: u64 = 86_400;

pub trait EpochClock: Send + Sync {
    fn current_epoch(&self) -> Epoch;
}

/// Wall-clock epochs: whole `epoch_length_secs` periods since the Unix epoch.
#[derive(Clone, Debug)]
pub struct SystemClock {
    epoch_length_secs: u64,
}

impl SystemClock {
    pub fn new(epoch_length_secs: u64) -> Self {
        Self {
            epoch_length_secs: epoch_length_secs.max(1),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(EPOCH_LENGTH_SECS)
    }
}

impl EpochClock for SystemClock {
    fn current_epoch(&self) -> Epoch {
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        now / self.epoch_length_secs
    }
}

/// Settable clock for tests and offline replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    epoch: AtomicU64,
}

impl ManualClock {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch: AtomicU64::new(epoch),
        }
    }

    pub fn set(&self, epoch: Epoch) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    pub fn advance(&self, epochs: Epoch) -> Epoch {
        self.epoch.fetch_add(epochs, Ordering::SeqCst) + epochs
    }
}

impl EpochClock for ManualClock {
    fn current_epoch(&self) -> Epoch {
        self.epoch.load(Ordering::SeqCst)
    }
}
