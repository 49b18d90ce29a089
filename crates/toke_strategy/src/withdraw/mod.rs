//! Epoch-gated withdrawal requests.

mod clock;
mod queue;

pub use clock::{EpochClock, ManualClock, SystemClock, EPOCH_LENGTH_SECS};
pub use queue::{RequestState, WithdrawError, WithdrawalQueue, WithdrawalRequest, EPOCH_DELAY};
