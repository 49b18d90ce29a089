//! Reward compounding and the external-protocol interfaces it drives.

mod collaborators;
mod engine;
mod memory;

pub use collaborators::{CollaboratorError, Exchange, RewardsDistributor, StakingPool};
pub use engine::{CompoundAssets, CompoundEngine, CompoundError, CompoundOutcome, Collaborators};
pub use memory::{FixedRateExchange, MemoryRewards, MemoryStaking};
