//! toke_strategy: auto-compounding Tokemak LP strategy.
//!
//! Depositors stake a UniswapV2 TOKE-ETH LP token; keepers compound TOKE
//! rewards claimed with signed vouchers; withdrawals mature after a fixed
//! epoch delay. External protocols sit behind narrow traits.

pub mod chain;
pub mod compound;
pub mod config;
pub mod error;
pub mod ledger;
pub mod primitives;
pub mod strategy;
pub mod voucher;
pub mod withdraw;

pub use chain::{RpcClient, RpcConfig, Store};
pub use compound::{Collaborators, CompoundEngine, CompoundError, CompoundOutcome};
pub use config::{Network, StrategyConfig};
pub use error::ErrorKind;
pub use ledger::{Event, EventKind, StakeLedger};
pub use primitives::{Address, Amount, Epoch};
pub use strategy::{Deployment, Position, Strategy, StrategyError, StrategySnapshot, StrategyState};
pub use voucher::{DomainDescriptor, RewardVoucher, VoucherClaim, VoucherSigner, VoucherVerifier};
pub use withdraw::{EpochClock, ManualClock, SystemClock, WithdrawalQueue, EPOCH_DELAY};
