//! Randomised operation sequences: whatever succeeds or fails, the books
//! balance and match what was actually staked.

use proptest::prelude::*;
use std::sync::Arc;
use toke_strategy::compound::{FixedRateExchange, MemoryRewards, MemoryStaking, StakingPool};
use toke_strategy::{
    Address, Amount, Collaborators, Deployment, DomainDescriptor, ManualClock,
    Strategy as Vault, VoucherClaim, VoucherSigner,
};

const STRATEGY: Address = Address::new([0x5f; 20]);
const CHAIN_ID: u64 = 31337;
const E18: Amount = 1_000_000_000_000_000_000;
const E24: Amount = 1_000_000 * E18;

#[derive(Clone, Debug)]
enum Op {
    Deposit(u8, Amount),
    Request(u8, Amount),
    Withdraw(u8),
    Compound(Amount),
    Advance(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 1u128..1_000_000_000).prop_map(|(d, a)| Op::Deposit(d, a)),
        (0u8..4, 1u128..1_000_000_000).prop_map(|(d, a)| Op::Request(d, a)),
        (0u8..4).prop_map(Op::Withdraw),
        (1u128..10_000_000).prop_map(Op::Compound),
        (0u64..10).prop_map(Op::Advance),
    ]
}

fn depositor(i: u8) -> Address {
    Address::new([i + 1; 20])
}

struct Run {
    strategy: Vault,
    signer: VoucherSigner,
    clock: Arc<ManualClock>,
    staking: Arc<MemoryStaking>,
    next_cycle: u64,
}

fn run() -> Run {
    let signer = VoucherSigner::from_bytes(&[0x22; 32]).unwrap();
    let deployment = Deployment {
        chain_id: CHAIN_ID,
        strategy_address: STRATEGY,
        lp_token: Address::new([0xb4; 20]),
        reward_token: Address::new([0x2e; 20]),
        domain: DomainDescriptor {
            name: "TOKE Distribution".into(),
            version: "1".into(),
            chain_id: CHAIN_ID,
            verifying_contract: STRATEGY,
        },
        trusted_signer: signer.address(),
    };
    let clock = Arc::new(ManualClock::new(0));
    let staking = Arc::new(MemoryStaking::default());
    let strategy = Vault::new(
        deployment,
        Collaborators {
            staking: staking.clone(),
            exchange: Arc::new(FixedRateExchange::new(2, 3)),
            rewards: Arc::new(MemoryRewards::default()),
        },
        clock.clone(),
    );
    Run {
        strategy,
        signer,
        clock,
        staking,
        next_cycle: 1,
    }
}

impl Run {
    fn apply(&mut self, op: &Op) {
        // Individual calls may be rejected; only the aggregate state matters here.
        let _ = match *op {
            Op::Deposit(d, amount) => self.strategy.deposit(depositor(d), amount).map(|_| ()),
            Op::Request(d, amount) => self
                .strategy
                .request_withdrawal(depositor(d), amount)
                .map(|_| ()),
            Op::Withdraw(d) => self.strategy.withdraw(depositor(d)).map(|_| ()),
            Op::Compound(amount) => {
                let voucher = self
                    .signer
                    .sign(
                        &self.strategy.deployment().domain,
                        VoucherClaim {
                            chain_id: CHAIN_ID,
                            cycle: self.next_cycle,
                            recipient: STRATEGY,
                            amount,
                        },
                    )
                    .unwrap();
                self.next_cycle += 1;
                self.strategy.auto_compound(&voucher).map(|_| ())
            }
            Op::Advance(n) => {
                self.clock.advance(n);
                Ok(())
            }
        };
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn total_staked_tracks_principals_and_pool(ops in prop::collection::vec(op(), 1..40)) {
        let mut r = run();
        for op in &ops {
            r.apply(op);
            let snap = r.strategy.snapshot().unwrap();
            let ledger = &snap.state.ledger;
            prop_assert!(ledger.check_invariant().is_ok());

            let principals: Amount = (0..4).map(|i| ledger.principal_of(&depositor(i))).sum();
            prop_assert_eq!(ledger.total_staked(), principals + ledger.unattributed());
            prop_assert_eq!(r.staking.balance().unwrap(), ledger.total_staked());

            for i in 0..4 {
                let d = depositor(i);
                prop_assert!(snap.state.queue.reserved(&d) <= ledger.principal_of(&d));
            }
        }
    }

    #[test]
    fn token_scale_compounds_are_accepted(
        deposits in prop::collection::vec(E18..E24, 1..4),
        reward in E18..E24,
    ) {
        let r = run();
        for (i, amount) in deposits.iter().enumerate() {
            r.strategy.deposit(depositor(i as u8), *amount).unwrap();
        }
        let voucher = r
            .signer
            .sign(
                &r.strategy.deployment().domain,
                VoucherClaim {
                    chain_id: CHAIN_ID,
                    cycle: 1,
                    recipient: STRATEGY,
                    amount: reward,
                },
            )
            .unwrap();
        let outcome = r.strategy.auto_compound(&voucher);
        prop_assert!(outcome.is_ok(), "{:?}", outcome);

        let snap = r.strategy.snapshot().unwrap();
        let ledger = &snap.state.ledger;
        let deposited: Amount = deposits.iter().sum();
        prop_assert!(ledger.check_invariant().is_ok());
        prop_assert_eq!(ledger.total_staked(), deposited + reward * 2 / 3);
        prop_assert!(ledger.unattributed() < deposits.len() as Amount);
        prop_assert_eq!(r.staking.balance().unwrap(), ledger.total_staked());
    }

    #[test]
    fn mature_request_always_pays_in_full(amount in 1u128..u128::from(u64::MAX), wait in 7u64..30) {
        let r = run();
        let d = depositor(0);
        r.strategy.deposit(d, amount).unwrap();
        r.strategy.request_withdrawal(d, amount).unwrap();
        r.clock.advance(wait);
        prop_assert_eq!(r.strategy.withdraw(d).unwrap(), amount);
        prop_assert_eq!(r.strategy.total_staked().unwrap(), 0);
    }
}
