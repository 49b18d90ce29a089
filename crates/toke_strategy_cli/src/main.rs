//! toke-strategy CLI: run the strategy locally against in-memory protocols,
//! sign vouchers, and query the live Tokemak contracts.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toke_strategy::compound::{FixedRateExchange, MemoryRewards, MemoryStaking};
use toke_strategy::withdraw::RequestState;
use toke_strategy::{
    Address, Amount, Collaborators, EpochClock, ManualClock, RewardVoucher, RpcClient, RpcConfig,
    Store, Strategy, StrategyConfig, SystemClock, VoucherClaim, VoucherSigner,
};
use tracing::{info, warn};

const DEFAULT_KEY_ENV: &str = "TEST_ETH_ACCOUNT_PRIVATE_KEY";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => StrategyConfig::load_from_path(path)?,
        None => StrategyConfig::load()?,
    };
    match cli.command {
        Command::Deposit(args) => run_deposit(&cli.state, &config, args),
        Command::RequestWithdrawal(args) => run_request_withdrawal(&cli.state, &config, args),
        Command::Withdraw(args) => run_withdraw(&cli.state, &config, args),
        Command::Compound(args) => run_compound(&cli.state, &config, args),
        Command::SignVoucher(args) => run_sign_voucher(&config, args),
        Command::Status(args) => run_status(&cli.state, &config, args),
        Command::Cycle(args) => run_cycle(&config, args),
    }
}

#[derive(Parser)]
#[command(name = "toke-strategy")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Auto-compounding Tokemak TOKE-ETH LP strategy")]
struct Cli {
    /// Config file; defaults to $TOKE_STRATEGY_CONFIG_PATH, ./config/strategy.json, ./strategy.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    state: StateArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
struct StateArgs {
    #[arg(long, global = true, default_value = "./data/strategy.sqlite")]
    db: PathBuf,
    /// Pin the current epoch instead of reading the system clock.
    #[arg(long, global = true)]
    epoch: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Deposit LP tokens for a depositor and stake them.
    Deposit(AmountArgs),
    /// Reserve part of a balance; claimable after the epoch delay.
    RequestWithdrawal(AmountArgs),
    /// Pay out a matured withdrawal request.
    Withdraw(DepositorArgs),
    /// Claim a signed reward voucher and reinvest it.
    Compound(CompoundArgs),
    /// Sign a reward voucher for the configured strategy.
    SignVoucher(SignArgs),
    /// Print strategy totals, or one depositor's position.
    Status(StatusArgs),
    /// Query chain id, rewards cycle and rewards signer over RPC.
    Cycle(CycleArgs),
}

#[derive(Parser)]
struct AmountArgs {
    #[arg(long)]
    depositor: Address,
    #[arg(long)]
    amount: Amount,
}

#[derive(Parser)]
struct DepositorArgs {
    #[arg(long)]
    depositor: Address,
}

#[derive(Parser)]
struct CompoundArgs {
    /// Voucher JSON as written by `sign-voucher`.
    #[arg(long)]
    voucher: PathBuf,
}

#[derive(Parser)]
struct SignArgs {
    #[arg(long)]
    cycle: u64,
    #[arg(long)]
    amount: Amount,
    /// Defaults to the configured strategy address.
    #[arg(long)]
    recipient: Option<Address>,
    /// Environment variable holding the hex signing key.
    #[arg(long, default_value = DEFAULT_KEY_ENV)]
    key_env: String,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser)]
struct StatusArgs {
    #[arg(long)]
    depositor: Option<Address>,
}

#[derive(Parser)]
struct CycleArgs {
    #[arg(long)]
    rpc_url: Option<String>,
}

#[derive(Serialize)]
struct StatusReport {
    network: String,
    chain_id: u64,
    strategy_address: Address,
    epoch: u64,
    total_staked: Amount,
    unattributed: Amount,
    depositors: usize,
    pending_withdrawals: usize,
    reserved_total: Amount,
    events: usize,
    snapshots: u64,
}

#[derive(Serialize)]
struct CycleReport {
    chain_id: u64,
    configured_chain_id: u64,
    block_number: u64,
    current_cycle: u64,
    rewards_signer: Address,
    configured_signer: Address,
}

fn clock(args: &StateArgs, config: &StrategyConfig) -> Arc<dyn EpochClock> {
    match args.epoch {
        Some(epoch) => Arc::new(ManualClock::new(epoch)),
        None => Arc::new(SystemClock::new(config.epoch_length_secs)),
    }
}

/// Resume the strategy from the latest stored snapshot. The in-memory pool
/// starts with exactly what the ledger says is staked.
fn open_strategy(
    args: &StateArgs,
    config: &StrategyConfig,
) -> Result<(Store, Strategy), Box<dyn std::error::Error>> {
    let store = Store::open(&args.db)?;
    let snapshot = store.latest()?.unwrap_or_default();
    let collaborators = Collaborators {
        staking: Arc::new(MemoryStaking::with_balance(
            snapshot.state.ledger.total_staked(),
        )),
        exchange: Arc::new(FixedRateExchange::new(
            config.simulation.swap_rate_numerator,
            config.simulation.swap_rate_denominator,
        )),
        rewards: Arc::new(MemoryRewards::default()),
    };
    let strategy = Strategy::from_snapshot(
        config.deployment(),
        collaborators,
        clock(args, config),
        snapshot,
    );
    Ok((store, strategy))
}

fn commit(store: &Store, strategy: &Strategy) -> Result<(), Box<dyn std::error::Error>> {
    let hash = store.save(&strategy.snapshot()?)?;
    info!(%hash, "state committed");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_deposit(
    state: &StateArgs,
    config: &StrategyConfig,
    args: AmountArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (store, strategy) = open_strategy(state, config)?;
    let deposited = strategy.deposit(args.depositor, args.amount)?;
    commit(&store, &strategy)?;
    print_json(&deposited)
}

fn run_request_withdrawal(
    state: &StateArgs,
    config: &StrategyConfig,
    args: AmountArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (store, strategy) = open_strategy(state, config)?;
    let request = strategy.request_withdrawal(args.depositor, args.amount)?;
    commit(&store, &strategy)?;
    info!(claimable_at_epoch = request.claimable_at(), "request recorded");
    print_json(&request)
}

fn run_withdraw(
    state: &StateArgs,
    config: &StrategyConfig,
    args: DepositorArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (store, strategy) = open_strategy(state, config)?;
    let amount = strategy.withdraw(args.depositor)?;
    commit(&store, &strategy)?;
    println!("{amount}");
    Ok(())
}

fn run_compound(
    state: &StateArgs,
    config: &StrategyConfig,
    args: CompoundArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let voucher: RewardVoucher = serde_json::from_str(&std::fs::read_to_string(&args.voucher)?)?;
    let (store, strategy) = open_strategy(state, config)?;
    let outcome = strategy.auto_compound(&voucher)?;
    commit(&store, &strategy)?;
    print_json(&outcome)
}

fn run_sign_voucher(
    config: &StrategyConfig,
    args: SignArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = std::env::var(&args.key_env)
        .map_err(|_| format!("signing key not set: ${}", args.key_env))?;
    let signer = VoucherSigner::from_hex(&key)?;
    if signer.address() != config.trusted_signer {
        warn!(
            signer = %signer.address(),
            trusted = %config.trusted_signer,
            "key is not the configured trusted signer; voucher will be rejected"
        );
    }
    let voucher = signer.sign(
        &config.domain_descriptor(),
        VoucherClaim {
            chain_id: config.chain_id,
            cycle: args.cycle,
            recipient: args.recipient.unwrap_or(config.strategy_address),
            amount: args.amount,
        },
    )?;
    let json = serde_json::to_string_pretty(&voucher)?;
    match args.out {
        Some(path) => {
            write_file(&path, &json)?;
            info!(path = %path.display(), cycle = args.cycle, "voucher written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{contents}\n"))
}

fn run_status(
    state: &StateArgs,
    config: &StrategyConfig,
    args: StatusArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (store, strategy) = open_strategy(state, config)?;
    if let Some(depositor) = args.depositor {
        let position = strategy.position(&depositor)?;
        if position.request_state == RequestState::Claimable {
            info!(%depositor, "withdrawal is claimable");
        }
        return print_json(&position);
    }
    let snapshot = strategy.snapshot()?;
    let ledger = &snapshot.state.ledger;
    print_json(&StatusReport {
        network: config.network.to_string(),
        chain_id: config.chain_id,
        strategy_address: config.strategy_address,
        epoch: strategy.current_epoch(),
        total_staked: ledger.total_staked(),
        unattributed: ledger.unattributed(),
        depositors: ledger.depositor_count(),
        pending_withdrawals: snapshot.state.queue.len(),
        reserved_total: snapshot.state.queue.reserved_total(),
        events: snapshot.events.len(),
        snapshots: store.history_len()?,
    })
}

fn run_cycle(config: &StrategyConfig, args: CycleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let url = args.rpc_url.unwrap_or_else(|| config.rpc_url.clone());
    let client = RpcClient::new(RpcConfig::new(url))?;
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        Ok::<_, toke_strategy::chain::RpcError>(CycleReport {
            chain_id: client.chain_id().await?,
            configured_chain_id: config.chain_id,
            block_number: client.block_number().await?,
            current_cycle: client
                .current_cycle_index(&config.addresses.tokemak_manager)
                .await?,
            rewards_signer: client
                .rewards_signer(&config.addresses.tokemak_rewards)
                .await?,
            configured_signer: config.trusted_signer,
        })
    })?;
    if report.chain_id != report.configured_chain_id {
        warn!(
            rpc = report.chain_id,
            configured = report.configured_chain_id,
            "rpc chain differs from configured chain"
        );
    }
    info!(requests = client.request_count(), "rpc queries complete");
    print_json(&report)
}
