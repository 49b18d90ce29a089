//! Deployment configuration: network presets, address book, signature domain.
//!
//! Load from: env `TOKE_STRATEGY_CONFIG_PATH`, or `./config/strategy.json`, or
//! `./strategy.json`. With none present the hardhat preset is used.

use crate::primitives::{Address, Amount};
use crate::strategy::Deployment;
use crate::voucher::DomainDescriptor;
use crate::withdraw::EPOCH_LENGTH_SECS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "TOKE_STRATEGY_CONFIG_PATH";

/// First contract deployed by hardhat account #0.
pub const HARDHAT_STRATEGY: Address =
    Address::from_hex_literal("0x5FbDB2315678afecb367f032d93F642f64180aa3");
/// Hardhat default account #0.
pub const HARDHAT_SIGNER: Address =
    Address::from_hex_literal("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid rpc url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Mainnet,
    MainnetFork,
    Hardhat,
    Localhost,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::MainnetFork => "mainnet-fork",
            Network::Hardhat => "hardhat",
            Network::Localhost => "localhost",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::MainnetFork | Network::Hardhat | Network::Localhost => 31337,
        }
    }

    fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://cloudflare-eth.com",
            Network::MainnetFork | Network::Hardhat | Network::Localhost => {
                "http://127.0.0.1:8545"
            }
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mainnet" => Ok(Network::Mainnet),
            "mainnet-fork" => Ok(Network::MainnetFork),
            "hardhat" => Ok(Network::Hardhat),
            "localhost" => Ok(Network::Localhost),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Contracts the strategy interacts with. Fork networks share mainnet addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    /// UniswapV2 TOKE-ETH pair: the LP token depositors bring.
    pub toke_eth_univ2_pair: Address,
    /// TOKE: the reward asset.
    pub toke_asset: Address,
    pub weth_asset: Address,
    /// Tokemak rewards contract (voucher claims).
    pub tokemak_rewards: Address,
    /// Tokemak manager (cycle index).
    pub tokemak_manager: Address,
    /// Tokemak UNIv2 LP token pool (staking).
    pub tokemak_univ2_lp_pool: Address,
    pub univ2_router: Address,
}

impl AddressBook {
    /// Ethereum mainnet deployments.
    pub const MAINNET: AddressBook = AddressBook {
        toke_eth_univ2_pair: Address::from_hex_literal(
            "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc",
        ),
        toke_asset: Address::from_hex_literal("0x2e9d63788249371f1dfc918a52f8d799f4a38c94"),
        weth_asset: Address::from_hex_literal("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
        tokemak_rewards: Address::from_hex_literal("0x79dD22579112d8a5F7347c5ED7E609e60da713C5"),
        tokemak_manager: Address::from_hex_literal("0xf663F4b30dD18546cb71a607b7a89a36e92a244C"),
        tokemak_univ2_lp_pool: Address::from_hex_literal(
            "0x1b429e75369ea5cd84421c1cc182cee5f3192fd3",
        ),
        univ2_router: Address::from_hex_literal("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
    };
}

impl Default for AddressBook {
    fn default() -> Self {
        Self::MAINNET
    }
}

/// Name and version of the voucher signature domain. Changing either
/// invalidates every issued voucher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub version: String,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: "TOKE Distribution".to_string(),
            version: "1".to_string(),
        }
    }
}

/// Exchange rate used by the local in-memory exchange (LP out per reward in).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub swap_rate_numerator: Amount,
    pub swap_rate_denominator: Amount,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            swap_rate_numerator: 1,
            swap_rate_denominator: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub network: Network,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Deployed strategy address: voucher recipient and domain verifying contract.
    pub strategy_address: Address,
    /// Address whose signatures authorize reward vouchers.
    pub trusted_signer: Address,
    #[serde(default)]
    pub domain: DomainConfig,
    #[serde(default)]
    pub addresses: AddressBook,
    #[serde(default = "default_epoch_length")]
    pub epoch_length_secs: u64,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_epoch_length() -> u64 {
    EPOCH_LENGTH_SECS
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::preset(Network::Hardhat)
    }
}

impl StrategyConfig {
    /// Built-in settings for `network`. Local networks use hardhat's first
    /// deployment address and default account #0 as signer; mainnet has no
    /// default strategy or signer and must be configured.
    pub fn preset(network: Network) -> Self {
        let (strategy_address, trusted_signer) = match network {
            Network::Mainnet => (Address::ZERO, Address::ZERO),
            _ => (HARDHAT_STRATEGY, HARDHAT_SIGNER),
        };
        Self {
            network,
            chain_id: network.chain_id(),
            rpc_url: network.default_rpc_url().to_string(),
            strategy_address,
            trusted_signer,
            domain: DomainConfig::default(),
            addresses: AddressBook::default(),
            epoch_length_secs: EPOCH_LENGTH_SECS,
            simulation: SimulationConfig::default(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), network = %config.network, "config loaded");
        Ok(config)
    }

    /// Load config: env TOKE_STRATEGY_CONFIG_PATH, then ./config/strategy.json,
    /// then ./strategy.json, then the hardhat preset.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from_path(Path::new(&path));
        }
        for candidate in [
            Path::new("./config/strategy.json"),
            Path::new("./strategy.json"),
        ] {
            if candidate.exists() {
                return Self::load_from_path(candidate);
            }
        }
        debug!("no config file, using hardhat preset");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.rpc_url)?;
        if self.chain_id == 0 {
            return Err(ConfigError::Invalid("chain_id must be non-zero".into()));
        }
        if self.strategy_address.is_zero() {
            return Err(ConfigError::Invalid("strategy_address is not set".into()));
        }
        if self.trusted_signer.is_zero() {
            return Err(ConfigError::Invalid("trusted_signer is not set".into()));
        }
        if self.epoch_length_secs == 0 {
            return Err(ConfigError::Invalid("epoch_length_secs must be non-zero".into()));
        }
        if self.simulation.swap_rate_denominator == 0 {
            return Err(ConfigError::Invalid(
                "simulation.swap_rate_denominator must be non-zero".into(),
            ));
        }
        if self.domain.name.is_empty() || self.domain.version.is_empty() {
            return Err(ConfigError::Invalid("domain name and version are required".into()));
        }
        Ok(())
    }

    pub fn domain_descriptor(&self) -> DomainDescriptor {
        DomainDescriptor {
            name: self.domain.name.clone(),
            version: self.domain.version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.strategy_address,
        }
    }

    pub fn deployment(&self) -> Deployment {
        Deployment {
            chain_id: self.chain_id,
            strategy_address: self.strategy_address,
            lp_token: self.addresses.toke_eth_univ2_pair,
            reward_token: self.addresses.toke_asset,
            domain: self.domain_descriptor(),
            trusted_signer: self.trusted_signer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardhat_preset_is_valid() {
        let config = StrategyConfig::default();
        assert_eq!(config.network, Network::Hardhat);
        assert_eq!(config.chain_id, 31337);
        config.validate().unwrap();
        let d = config.deployment();
        assert_eq!(d.domain.verifying_contract, config.strategy_address);
        assert_eq!(
            d.lp_token.to_string(),
            "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc"
        );
    }

    #[test]
    fn address_book_has_no_zero_entries() {
        let book = AddressBook::default();
        for (name, addr) in [
            ("toke_eth_univ2_pair", book.toke_eth_univ2_pair),
            ("toke_asset", book.toke_asset),
            ("weth_asset", book.weth_asset),
            ("tokemak_rewards", book.tokemak_rewards),
            ("tokemak_manager", book.tokemak_manager),
            ("tokemak_univ2_lp_pool", book.tokemak_univ2_lp_pool),
            ("univ2_router", book.univ2_router),
        ] {
            assert!(!addr.is_zero(), "{name} is zero");
        }
        assert_eq!(
            book.tokemak_rewards.to_string(),
            "0x79dd22579112d8a5f7347c5ed7e609e60da713c5"
        );
        assert_eq!(
            StrategyConfig::preset(Network::Localhost).trusted_signer.to_string(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn mainnet_preset_requires_addresses() {
        let config = StrategyConfig::preset(Network::Mainnet);
        assert_eq!(config.chain_id, 1);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn network_names_roundtrip() {
        for n in [
            Network::Mainnet,
            Network::MainnetFork,
            Network::Hardhat,
            Network::Localhost,
        ] {
            assert_eq!(n.as_str().parse::<Network>().unwrap(), n);
        }
        assert!("rinkeby".parse::<Network>().is_err());
    }

    #[test]
    fn load_from_path_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strategy.json");
        std::fs::write(
            &path,
            r#"{
                "network": "mainnet-fork",
                "chain_id": 31337,
                "rpc_url": "http://127.0.0.1:8545",
                "strategy_address": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
                "trusted_signer": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            }"#,
        )
        .unwrap();
        let config = StrategyConfig::load_from_path(&path).unwrap();
        assert_eq!(config.network, Network::MainnetFork);
        assert_eq!(config.epoch_length_secs, EPOCH_LENGTH_SECS);
        assert_eq!(config.domain, DomainConfig::default());
        assert_eq!(config.addresses, AddressBook::default());
    }

    #[test]
    fn bad_rpc_url_rejected() {
        let config = StrategyConfig {
            rpc_url: "not a url".into(),
            ..StrategyConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Url(_))));
    }
}
