use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::env;

use crate::blockchain::crypto::Address;
use crate::blockchain::transaction::TransactionInput;

/// Balance every wallet starts with before it appears in the ledger
pub const STARTING_BALANCE: u64 = 1000;

/// Amount minted to a block producer by a reward transaction
pub const MINING_REWARD: u64 = 50;

/// Address of the sentinel input carried by reward transactions
pub const REWARD_ADDRESS: &str = "*authorized-reward*";

const STARTING_BALANCE_VAR: &str = "CRYPTOCHAIN_STARTING_BALANCE";
const MINING_REWARD_VAR: &str = "CRYPTOCHAIN_MINING_REWARD";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Protocol constants shared by wallets, transactions and balance replay
///
/// Built once at process start and handed to every component that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Balance of a wallet that has never sent a transaction
    pub starting_balance: u64,

    /// Amount credited by a reward transaction
    pub mining_reward: u64,

    /// Sentinel sender address of reward transactions
    pub reward_address: Address,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            starting_balance: STARTING_BALANCE,
            mining_reward: MINING_REWARD,
            reward_address: Address(REWARD_ADDRESS.to_string()),
        }
    }
}

impl Config {
    /// Loads the configuration, applying overrides from the environment
    ///
    /// # Returns
    ///
    /// The default configuration with `CRYPTOCHAIN_STARTING_BALANCE` and
    /// `CRYPTOCHAIN_MINING_REWARD` applied when they are set
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup(STARTING_BALANCE_VAR) {
            config.starting_balance = parse_amount(STARTING_BALANCE_VAR, &value)?;
        }

        if let Some(value) = lookup(MINING_REWARD_VAR) {
            config.mining_reward = parse_amount(MINING_REWARD_VAR, &value)?;
        }

        Ok(config)
    }

    /// The sentinel input carried by every reward transaction
    pub fn reward_input(&self) -> TransactionInput {
        TransactionInput::Reward {
            address: self.reward_address.clone(),
        }
    }
}

fn parse_amount(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}
