use log::debug;
use serde::Serialize;
use thiserror::Error;

use super::balance::BalanceCalculator;
use super::block::Block;
use super::crypto::{Address, CryptoError, DigitalSignature, KeyPair};
use super::transaction::{Transaction, TransactionError};
use crate::config::Config;

/// Errors that can occur during wallet operations
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Amount exceeds balance: requested {amount}, available {balance}")]
    InsufficientBalance { amount: u64, balance: u64 },

    #[error("Key does not belong to address {0}")]
    AddressMismatch(Address),

    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// A keypair and the last balance known for it
///
/// The balance is never decremented when spending. It only changes when it is
/// recomputed from a chain.
#[derive(Debug, Clone)]
pub struct Wallet {
    key_pair: KeyPair,
    balance: u64,
    config: Config,
}

impl Wallet {
    /// Creates a wallet with a fresh keypair and the starting balance
    pub fn new(config: &Config) -> Self {
        Self::with_balance(KeyPair::generate(), config.starting_balance, config)
    }

    /// Creates a wallet from a hex-encoded private key with the starting balance
    pub fn from_private_key_hex(private_key_hex: &str, config: &Config) -> Result<Self, WalletError> {
        let key_pair = KeyPair::from_private_key_hex(private_key_hex)?;
        Ok(Self::with_balance(key_pair, config.starting_balance, config))
    }

    /// Restores the wallet behind `address` from its hex-encoded private key
    ///
    /// # Arguments
    ///
    /// * `address` - The base58 address the key is expected to derive
    /// * `private_key_hex` - The wallet's private key
    /// * `config` - Protocol configuration; the balance starts at the starting balance
    ///
    /// # Returns
    ///
    /// The wallet, or `AddressMismatch` if the key derives a different address
    pub fn login(address: &str, private_key_hex: &str, config: &Config) -> Result<Self, WalletError> {
        let address: Address = address.parse()?;
        let wallet = Self::from_private_key_hex(private_key_hex, config)?;

        if wallet.address() != &address {
            return Err(WalletError::AddressMismatch(address));
        }

        debug!("Logged in wallet {}", address);
        Ok(wallet)
    }

    /// Creates a wallet from an existing keypair and an explicit balance
    pub fn with_balance(key_pair: KeyPair, balance: u64, config: &Config) -> Self {
        Wallet {
            key_pair,
            balance,
            config: config.clone(),
        }
    }

    /// Gets the wallet's address (its public key)
    pub fn address(&self) -> &Address {
        self.key_pair.address()
    }

    /// Gets the last known balance
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Signs `data` with the wallet's private key
    pub fn sign<T: Serialize + ?Sized>(&self, data: &T) -> Result<DigitalSignature, CryptoError> {
        self.key_pair.sign(data)
    }

    /// Creates a transaction paying `amount` to `recipient`
    ///
    /// # Arguments
    ///
    /// * `amount` - The amount to transfer
    /// * `recipient` - The address receiving the amount
    /// * `chain` - When given, the balance is recomputed from it first
    ///
    /// # Returns
    ///
    /// The signed transaction, or `InsufficientBalance` if `amount` exceeds the balance
    pub fn create_transaction(
        &mut self,
        amount: u64,
        recipient: Address,
        chain: Option<&[Block]>,
    ) -> Result<Transaction, WalletError> {
        if let Some(chain) = chain {
            self.balance = Self::calculate_balance(chain, self.address(), &self.config);
            debug!("Recomputed balance of {}: {}", self.address(), self.balance);
        }

        if amount > self.balance {
            return Err(WalletError::InsufficientBalance {
                amount,
                balance: self.balance,
            });
        }

        Ok(Transaction::create(self, recipient, amount, self.balance)?)
    }

    /// Replays `chain` to find the current balance of `address`
    pub fn calculate_balance(chain: &[Block], address: &Address, config: &Config) -> u64 {
        BalanceCalculator::new(config).calculate_balance(chain, address)
    }
}
