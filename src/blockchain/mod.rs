// Blockchain module
//
// This module contains the transactional core:
// - Keypairs, signing and verification
// - Transaction structure
// - Wallets
// - Balance replay over the ledger
// - The in-memory ledger the replay consumes

pub mod balance;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use balance::BalanceCalculator;
pub use block::Block;
pub use chain::Blockchain;
pub use crypto::{Address, DigitalSignature, KeyPair};
pub use transaction::{OutputMap, Transaction, TransactionError, TransactionInput};
pub use wallet::{Wallet, WalletError};
