//! Transactional core of a toy cryptocurrency: wallets, signed transactions
//! and balance replay over a block-organized ledger.

pub mod blockchain;
pub mod config;

pub use blockchain::{
    Address, BalanceCalculator, Block, Blockchain, KeyPair, Transaction, TransactionError,
    TransactionInput, Wallet, WalletError,
};
pub use config::Config;
