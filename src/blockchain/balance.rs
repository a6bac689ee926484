//! Balance replay over the ledger.
//!
//! A wallet's balance is rebuilt in two phases:
//!
//! 1. Scan blocks newest to oldest for the wallet's most recent outgoing
//!    transaction (the cutoff). Its change output to the wallet becomes the
//!    baseline; everything before it is already accounted for by the input
//!    amount it spent.
//! 2. Add every output to the wallet that happened after the cutoff. Wallet
//!    spends are compared by input timestamp. Rewards carry no timestamp and
//!    count when they sit in the cutoff's block or a later one.
//!
//! A wallet that never spent starts from the starting balance and receives
//! every output addressed to it.

use chrono::{DateTime, Utc};
use log::debug;

use super::block::Block;
use super::crypto::Address;
use super::transaction::{Transaction, TransactionInput};
use crate::config::Config;

/// Computes wallet balances from a chain of blocks
#[derive(Debug, Clone, Copy)]
pub struct BalanceCalculator {
    starting_balance: u64,
}

/// The most recent outgoing transaction of a wallet
#[derive(Debug, Clone, Copy)]
struct Cutoff<'a> {
    block_index: usize,
    transaction: &'a Transaction,
    timestamp: DateTime<Utc>,
}

impl BalanceCalculator {
    /// Creates a calculator using the configured starting balance
    pub fn new(config: &Config) -> Self {
        BalanceCalculator {
            starting_balance: config.starting_balance,
        }
    }

    /// Replays `chain` (oldest block first) and returns the balance of `address`
    pub fn calculate_balance(&self, chain: &[Block], address: &Address) -> u64 {
        let balance = match find_cutoff(chain, address) {
            Some(cutoff) => {
                let baseline = cutoff.transaction.output_for(address);
                baseline.saturating_add(tally_after(chain, address, &cutoff))
            }
            None => self
                .starting_balance
                .saturating_add(tally(chain, address, |_, _| true)),
        };

        debug!(
            "Balance of {} over {} blocks: {}",
            address,
            chain.len(),
            balance
        );

        balance
    }
}

/// Phase 1: the newest block holding a spend by `address`, and the latest
/// such spend within it.
fn find_cutoff<'a>(chain: &'a [Block], address: &Address) -> Option<Cutoff<'a>> {
    chain
        .iter()
        .enumerate()
        .rev()
        .find_map(|(block_index, block)| {
            block
                .transactions
                .iter()
                .filter_map(|transaction| match transaction.input() {
                    TransactionInput::Signed {
                        address: sender,
                        timestamp,
                        ..
                    } if sender == address => Some((transaction, *timestamp)),
                    _ => None,
                })
                .max_by_key(|(_, timestamp)| *timestamp)
                .map(|(transaction, timestamp)| Cutoff {
                    block_index,
                    transaction,
                    timestamp,
                })
        })
}

/// Phase 2: outputs to `address` that happened after the cutoff.
fn tally_after(chain: &[Block], address: &Address, cutoff: &Cutoff<'_>) -> u64 {
    tally(chain, address, |block_index, transaction| {
        match transaction.timestamp() {
            // Strictly later, so the cutoff itself is never counted twice
            Some(timestamp) => timestamp > cutoff.timestamp,
            None => block_index >= cutoff.block_index,
        }
    })
}

fn tally<F>(chain: &[Block], address: &Address, counts: F) -> u64
where
    F: Fn(usize, &Transaction) -> bool,
{
    chain
        .iter()
        .enumerate()
        .flat_map(|(block_index, block)| {
            block
                .transactions
                .iter()
                .map(move |transaction| (block_index, transaction))
        })
        .filter(|(block_index, transaction)| counts(*block_index, *transaction))
        .map(|(_, transaction)| transaction.output_for(address))
        .fold(0u64, u64::saturating_add)
}
