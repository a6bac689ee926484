use log::info;

use super::block::Block;
use super::transaction::Transaction;

/// An in-memory, append-only ledger of blocks
///
/// Holds no consensus rules: blocks are linked by hash and appended as given.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Vec<Block>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a new blockchain with a genesis block
    pub fn new() -> Self {
        Blockchain {
            chain: vec![Block::genesis()],
        }
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> &Block {
        // The genesis block is never removed
        &self.chain[self.chain.len() - 1]
    }

    /// Appends a block holding `transactions`
    ///
    /// # Returns
    ///
    /// The newly appended block
    pub fn add_block(&mut self, transactions: Vec<Transaction>) -> &Block {
        let last_block = self.last_block();
        let block = Block::new(last_block.index + 1, transactions, last_block.hash.clone());

        info!(
            "Appended block {} with {} transactions",
            block.index,
            block.transactions.len()
        );

        self.chain.push(block);
        self.last_block()
    }

    /// Gets the blocks, oldest first
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Number of blocks including the genesis block
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false; a chain starts with its genesis block
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}
