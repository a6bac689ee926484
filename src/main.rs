use anyhow::Result;
use log::{info, warn};

use cryptochain::{Address, Blockchain, Config, Transaction, Wallet};

// Walk two wallets through a transfer, an amended transfer and a reward
fn run_scenario(config: &Config) -> Result<()> {
    let mut blockchain = Blockchain::new();
    let mut alice = Wallet::new(config);
    let mut bob = Wallet::new(config);
    let miner = Wallet::new(config);

    info!("Alice: {}", alice.address());
    info!("Bob: {}", bob.address());

    let transfer = alice.create_transaction(120, bob.address().clone(), Some(blockchain.chain()))?;
    let transfer = transfer.update(&alice, Address::from("burn"), 30)?;

    if !transfer.validate() {
        warn!("Transfer {} rejected", transfer.id());
        return Ok(());
    }

    let reward = Transaction::reward_transaction(&miner, config);
    blockchain.add_block(vec![transfer, reward]);

    let refund = bob.create_transaction(20, alice.address().clone(), Some(blockchain.chain()))?;
    blockchain.add_block(vec![refund]);

    for (name, wallet) in [("Alice", &alice), ("Bob", &bob), ("Miner", &miner)] {
        let balance = Wallet::calculate_balance(blockchain.chain(), wallet.address(), config);
        info!("{} balance after {} blocks: {}", name, blockchain.len(), balance);
    }

    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env()?;
    info!(
        "Starting balance {}, mining reward {}",
        config.starting_balance, config.mining_reward
    );

    run_scenario(&config)
}
