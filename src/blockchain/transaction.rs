use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature};
use super::wallet::Wallet;
use crate::config::Config;

/// Recipient to amount. Ordered so the map always serializes the same way.
pub type OutputMap = BTreeMap<Address, u64>;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Amount exceeds balance: requested {amount}, available {balance}")]
    InsufficientBalance { amount: u64, balance: u64 },

    #[error("Wallet {wallet} is not the sender of this transaction")]
    SenderMismatch { wallet: Address },

    #[error("Reward transactions cannot be updated")]
    RewardImmutable,

    #[error("Output total does not match input amount {expected}")]
    InvalidOutputTotal { expected: u64 },

    #[error("Invalid signature from {0}")]
    InvalidSignature(Address),

    #[error("Invalid reward transaction: expected a single output, found {0}")]
    InvalidReward(usize),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// The input side of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionInput {
    /// Spend by a wallet, signed over the output map
    Signed {
        /// When the output map was last signed
        timestamp: DateTime<Utc>,

        /// Sender's balance when the transaction was first created
        amount: u64,

        /// Sender's address
        address: Address,

        /// Signature over the output map
        signature: DigitalSignature,
    },

    /// Sentinel input of a minted reward
    Reward { address: Address },
}

impl TransactionInput {
    /// The address recorded in the input, the sentinel one for rewards
    pub fn address(&self) -> &Address {
        match self {
            TransactionInput::Signed { address, .. } => address,
            TransactionInput::Reward { address } => address,
        }
    }
}

/// A value transfer from one sender to any number of recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: String,
    output_map: OutputMap,
    input: TransactionInput,
}

static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current time, bumped by a nanosecond if the clock has not moved since
/// the previous call so input timestamps strictly increase.
fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let previous = LAST_TIMESTAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or_else(|last| last);

    Utc.timestamp_nanos(now.max(previous.saturating_add(1)))
}

impl Transaction {
    /// Creates a signed transaction paying `amount` to `recipient`
    ///
    /// # Arguments
    ///
    /// * `sender` - The wallet spending the funds
    /// * `recipient` - The address receiving `amount`
    /// * `amount` - The amount to transfer
    /// * `available_balance` - The sender's balance, recorded as the input amount
    ///
    /// # Returns
    ///
    /// The signed transaction, or `InsufficientBalance` if `amount` exceeds the balance
    pub fn create(
        sender: &Wallet,
        recipient: Address,
        amount: u64,
        available_balance: u64,
    ) -> Result<Self, TransactionError> {
        if amount > available_balance {
            return Err(TransactionError::InsufficientBalance {
                amount,
                balance: available_balance,
            });
        }

        let mut output_map = OutputMap::new();
        output_map.insert(sender.address().clone(), available_balance - amount);
        // A payment to oneself folds back into the change entry
        *output_map.entry(recipient).or_insert(0) += amount;

        let input = Self::sign_input(sender, &output_map, available_balance)?;

        let transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            output_map,
            input,
        };

        debug!(
            "Created transaction {} from {} with input amount {}",
            transaction.id,
            sender.address(),
            available_balance
        );

        Ok(transaction)
    }

    /// Creates a reward transaction minting the mining reward to `miner`
    pub fn reward_transaction(miner: &Wallet, config: &Config) -> Self {
        let mut output_map = OutputMap::new();
        output_map.insert(miner.address().clone(), config.mining_reward);

        Transaction {
            id: Uuid::new_v4().to_string(),
            output_map,
            input: config.reward_input(),
        }
    }

    /// Adds another payment to this transaction
    ///
    /// The new output map starts from the current one: an existing recipient
    /// has `amount` added, a new one gets an entry, and the sender's change
    /// shrinks by `amount`. The whole map is signed again; the input amount
    /// keeps the balance recorded at creation.
    ///
    /// # Returns
    ///
    /// The amended transaction with the same id
    pub fn update(
        &self,
        sender: &Wallet,
        recipient: Address,
        amount: u64,
    ) -> Result<Self, TransactionError> {
        let (balance, sender_address) = match &self.input {
            TransactionInput::Signed {
                amount, address, ..
            } => (*amount, address),
            TransactionInput::Reward { .. } => return Err(TransactionError::RewardImmutable),
        };

        if sender.address() != sender_address {
            return Err(TransactionError::SenderMismatch {
                wallet: sender.address().clone(),
            });
        }

        let sender_output = self.output_for(sender_address);
        if amount > sender_output {
            return Err(TransactionError::InsufficientBalance {
                amount,
                balance: sender_output,
            });
        }

        let mut output_map = self.output_map.clone();
        output_map.insert(sender_address.clone(), sender_output - amount);

        let entry = output_map.entry(recipient).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(TransactionError::InvalidOutputTotal { expected: balance })?;

        let input = Self::sign_input(sender, &output_map, balance)?;

        debug!(
            "Updated transaction {}: {} now has {} left",
            self.id,
            sender_address,
            sender_output - amount
        );

        Ok(Transaction {
            id: self.id.clone(),
            output_map,
            input,
        })
    }

    fn sign_input(
        sender: &Wallet,
        output_map: &OutputMap,
        balance: u64,
    ) -> Result<TransactionInput, TransactionError> {
        Ok(TransactionInput::Signed {
            timestamp: next_timestamp(),
            amount: balance,
            address: sender.address().clone(),
            signature: sender.sign(output_map)?,
        })
    }

    /// Checks the conservation rule and the signature
    ///
    /// # Returns
    ///
    /// The reason the transaction is invalid, if it is
    pub fn check(&self) -> Result<(), TransactionError> {
        match &self.input {
            TransactionInput::Reward { .. } => {
                if self.output_map.len() != 1 {
                    return Err(TransactionError::InvalidReward(self.output_map.len()));
                }
            }
            TransactionInput::Signed {
                amount,
                address,
                signature,
                ..
            } => {
                if self.output_total() != Some(*amount) {
                    return Err(TransactionError::InvalidOutputTotal { expected: *amount });
                }

                if !verify_signature(address, &self.output_map, signature) {
                    return Err(TransactionError::InvalidSignature(address.clone()));
                }
            }
        }

        Ok(())
    }

    /// Whether the transaction may be included in a block
    ///
    /// An invalid transaction is logged and reported as `false`.
    pub fn validate(&self) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(err) => {
                error!(
                    "Invalid transaction {} from {}: {}",
                    self.id,
                    self.input.address(),
                    err
                );
                false
            }
        }
    }

    /// Gets the transaction id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the outputs by recipient
    pub fn output_map(&self) -> &OutputMap {
        &self.output_map
    }

    /// Gets the input
    pub fn input(&self) -> &TransactionInput {
        &self.input
    }

    /// Amount paid to `address` by this transaction, zero when it is not a recipient
    pub fn output_for(&self, address: &Address) -> u64 {
        self.output_map.get(address).copied().unwrap_or(0)
    }

    /// Sum of all outputs, `None` on overflow
    pub fn output_total(&self) -> Option<u64> {
        self.output_map
            .values()
            .try_fold(0u64, |total, value| total.checked_add(*value))
    }

    /// Signing time of a wallet spend; rewards carry none
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.input {
            TransactionInput::Signed { timestamp, .. } => Some(*timestamp),
            TransactionInput::Reward { .. } => None,
        }
    }

    /// Address of the spending wallet; rewards have no sender
    pub fn sender(&self) -> Option<&Address> {
        match &self.input {
            TransactionInput::Signed { address, .. } => Some(address),
            TransactionInput::Reward { .. } => None,
        }
    }

    /// Checks if the transaction is a mining reward
    pub fn is_reward(&self) -> bool {
        matches!(self.input, TransactionInput::Reward { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::KeyPair;

    const PRIVATE_KEY: &str = "e99b2615b87da28752022963f7f225f5f0114244da765b06b941ba7ba28ba121";

    fn sender_wallet() -> Wallet {
        Wallet::from_private_key_hex(PRIVATE_KEY, &Config::default()).unwrap()
    }

    fn recipient() -> Address {
        Address::from("recipient-public-key")
    }

    fn new_transaction(sender: &Wallet) -> Transaction {
        Transaction::create(sender, recipient(), 1, sender.balance()).unwrap()
    }

    #[test]
    fn test_new_transaction() {
        let sender = sender_wallet();
        let transaction = new_transaction(&sender);

        assert!(!transaction.id().is_empty());
        assert_eq!(transaction.output_for(&recipient()), 1);
        assert_eq!(transaction.output_for(sender.address()), sender.balance() - 1);
        assert_eq!(transaction.output_total(), Some(sender.balance()));
    }

    #[test]
    fn test_transaction_input() {
        let sender = sender_wallet();
        let transaction = new_transaction(&sender);

        match transaction.input() {
            TransactionInput::Signed {
                amount,
                address,
                signature,
                ..
            } => {
                assert_eq!(*amount, sender.balance());
                assert_eq!(address, sender.address());
                assert!(verify_signature(address, transaction.output_map(), signature));
            }
            TransactionInput::Reward { .. } => panic!("expected a signed input"),
        }

        assert!(transaction.timestamp().is_some());
        assert_eq!(transaction.sender(), Some(sender.address()));
    }

    #[test]
    fn test_unique_ids_and_increasing_timestamps() {
        let sender = sender_wallet();
        let first = new_transaction(&sender);
        let second = new_transaction(&sender);

        assert_ne!(first.id(), second.id());
        assert!(second.timestamp() > first.timestamp());
    }

    #[test]
    fn test_amount_exceeds_balance() {
        let sender = Wallet::with_balance(KeyPair::generate(), 1_000_000, &Config::default());

        let result = Transaction::create(&sender, recipient(), 8_090_000_000, sender.balance());
        assert!(matches!(
            result,
            Err(TransactionError::InsufficientBalance {
                amount: 8_090_000_000,
                balance: 1_000_000
            })
        ));
    }

    #[test]
    fn test_payment_to_self_conserves_value() {
        let sender = sender_wallet();
        let transaction =
            Transaction::create(&sender, sender.address().clone(), 40, sender.balance()).unwrap();

        assert_eq!(transaction.output_map().len(), 1);
        assert_eq!(transaction.output_for(sender.address()), sender.balance());
        assert!(transaction.validate());
    }

    #[test]
    fn test_valid_transaction() {
        let sender = sender_wallet();
        let transaction = new_transaction(&sender);

        assert!(transaction.check().is_ok());
        assert!(transaction.validate());
    }

    #[test]
    fn test_tampered_output_map() {
        let sender = sender_wallet();
        let mut transaction = new_transaction(&sender);

        transaction
            .output_map
            .insert(sender.address().clone(), 90809);

        assert!(matches!(
            transaction.check(),
            Err(TransactionError::InvalidOutputTotal { .. })
        ));
        assert!(!transaction.validate());
    }

    #[test]
    fn test_overflowing_outputs() {
        let sender = sender_wallet();
        let mut transaction = new_transaction(&sender);

        transaction.output_map.insert(recipient(), u64::MAX);

        assert!(transaction.output_total().is_none());
        assert!(!transaction.validate());
    }

    #[test]
    fn test_foreign_signature() {
        let sender = sender_wallet();
        let mut transaction = new_transaction(&sender);

        let other = Wallet::new(&Config::default());
        if let TransactionInput::Signed { signature, .. } = &mut transaction.input {
            *signature = other.sign("data").unwrap();
        }

        assert!(matches!(
            transaction.check(),
            Err(TransactionError::InvalidSignature(_))
        ));
        assert!(!transaction.validate());
    }

    #[test]
    fn test_update_amount_exceeds_balance() {
        let sender = sender_wallet();
        let transaction = new_transaction(&sender);

        let result = transaction.update(&sender, Address::from("xoi"), 1000);
        assert!(matches!(
            result,
            Err(TransactionError::InsufficientBalance { amount: 1000, .. })
        ));
    }

    #[test]
    fn test_update() {
        let sender = sender_wallet();
        let transaction = new_transaction(&sender);
        let original_sender_output = transaction.output_for(sender.address());
        let next_recipient = Address::from("me");

        let updated = transaction
            .update(&sender, next_recipient.clone(), 0)
            .unwrap();

        assert_eq!(updated.id(), transaction.id());
        assert_eq!(updated.output_map().get(&next_recipient), Some(&0));
        assert_eq!(updated.output_for(sender.address()), original_sender_output);
        assert_eq!(updated.output_total(), Some(sender.balance()));
        assert_ne!(updated.input(), transaction.input());
        assert!(updated.validate());

        // The original value is untouched
        assert!(!transaction.output_map().contains_key(&next_recipient));
    }

    #[test]
    fn test_update_same_recipient_accumulates() {
        let sender = sender_wallet();
        let balance = sender.balance();
        let recipient = Address::from("me");

        let transaction = Transaction::create(&sender, recipient.clone(), 3, balance).unwrap();
        assert_eq!(transaction.output_for(&recipient), 3);
        assert_eq!(transaction.output_for(sender.address()), balance - 3);

        let updated = transaction.update(&sender, recipient.clone(), 1).unwrap();

        assert_eq!(updated.output_for(&recipient), 4);
        assert_eq!(updated.output_for(sender.address()), balance - 4);
        assert_eq!(updated.output_map().len(), 2);

        match (transaction.input(), updated.input()) {
            (
                TransactionInput::Signed {
                    amount: before,
                    signature: old_signature,
                    ..
                },
                TransactionInput::Signed {
                    amount: after,
                    signature: new_signature,
                    ..
                },
            ) => {
                assert_eq!(before, after);
                assert_ne!(old_signature, new_signature);
            }
            _ => panic!("expected signed inputs"),
        }
    }

    #[test]
    fn test_update_by_other_wallet() {
        let sender = sender_wallet();
        let transaction = new_transaction(&sender);
        let other = Wallet::new(&Config::default());

        let result = transaction.update(&other, recipient(), 1);
        assert!(matches!(result, Err(TransactionError::SenderMismatch { .. })));
    }

    #[test]
    fn test_reward_transaction() {
        let config = Config::default();
        let miner = Wallet::from_private_key_hex(PRIVATE_KEY, &config).unwrap();

        let reward = Transaction::reward_transaction(&miner, &config);

        assert_eq!(reward.input(), &config.reward_input());
        assert_eq!(reward.output_map().len(), 1);
        assert_eq!(reward.output_for(miner.address()), config.mining_reward);
        assert!(reward.is_reward());
        assert!(reward.timestamp().is_none());
        assert!(reward.sender().is_none());
        assert!(reward.validate());
    }

    #[test]
    fn test_reward_ignores_miner_balance() {
        let config = Config::default();
        let miner = Wallet::with_balance(KeyPair::generate(), 0, &config);

        let reward = Transaction::reward_transaction(&miner, &config);
        assert_eq!(reward.output_for(miner.address()), config.mining_reward);
        assert_eq!(miner.balance(), 0);
    }

    #[test]
    fn test_reward_cannot_be_updated() {
        let config = Config::default();
        let miner = Wallet::new(&config);
        let reward = Transaction::reward_transaction(&miner, &config);

        let result = reward.update(&miner, recipient(), 1);
        assert!(matches!(result, Err(TransactionError::RewardImmutable)));
    }

    #[test]
    fn test_serialization_keeps_signature_valid() {
        let sender = sender_wallet();
        let transaction = new_transaction(&sender)
            .update(&sender, Address::from("me"), 7)
            .unwrap();

        let json = serde_json::to_string(&transaction).unwrap();
        let decoded: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, transaction);
        assert!(decoded.validate());

        let config = Config::default();
        let reward = Transaction::reward_transaction(&sender, &config);
        let decoded: Transaction =
            serde_json::from_str(&serde_json::to_string(&reward).unwrap()).unwrap();
        assert!(decoded.is_reward());
    }
}
