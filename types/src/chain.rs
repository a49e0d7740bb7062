//! Transaction and block carriers handed to contract processing by the node.

use commonware_codec::Encode;
use commonware_cryptography::{
    sha256::{Digest, Sha256},
    Digestible, Hasher,
};

use crate::contract::Contract;

/// Transactions at these indices (coinbase and coinstake) never carry
/// contracts that affect registries.
pub const RESERVED_TRANSACTIONS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Seconds since the epoch.
    pub time: u64,
    pub contracts: Vec<Contract>,

    digest: Digest,
}

impl Transaction {
    fn compute_digest(time: u64, contracts: &[Contract]) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(&time.to_be_bytes());
        for contract in contracts {
            hasher.update(contract.encode().as_ref());
        }
        hasher.finalize()
    }

    pub fn new(time: u64, contracts: Vec<Contract>) -> Self {
        let digest = Self::compute_digest(time, &contracts);
        Self {
            time,
            contracts,
            digest,
        }
    }

    /// Recover the legacy contract embedded in a transaction message, if any.
    pub fn extract(message: &str) -> Option<Contract> {
        if !Contract::detect(message) {
            return None;
        }
        Some(Contract::parse(message))
    }

    /// Build a transaction carrying the legacy contract found in `message`.
    pub fn from_message(time: u64, message: &str) -> Self {
        Self::new(time, Self::extract(message).into_iter().collect())
    }
}

impl Digestible for Transaction {
    type Digest = Digest;

    fn digest(&self) -> Digest {
        self.digest
    }
}

/// Beacons the network verified in a superblock.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Superblock {
    pub verified_beacons: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub parent: Digest,
    pub time: u64,
    pub version: u32,
    pub transactions: Vec<Transaction>,
    pub superblock: Option<Superblock>,

    digest: Digest,
}

impl Block {
    fn compute_digest(
        parent: &Digest,
        time: u64,
        version: u32,
        transactions: &[Transaction],
    ) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(parent);
        hasher.update(&time.to_be_bytes());
        hasher.update(&version.to_be_bytes());
        for transaction in transactions {
            hasher.update(&transaction.digest());
        }
        hasher.finalize()
    }

    pub fn new(
        parent: Digest,
        time: u64,
        version: u32,
        transactions: Vec<Transaction>,
        superblock: Option<Superblock>,
    ) -> Self {
        let digest = Self::compute_digest(&parent, time, version, &transactions);
        Self {
            parent,
            time,
            version,
            transactions,
            superblock,
            digest,
        }
    }

    /// Transactions that may carry registry contracts.
    pub fn contract_transactions(&self) -> impl DoubleEndedIterator<Item = &Transaction> {
        self.transactions.iter().skip(RESERVED_TRANSACTIONS)
    }
}

impl Digestible for Block {
    type Digest = Digest;

    fn digest(&self) -> Digest {
        self.digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractType;

    #[test]
    fn test_from_message() {
        let tx = Transaction::from_message(10, "<MT>protocol</MT><MA>A</MA><MK>k</MK><MV>v</MV>");
        assert_eq!(tx.contracts.len(), 1);
        assert_eq!(tx.contracts[0].contract_type, ContractType::Protocol);

        let tx = Transaction::from_message(10, "<MT>superblock</MT><MK>x</MK>");
        assert!(tx.contracts.is_empty());
        assert!(Transaction::extract("memo").is_none());
    }

    #[test]
    fn test_contract_transactions_skip_reserved() {
        let transactions = (0..5).map(|i| Transaction::new(i, Vec::new())).collect();
        let block = Block::new(Sha256::hash(b"parent"), 100, 11, transactions, None);

        let times: Vec<u64> = block.contract_transactions().map(|tx| tx.time).collect();
        assert_eq!(times, vec![2, 3, 4]);
        let reversed: Vec<u64> = block
            .contract_transactions()
            .rev()
            .map(|tx| tx.time)
            .collect();
        assert_eq!(reversed, vec![4, 3, 2]);
    }

    #[test]
    fn test_digest_commits_to_transactions() {
        let parent = Sha256::hash(b"parent");
        let empty = Block::new(parent, 100, 11, Vec::new(), None);
        let full = Block::new(parent, 100, 11, vec![Transaction::new(1, Vec::new())], None);
        assert_ne!(empty.digest(), full.digest());
        assert_eq!(
            empty.digest(),
            Block::new(parent, 100, 11, Vec::new(), None).digest()
        );
    }
}
