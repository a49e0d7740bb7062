//! View of the block index needed to replay contracts.

use anyhow::Result;
use commonware_cryptography::{sha256::Digest, Digestible};
use covenant_types::{Block, ContractType};

/// Index entry for a block on the active chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub height: u64,
    pub time: u64,
    pub version: u32,
    /// Set when applying the block found a registry contract.
    pub has_contract: bool,
    pub is_superblock: bool,
    pub hash: Digest,
}

impl BlockRef {
    /// Index a block, deriving its flags from its contents.
    pub fn new(height: u64, block: &Block) -> Self {
        let has_contract = block
            .contract_transactions()
            .flat_map(|tx| tx.contracts.iter())
            .any(|contract| contract.contract_type != ContractType::Message);

        Self {
            height,
            time: block.time,
            version: block.version,
            has_contract,
            is_superblock: block.superblock.is_some(),
            hash: block.digest(),
        }
    }
}

/// Blocks of the active chain, addressed by height.
pub trait ChainIndex {
    fn at_height(&self, height: u64) -> Option<BlockRef>;

    fn read_block(&self, block: &BlockRef) -> Result<Block>;
}

/// Walk back from `from` to its earliest ancestor with a time of at least
/// `min_time`. Returns `from` itself if its parent is already too old.
pub fn find_by_min_time(chain: &dyn ChainIndex, from: &BlockRef, min_time: u64) -> BlockRef {
    let mut current = from.clone();
    while current.height > 0 {
        let Some(parent) = chain.at_height(current.height - 1) else {
            break;
        };
        if parent.time < min_time {
            break;
        }
        current = parent;
    }
    current
}
