//! In-memory collaborators for exercising contract processing.
//!
//! Every mock is a cheap handle over shared state: keep a clone, hand the other
//! to the dispatcher, and inspect the clone afterwards.

use anyhow::{anyhow, Result};
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    sha256::{Digest, Sha256},
    Digestible, Hasher, Signer,
};
use commonware_math::algebra::Random;
use covenant_types::{
    make_legacy_contract, payloads::BeaconPayload, Block, Contract, ContractAction, ContractType,
    Payload, Superblock, Transaction,
};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use crate::chain::{BlockRef, ChainIndex};
use crate::handler::{BeaconRegistry, ContractContext, ContractHandler, ResearcherHooks, SectionStore};

/// Creates a deterministic ed25519 keypair.
pub fn create_keypair(seed: u64) -> (PrivateKey, PublicKey) {
    let mut rng = StdRng::seed_from_u64(seed);
    let private = PrivateKey::random(&mut rng);
    let public = private.public_key();
    (private, public)
}

/// Index entry for a block that is not stored anywhere.
pub fn block_ref(height: u64, time: u64) -> BlockRef {
    BlockRef {
        height,
        time,
        version: 11,
        has_contract: false,
        is_superblock: false,
        hash: Sha256::hash(&height.to_be_bytes()),
    }
}

/// A transaction carrying a single current-version PROTOCOL contract.
pub fn protocol_tx(time: u64, key: &str, value: &str) -> Transaction {
    Transaction::new(
        time,
        vec![make_legacy_contract(
            ContractType::Protocol,
            ContractAction::Add,
            key,
            value,
        )],
    )
}

/// Protocol/scraper sections: `(section, key) -> (value, timestamp)`.
#[derive(Clone, Default)]
pub struct MemorySections {
    entries: Rc<RefCell<BTreeMap<(String, String), (String, u64)>>>,
}

impl MemorySections {
    pub fn snapshot(&self) -> BTreeMap<(String, String), (String, u64)> {
        self.entries.borrow().clone()
    }

    pub fn timestamp(&self, section: &str, key: &str) -> Option<u64> {
        self.entries
            .borrow()
            .get(&(section.to_string(), key.to_string()))
            .map(|(_, timestamp)| *timestamp)
    }
}

impl SectionStore for MemorySections {
    fn write(&mut self, section: &str, key: &str, value: &str, timestamp: u64) -> Result<()> {
        self.entries.borrow_mut().insert(
            (section.to_string(), key.to_string()),
            (value.to_string(), timestamp),
        );
        Ok(())
    }

    fn delete(&mut self, section: &str, key: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .remove(&(section.to_string(), key.to_string()));
        Ok(())
    }

    fn clear(&mut self, section: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .retain(|(entry_section, _), _| entry_section != section);
        Ok(())
    }

    fn read(&self, section: &str, key: &str) -> Option<String> {
        self.entries
            .borrow()
            .get(&(section.to_string(), key.to_string()))
            .map(|(value, _)| value.clone())
    }
}

/// Registry keyed by `(type, legacy key)`, standing in for the poll and
/// whitelist registries.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    entries: Rc<RefCell<BTreeMap<(ContractType, String), String>>>,
    rejected: Rc<RefCell<BTreeSet<String>>>,
}

impl MemoryRegistry {
    pub fn snapshot(&self) -> BTreeMap<(ContractType, String), String> {
        self.entries.borrow().clone()
    }

    /// Fail validation for contracts with this legacy key.
    pub fn reject(&self, key: &str) {
        self.rejected.borrow_mut().insert(key.to_string());
    }
}

impl ContractHandler for MemoryRegistry {
    fn reset(&mut self) -> Result<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }

    fn validate(&self, contract: &Contract, _tx: &Transaction) -> bool {
        !self
            .rejected
            .borrow()
            .contains(&contract.body.payload().legacy_key())
    }

    fn add(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        let payload = ctx.payload();
        self.entries.borrow_mut().insert(
            (ctx.contract.contract_type, payload.legacy_key()),
            payload.legacy_value(),
        );
        Ok(())
    }

    fn delete(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        let key = ctx.payload().legacy_key();
        self.entries
            .borrow_mut()
            .remove(&(ctx.contract.contract_type, key));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeaconEntry {
    pub public_key: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Default)]
struct BeaconState {
    pending: BTreeMap<String, BeaconEntry>,
    active: BTreeMap<String, BeaconEntry>,
    resets: usize,
}

/// Beacons are pending when advertised and active once a superblock verifies
/// them.
#[derive(Clone, Default)]
pub struct MemoryBeacons {
    state: Rc<RefCell<BeaconState>>,
}

impl MemoryBeacons {
    pub fn pending(&self) -> BTreeMap<String, BeaconEntry> {
        self.state.borrow().pending.clone()
    }

    pub fn active(&self) -> BTreeMap<String, BeaconEntry> {
        self.state.borrow().active.clone()
    }

    pub fn resets(&self) -> usize {
        self.state.borrow().resets
    }
}

impl ContractHandler for MemoryBeacons {
    fn reset(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.pending.clear();
        state.active.clear();
        state.resets += 1;
        Ok(())
    }

    fn add(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        let payload = ctx.payload();
        let Payload::Beacon(BeaconPayload { cpid, public_key }) = payload.as_ref() else {
            return Err(anyhow!("beacon registry received {:?}", payload));
        };
        self.state.borrow_mut().pending.insert(
            cpid.clone(),
            BeaconEntry {
                public_key: public_key.clone(),
                timestamp: ctx.tx.time,
            },
        );
        Ok(())
    }

    fn delete(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        let cpid = ctx.payload().legacy_key();
        let mut state = self.state.borrow_mut();
        state.pending.remove(&cpid);
        state.active.remove(&cpid);
        Ok(())
    }
}

impl BeaconRegistry for MemoryBeacons {
    fn activate_pending(
        &mut self,
        verified_beacon_ids: &[String],
        superblock_time: u64,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        for cpid in verified_beacon_ids {
            if let Some(mut entry) = state.pending.remove(cpid) {
                entry.timestamp = superblock_time;
                state.active.insert(cpid.clone(), entry);
            }
        }
        Ok(())
    }
}

/// Records researcher cache notifications.
#[derive(Clone, Default)]
pub struct ResearcherFlags {
    dirty: Rc<Cell<bool>>,
    refreshes: Rc<Cell<usize>>,
}

impl ResearcherFlags {
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.get()
    }
}

impl ResearcherHooks for ResearcherFlags {
    fn mark_dirty(&mut self) {
        self.dirty.set(true);
    }

    fn refresh(&mut self) {
        self.dirty.set(false);
        self.refreshes.set(self.refreshes.get() + 1);
    }
}

/// A linear chain held in memory.
#[derive(Default)]
pub struct MemoryChain {
    blocks: Vec<(BlockRef, Block)>,
    unreadable: BTreeSet<u64>,
    reads: Cell<usize>,
}

impl MemoryChain {
    fn parent(&self) -> Digest {
        match self.blocks.last() {
            Some((_, block)) => block.digest(),
            None => Sha256::hash(b"COVENANT_GENESIS"),
        }
    }

    /// Append a block with a coinbase, a coinstake and `transactions`.
    pub fn push(
        &mut self,
        time: u64,
        transactions: Vec<Transaction>,
        superblock: Option<Superblock>,
    ) -> BlockRef {
        let mut all = vec![Transaction::new(time, Vec::new()), Transaction::new(time, Vec::new())];
        all.extend(transactions);
        let block = Block::new(self.parent(), time, 11, all, superblock);
        let index = BlockRef::new(self.blocks.len() as u64, &block);
        self.blocks.push((index.clone(), block));
        index
    }

    pub fn push_empty(&mut self, time: u64) -> BlockRef {
        self.push(time, Vec::new(), None)
    }

    /// Make reads of the block at `height` fail.
    pub fn corrupt(&mut self, height: u64) {
        self.unreadable.insert(height);
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn tip(&self) -> Option<BlockRef> {
        self.blocks.last().map(|(index, _)| index.clone())
    }

    pub fn block(&self, index: &BlockRef) -> &Block {
        &self.blocks[index.height as usize].1
    }
}

impl ChainIndex for MemoryChain {
    fn at_height(&self, height: u64) -> Option<BlockRef> {
        self.blocks
            .get(usize::try_from(height).ok()?)
            .map(|(index, _)| index.clone())
    }

    fn read_block(&self, block: &BlockRef) -> Result<Block> {
        self.reads.set(self.reads.get() + 1);
        if self.unreadable.contains(&block.height) {
            return Err(anyhow!("block {} is unreadable", block.height));
        }
        self.blocks
            .get(block.height as usize)
            .map(|(_, stored)| stored.clone())
            .ok_or_else(|| anyhow!("block {} not found", block.height))
    }
}
