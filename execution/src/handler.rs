//! Capabilities of the state components that contracts mutate.

use anyhow::{Context as _, Result};
use covenant_types::{Contract, ContractAction, ContractType, Payload, Transaction};
use std::sync::Arc;
use tracing::{error, warn};

use crate::chain::BlockRef;

/// A contract together with where it was found, for one apply or revert call.
#[derive(Clone, Copy, Debug)]
pub struct ContractContext<'a> {
    pub contract: &'a Contract,
    pub tx: &'a Transaction,
    pub block: &'a BlockRef,
}

impl<'a> ContractContext<'a> {
    pub fn new(contract: &'a Contract, tx: &'a Transaction, block: &'a BlockRef) -> Self {
        Self {
            contract,
            tx,
            block,
        }
    }

    /// Typed payload of the contract.
    pub fn payload(&self) -> Arc<Payload> {
        self.contract.share_payload()
    }
}

/// Applies and reverts contracts of the types routed to it.
pub trait ContractHandler {
    /// Drop all derived state (before a replay).
    fn reset(&mut self) -> Result<()>;

    /// Contextual checks beyond the envelope's own well-formedness.
    fn validate(&self, _contract: &Contract, _tx: &Transaction) -> bool {
        true
    }

    fn add(&mut self, ctx: &ContractContext<'_>) -> Result<()>;

    fn delete(&mut self, ctx: &ContractContext<'_>) -> Result<()>;

    /// Undo a previously applied contract.
    ///
    /// Handlers whose additions overwrite earlier state must override this.
    fn revert(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        match ctx.contract.action {
            ContractAction::Add => self.delete(ctx),
            ContractAction::Remove => self.add(ctx),
            ContractAction::Unknown => {
                error!(
                    contract_type = %ctx.contract.contract_type,
                    "cannot revert contract with unknown action"
                );
                Ok(())
            }
        }
    }
}

/// The beacon registry also promotes beacons verified by superblocks.
pub trait BeaconRegistry: ContractHandler {
    fn activate_pending(&mut self, verified_beacon_ids: &[String], superblock_time: u64)
        -> Result<()>;
}

impl<T: ContractHandler + ?Sized> ContractHandler for Box<T> {
    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn validate(&self, contract: &Contract, tx: &Transaction) -> bool {
        (**self).validate(contract, tx)
    }

    fn add(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        (**self).add(ctx)
    }

    fn delete(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        (**self).delete(ctx)
    }

    fn revert(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        (**self).revert(ctx)
    }
}

impl<T: BeaconRegistry + ?Sized> BeaconRegistry for Box<T> {
    fn activate_pending(
        &mut self,
        verified_beacon_ids: &[String],
        superblock_time: u64,
    ) -> Result<()> {
        (**self).activate_pending(verified_beacon_ids, superblock_time)
    }
}

/// Section-keyed string cache that holds protocol and scraper entries.
pub trait SectionStore {
    fn write(&mut self, section: &str, key: &str, value: &str, timestamp: u64) -> Result<()>;
    fn delete(&mut self, section: &str, key: &str) -> Result<()>;
    fn clear(&mut self, section: &str) -> Result<()>;
    fn read(&self, section: &str, key: &str) -> Option<String>;
}

/// Hooks into the researcher identity cache, which depends on team settings.
pub trait ResearcherHooks {
    fn mark_dirty(&mut self);
    fn refresh(&mut self);
}

/// Stores PROTOCOL and SCRAPER contracts as raw key/value entries, one section
/// per contract type.
pub struct LegacyHandler {
    store: Box<dyn SectionStore>,
}

impl LegacyHandler {
    pub const SECTIONS: [ContractType; 2] = [ContractType::Protocol, ContractType::Scraper];

    pub fn new(store: Box<dyn SectionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn SectionStore {
        self.store.as_ref()
    }
}

impl ContractHandler for LegacyHandler {
    fn reset(&mut self) -> Result<()> {
        for section in Self::SECTIONS {
            self.store
                .clear(section.as_str())
                .with_context(|| format!("clear section {section}"))?;
        }
        Ok(())
    }

    fn add(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        let payload = ctx.contract.body.payload();
        let section = ctx.contract.contract_type.as_str();
        let key = payload.legacy_key();
        self.store
            .write(section, &key, &payload.legacy_value(), ctx.tx.time)
            .with_context(|| format!("write {section} entry {key}"))
    }

    fn delete(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        let section = ctx.contract.contract_type.as_str();
        let key = ctx.contract.body.payload().legacy_key();
        self.store
            .delete(section, &key)
            .with_context(|| format!("delete {section} entry {key}"))
    }
}

/// Sink for contract types without a handler, including types introduced by
/// newer protocol versions.
#[derive(Debug, Default)]
pub struct UnknownHandler;

impl ContractHandler for UnknownHandler {
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        warn!(contract_type = %ctx.contract.contract_type, "ignoring add for unknown contract type");
        Ok(())
    }

    fn delete(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        warn!(contract_type = %ctx.contract.contract_type, "ignoring delete for unknown contract type");
        Ok(())
    }

    fn revert(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        warn!(contract_type = %ctx.contract.contract_type, "ignoring revert for unknown contract type");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{block_ref, MemoryRegistry, MemorySections};
    use covenant_types::make_legacy_contract;

    #[test]
    fn test_legacy_handler_writes_sections() {
        let sections = MemorySections::default();
        let mut handler = LegacyHandler::new(Box::new(sections.clone()));
        let index = block_ref(5, 500);

        let add = make_legacy_contract(ContractType::Protocol, ContractAction::Add, "k", "v");
        let tx = Transaction::new(400, vec![add.clone()]);
        handler.add(&ContractContext::new(&add, &tx, &index)).unwrap();
        assert_eq!(sections.read("protocol", "k"), Some("v".to_string()));
        assert_eq!(sections.timestamp("protocol", "k"), Some(400));
        assert_eq!(handler.store().read("protocol", "k"), Some("v".to_string()));

        let scraper = make_legacy_contract(ContractType::Scraper, ContractAction::Add, "k", "s");
        handler
            .add(&ContractContext::new(&scraper, &tx, &index))
            .unwrap();
        assert_eq!(sections.read("scraper", "k"), Some("s".to_string()));

        handler.reset().unwrap();
        assert!(sections.snapshot().is_empty());
    }

    #[test]
    fn test_default_revert_is_symmetric() {
        let mut registry = MemoryRegistry::default();
        let index = block_ref(1, 100);
        let add = make_legacy_contract(ContractType::Project, ContractAction::Add, "p", "url");
        let remove = make_legacy_contract(ContractType::Project, ContractAction::Remove, "p", "");
        let tx = Transaction::new(100, Vec::new());

        registry.add(&ContractContext::new(&add, &tx, &index)).unwrap();
        registry
            .revert(&ContractContext::new(&add, &tx, &index))
            .unwrap();
        assert!(registry.snapshot().is_empty());

        registry
            .revert(&ContractContext::new(&remove, &tx, &index))
            .unwrap();
        assert_eq!(registry.snapshot().len(), 1);

        let unknown = make_legacy_contract(ContractType::Project, ContractAction::Unknown, "p", "");
        registry
            .revert(&ContractContext::new(&unknown, &tx, &index))
            .unwrap();
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_unknown_handler_is_inert() {
        let mut handler = UnknownHandler;
        let index = block_ref(1, 100);
        let contract = make_legacy_contract(ContractType::Claim, ContractAction::Add, "k", "v");
        let tx = Transaction::new(100, Vec::new());
        let ctx = ContractContext::new(&contract, &tx, &index);

        handler.add(&ctx).unwrap();
        handler.delete(&ctx).unwrap();
        handler.revert(&ctx).unwrap();
        handler.reset().unwrap();
        assert!(handler.validate(&contract, &tx));
    }
}
