//! Routes contracts to the handler for their type.

use anyhow::Result;
use covenant_types::{Contract, ContractAction, ContractType, Transaction};
use tracing::warn;

use crate::handler::{
    BeaconRegistry, ContractContext, ContractHandler, LegacyHandler, SectionStore, UnknownHandler,
};

/// State components a node plugs into the dispatcher.
pub struct Handlers {
    pub beacons: Box<dyn BeaconRegistry>,
    /// Receives both POLL and VOTE contracts.
    pub polls: Box<dyn ContractHandler>,
    pub whitelist: Box<dyn ContractHandler>,
    pub sections: Box<dyn SectionStore>,
}

pub struct Dispatcher {
    beacons: Box<dyn BeaconRegistry>,
    polls: Box<dyn ContractHandler>,
    whitelist: Box<dyn ContractHandler>,
    legacy: LegacyHandler,
    unknown: UnknownHandler,
}

impl Dispatcher {
    pub fn new(handlers: Handlers) -> Self {
        Self {
            beacons: handlers.beacons,
            polls: handlers.polls,
            whitelist: handlers.whitelist,
            legacy: LegacyHandler::new(handlers.sections),
            unknown: UnknownHandler,
        }
    }

    fn handler(&self, contract_type: ContractType) -> &dyn ContractHandler {
        match contract_type {
            ContractType::Beacon => &self.beacons,
            ContractType::Poll | ContractType::Vote => &self.polls,
            ContractType::Project => &self.whitelist,
            ContractType::Protocol | ContractType::Scraper => &self.legacy,
            _ => &self.unknown,
        }
    }

    fn handler_mut(&mut self, contract_type: ContractType) -> &mut dyn ContractHandler {
        match contract_type {
            ContractType::Beacon => &mut self.beacons,
            ContractType::Poll | ContractType::Vote => &mut self.polls,
            ContractType::Project => &mut self.whitelist,
            ContractType::Protocol | ContractType::Scraper => &mut self.legacy,
            _ => &mut self.unknown,
        }
    }

    pub fn apply(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        ctx.contract.log("apply");
        let handler = self.handler_mut(ctx.contract.contract_type);
        match ctx.contract.action {
            ContractAction::Add => handler.add(ctx),
            ContractAction::Remove => handler.delete(ctx),
            ContractAction::Unknown => {
                warn!(
                    contract_type = %ctx.contract.contract_type,
                    height = ctx.block.height,
                    "ignoring contract with unknown action"
                );
                Ok(())
            }
        }
    }

    pub fn revert(&mut self, ctx: &ContractContext<'_>) -> Result<()> {
        ctx.contract.log("revert");
        self.handler_mut(ctx.contract.contract_type).revert(ctx)
    }

    pub fn validate(&self, contract: &Contract, tx: &Transaction) -> bool {
        self.handler(contract.contract_type).validate(contract, tx)
    }

    pub fn reset_handlers(&mut self) -> Result<()> {
        self.beacons.reset()?;
        self.polls.reset()?;
        self.whitelist.reset()?;
        self.legacy.reset()?;
        self.unknown.reset()
    }

    pub fn beacons(&self) -> &dyn BeaconRegistry {
        &self.beacons
    }

    pub fn beacons_mut(&mut self) -> &mut dyn BeaconRegistry {
        &mut self.beacons
    }

    pub fn sections(&self) -> &dyn SectionStore {
        self.legacy.store()
    }
}
