//! Covenant contract execution.
//!
//! Contracts embedded in transactions are routed by a [Dispatcher] to the
//! handler that owns the state they change. The [ContractPipeline] drives the
//! dispatcher while blocks are connected and disconnected, and rebuilds all
//! handler state by replaying history.
//!
//! ## Determinism requirements
//! - Replay must produce identical handler state on every node for identical
//!   history.
//! - Handlers must not read wall-clock time; use the transaction or block time.
//! - Avoid iteration order of hash-based collections influencing state.
//!
//! ## Minimal pipeline (example)
//! ```rust,ignore
//! use covenant_execution::{ContractPipeline, Dispatcher, Handlers, ReplayParams};
//! use covenant_types::NetworkKeys;
//!
//! let dispatcher = Dispatcher::new(Handlers { beacons, polls, whitelist, sections });
//! let mut pipeline = ContractPipeline::new(
//!     dispatcher,
//!     Box::new(NetworkKeys::default()),
//!     Box::new(researchers),
//!     ReplayParams::mainnet(),
//! );
//! pipeline.replay(&chain, &tip)?;
//! ```

pub mod chain;
pub mod dispatcher;
pub mod handler;
pub mod params;
pub mod pipeline;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use chain::{find_by_min_time, BlockRef, ChainIndex};
pub use dispatcher::{Dispatcher, Handlers};
pub use handler::{
    BeaconRegistry, ContractContext, ContractHandler, LegacyHandler, ResearcherHooks,
    SectionStore, UnknownHandler,
};
pub use params::ReplayParams;
pub use pipeline::{ContractPipeline, ReplayOutcome, TEAM_WHITELIST_KEYS};
