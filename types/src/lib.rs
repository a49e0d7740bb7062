pub mod chain;
pub use chain::{Block, Superblock, Transaction};
pub mod contract;
pub use contract::{
    make_legacy_contract, Body, Contract, ContractAction, ContractSignature, ContractType,
    LegacyPayload, Payload, SignError, CURRENT_VERSION,
};
pub mod keys;
pub use keys::{KeySource, NetworkKeys};
pub mod legacy;
pub mod payloads;
