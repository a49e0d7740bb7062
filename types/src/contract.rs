//! The contract envelope.
//!
//! A contract travels inside a transaction either as legacy (version 1) text
//! tags or as a binary, typed (version 2+) envelope. Both forms share the same
//! signing policy: depending on its type and action, a contract must be signed
//! by the network message key, by the wallet master key, or by whichever key it
//! embeds.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Buf, BufMut};
use commonware_codec::{
    DecodeExt, Encode, EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write,
};
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey, Signature},
    sha256::{Digest, Sha256},
    Hasher, Signer, Verifier,
};
use commonware_utils::hex;
use std::{fmt, sync::Arc};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::keys::{KeySource, CONTRACT_NAMESPACE};
use crate::legacy::extract_tag;

pub mod payload;

pub use payload::{Body, LegacyPayload, Payload};

/// Newest envelope version this node produces and accepts.
pub const CURRENT_VERSION: u32 = 2;

pub const COIN: u64 = 100_000_000;
pub const STANDARD_BURN_AMOUNT: u64 = COIN / 2;
pub const POLL_BURN_AMOUNT: u64 = 50 * COIN;
pub const MAX_MONEY: u64 = 2_000_000_000 * COIN;

pub const MIN_SIGNATURE_LENGTH: usize = 64;
pub const MAX_SIGNATURE_LENGTH: usize = 73;

/// Superblocks reuse the legacy tags but are not contracts.
pub const SUPERBLOCK_MARKER: &str = "<MT>superblock</MT>";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ContractType {
    #[default]
    Unknown = 0,
    Beacon = 1,
    Claim = 2,
    Message = 3,
    Poll = 4,
    Project = 5,
    Protocol = 6,
    Scraper = 7,
    Vote = 8,
}

impl ContractType {
    /// First tag value that does not name a type. Never decoded.
    pub const OUT_OF_BOUND: u8 = 9;

    pub const ALL: [Self; 9] = [
        Self::Unknown,
        Self::Beacon,
        Self::Claim,
        Self::Message,
        Self::Poll,
        Self::Project,
        Self::Protocol,
        Self::Scraper,
        Self::Vote,
    ];

    /// Only the types that ever existed as legacy contracts are recognized.
    pub fn parse_legacy(name: &str) -> Self {
        match name {
            "beacon" => Self::Beacon,
            "poll" => Self::Poll,
            "project" => Self::Project,
            "protocol" => Self::Protocol,
            "scraper" => Self::Scraper,
            "vote" => Self::Vote,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Beacon => "beacon",
            Self::Claim => "claim",
            Self::Message => "message",
            Self::Poll => "poll",
            Self::Project => "project",
            Self::Protocol => "protocol",
            Self::Scraper => "scraper",
            Self::Vote => "vote",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Write for ContractType {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for ContractType {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Beacon),
            2 => Ok(Self::Claim),
            3 => Ok(Self::Message),
            4 => Ok(Self::Poll),
            5 => Ok(Self::Project),
            6 => Ok(Self::Protocol),
            7 => Ok(Self::Scraper),
            8 => Ok(Self::Vote),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for ContractType {
    const SIZE: usize = 1;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContractAction {
    #[default]
    Unknown = 0,
    Add = 1,
    Remove = 2,
}

impl ContractAction {
    pub const ALL: [Self; 3] = [Self::Unknown, Self::Add, Self::Remove];

    pub fn parse_legacy(action: &str) -> Self {
        match action {
            "A" => Self::Add,
            "D" => Self::Remove,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Add => "A",
            Self::Remove => "D",
        }
    }
}

impl fmt::Display for ContractAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Write for ContractAction {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for ContractAction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Add),
            2 => Ok(Self::Remove),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for ContractAction {
    const SIZE: usize = 1;
}

/// Raw signature bytes. Legacy contracts carry them as base64 text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContractSignature(Vec<u8>);

impl ContractSignature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Invalid base64 yields an empty signature.
    pub fn parse(encoded: &str) -> Self {
        Self(STANDARD.decode(encoded).unwrap_or_default())
    }

    pub fn viable(&self) -> bool {
        (MIN_SIGNATURE_LENGTH..=MAX_SIGNATURE_LENGTH).contains(&self.0.len())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContractSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(&self.0))
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum SignError {
    #[error("contract requires the master key but none is configured")]
    MissingMasterKey,
    #[error("signing key does not match the {0} key required by this contract")]
    KeyMismatch(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    pub version: u32,
    pub contract_type: ContractType,
    pub action: ContractAction,
    pub body: Body,
    pub signature: ContractSignature,
    pub public_key: Option<PublicKey>,
}

impl Default for Contract {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            contract_type: ContractType::Unknown,
            action: ContractAction::Unknown,
            body: Body::default(),
            signature: ContractSignature::default(),
            public_key: None,
        }
    }
}

impl Contract {
    /// Build an unsigned, current-version contract.
    pub fn new(contract_type: ContractType, action: ContractAction, payload: Payload) -> Self {
        Self {
            contract_type,
            action,
            body: Body::new(payload),
            ..Self::default()
        }
    }

    /// Whether a transaction message carries a legacy contract.
    pub fn detect(message: &str) -> bool {
        !message.is_empty() && message.contains("<MT>") && !message.contains(SUPERBLOCK_MARKER)
    }

    /// Parse a legacy contract from transaction message text.
    ///
    /// The `<MPK>` tag is not read: legacy contracts resolve their key from
    /// policy, never from the message.
    pub fn parse(message: &str) -> Self {
        if message.is_empty() {
            return Self::default();
        }

        let contract_type = ContractType::parse_legacy(extract_tag(message, "<MT>", "</MT>"));
        let action = ContractAction::parse_legacy(extract_tag(message, "<MA>", "</MA>"));
        let payload = LegacyPayload::new(
            extract_tag(message, "<MK>", "</MK>"),
            extract_tag(message, "<MV>", "</MV>"),
        );

        Self {
            version: 1,
            contract_type,
            action,
            body: Body::new(Payload::Legacy(payload)),
            signature: ContractSignature::parse(extract_tag(message, "<MS>", "</MS>")),
            public_key: None,
        }
    }

    pub fn requires_message_key(&self) -> bool {
        matches!(self.contract_type, ContractType::Poll | ContractType::Vote)
            && self.action == ContractAction::Add
    }

    pub fn requires_master_key(&self) -> bool {
        match self.contract_type {
            ContractType::Beacon => self.version == 1 && self.action == ContractAction::Remove,
            ContractType::Poll | ContractType::Vote => self.action == ContractAction::Remove,
            ContractType::Project | ContractType::Protocol | ContractType::Scraper => true,
            _ => false,
        }
    }

    pub fn requires_special_key(&self) -> bool {
        self.requires_message_key() || self.requires_master_key()
    }

    /// The key a valid signature must verify under.
    pub fn resolve_public_key(&self, keys: &dyn KeySource) -> Option<PublicKey> {
        if self.requires_message_key() {
            return Some(keys.message_public_key());
        }
        if self.requires_master_key() {
            return keys.master_public_key();
        }
        self.public_key.clone()
    }

    pub fn well_formed(&self) -> bool {
        (1..=CURRENT_VERSION).contains(&self.version)
            && self.contract_type != ContractType::Unknown
            && self.action != ContractAction::Unknown
            && self.body.well_formed(self.action)
            && (self.version > 1
                || (self.signature.viable()
                    && (self.requires_special_key() || self.public_key.is_some())))
    }

    /// Later versions are verified by the transaction layer on receipt.
    pub fn validate(&self, keys: &dyn KeySource) -> bool {
        self.well_formed() && (self.version > 1 || self.verify_signature(keys))
    }

    /// Check that `signer` is the key [Self::verify_signature] will resolve.
    pub fn check_signer(&self, signer: &PublicKey, keys: &dyn KeySource) -> Result<(), SignError> {
        if self.requires_message_key() {
            if *signer != keys.message_public_key() {
                return Err(SignError::KeyMismatch("message"));
            }
        } else if self.requires_master_key() {
            let master = keys.master_public_key().ok_or(SignError::MissingMasterKey)?;
            if *signer != master {
                return Err(SignError::KeyMismatch("master"));
            }
        }
        Ok(())
    }

    /// Sign the contract hash with `private_key`.
    ///
    /// Contracts that need no special key embed the signer's public key.
    ///
    /// # Errors
    ///
    /// Wallet-side guard: fails without touching the contract when
    /// [Self::check_signer] rejects the signer, since the network would
    /// discard the result.
    pub fn sign(&mut self, private_key: &PrivateKey, keys: &dyn KeySource) -> Result<(), SignError> {
        let signer = private_key.public_key();
        self.check_signer(&signer, keys)?;
        if !self.requires_special_key() {
            self.public_key = Some(signer);
        }

        let signature = private_key.sign(CONTRACT_NAMESPACE, self.hash().as_ref());
        self.signature = ContractSignature::new(signature.encode().to_vec());
        Ok(())
    }

    pub fn sign_with_message_key(&mut self, keys: &dyn KeySource) -> Result<(), SignError> {
        self.sign(&keys.message_private_key(), keys)
    }

    pub fn verify_signature(&self, keys: &dyn KeySource) -> bool {
        let Some(public_key) = self.resolve_public_key(keys) else {
            warn!(
                contract_type = %self.contract_type,
                action = %self.action,
                "no public key to verify contract"
            );
            return false;
        };
        let Ok(signature) = Signature::decode(self.signature.as_bytes()) else {
            warn!(
                contract_type = %self.contract_type,
                len = self.signature.as_bytes().len(),
                "malformed contract signature"
            );
            return false;
        };
        if !public_key.verify(CONTRACT_NAMESPACE, self.hash().as_ref(), &signature) {
            warn!(
                contract_type = %self.contract_type,
                action = %self.action,
                key = %self.body.payload().legacy_key(),
                "invalid contract signature"
            );
            return false;
        }
        true
    }

    /// Digest that signatures commit to.
    ///
    /// Legacy contracts hash the concatenated type name, key and value so that
    /// hashes of historical contracts stay stable. Later versions hash the
    /// envelope without its signature or public key.
    pub fn hash(&self) -> Digest {
        if self.version == 1 {
            let payload = self.body.payload();
            let mut hasher = Sha256::new();
            hasher.update(self.contract_type.as_str().as_bytes());
            hasher.update(payload.legacy_key().as_bytes());
            hasher.update(payload.legacy_value().as_bytes());
            return hasher.finalize();
        }
        let mut buf = Vec::new();
        self.write_unsigned(&mut buf);
        Sha256::hash(&buf)
    }

    /// A version 1 copy with the payload projected onto key/value strings.
    pub fn to_legacy(&self) -> Self {
        Self {
            version: 1,
            contract_type: self.contract_type,
            action: self.action,
            body: Body::new(Payload::Legacy(self.body.payload().to_legacy())),
            signature: self.signature.clone(),
            public_key: self.public_key.clone(),
        }
    }

    /// The typed payload, converting legacy contracts as needed.
    ///
    /// # Panics
    ///
    /// Panics for legacy CLAIM or MESSAGE contracts (see
    /// [Body::convert_from_legacy]).
    pub fn share_payload(&self) -> Arc<Payload> {
        if self.version > 1 {
            return self.body.assume_legacy();
        }
        self.body.convert_from_legacy(self.contract_type)
    }

    pub fn required_burn_amount(&self) -> u64 {
        self.body.payload().required_burn_amount()
    }

    pub fn log(&self, prefix: &str) {
        let payload = self.body.payload();
        debug!(
            version = self.version,
            contract_type = %self.contract_type,
            action = %self.action,
            key = %payload.legacy_key(),
            value = %payload.legacy_value(),
            public_key = %self.public_key.as_ref().map(|key| hex(key.as_ref())).unwrap_or_default(),
            signature = %self.signature,
            "{prefix}"
        );
    }

    fn write_unsigned(&self, writer: &mut impl BufMut) {
        self.version.write(writer);
        self.contract_type.write(writer);
        self.action.write(writer);
        self.body.payload().write_with(self.action, writer);
    }
}

/// Build a current-version contract around raw key/value strings.
///
/// Intended for PROTOCOL and SCRAPER contracts, whose typed form is the
/// legacy payload itself.
pub fn make_legacy_contract(
    contract_type: ContractType,
    action: ContractAction,
    key: impl Into<String>,
    value: impl Into<String>,
) -> Contract {
    Contract::new(
        contract_type,
        action,
        Payload::Legacy(LegacyPayload::new(key, value)),
    )
}

impl fmt::Display for Contract {
    /// Legacy text form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = self.body.payload();
        if self.contract_type == ContractType::Message {
            return write!(f, "<MESSAGE>{}</MESSAGE>", payload.legacy_value());
        }

        write!(
            f,
            "<MT>{}</MT><MK>{}</MK><MV>{}</MV><MA>{}</MA><MPK>{}</MPK><MS>{}</MS>",
            self.contract_type,
            payload.legacy_key(),
            payload.legacy_value(),
            self.action,
            self.public_key
                .as_ref()
                .map(|key| hex(key.as_ref()))
                .unwrap_or_default(),
            self.signature,
        )
    }
}

impl Write for Contract {
    fn write(&self, writer: &mut impl BufMut) {
        self.write_unsigned(writer);
        self.signature.0.write(writer);
        self.public_key.write(writer);
    }
}

impl Read for Contract {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let version = u32::read(reader)?;
        if version == 0 || version > CURRENT_VERSION {
            return Err(Error::Invalid("Contract", "unsupported version"));
        }
        let contract_type = ContractType::read(reader)?;
        let action = ContractAction::read(reader)?;
        let body = Body::read_cfg(reader, &(version, contract_type, action))?;
        let signature = Vec::<u8>::read_range(reader, 0..=MAX_SIGNATURE_LENGTH)?;
        let public_key = Option::<PublicKey>::read(reader)?;

        Ok(Self {
            version,
            contract_type,
            action,
            body,
            signature: ContractSignature(signature),
            public_key,
        })
    }
}

impl EncodeSize for Contract {
    fn encode_size(&self) -> usize {
        self.version.encode_size()
            + ContractType::SIZE
            + ContractAction::SIZE
            + self.body.payload().encode_size_with(self.action)
            + self.signature.0.encode_size()
            + self.public_key.encode_size()
    }
}
