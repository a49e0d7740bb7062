use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use std::sync::Arc;

use super::{ContractAction, ContractType, MAX_MONEY, STANDARD_BURN_AMOUNT};
use crate::legacy::{read_string, string_encode_size, write_string};
use crate::payloads::{
    BeaconPayload, ClaimPayload, MessagePayload, PollPayload, ProjectPayload, VotePayload,
};

/// A payload parsed from a version 1 contract: the raw key/value strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyPayload {
    pub key: String,
    pub value: String,
}

impl LegacyPayload {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn well_formed(&self, action: ContractAction) -> bool {
        !self.key.is_empty() && (action == ContractAction::Remove || !self.value.is_empty())
    }

    /// Removals carry only the key.
    fn write_with(&self, action: ContractAction, writer: &mut impl BufMut) {
        write_string(&self.key, writer);
        if action != ContractAction::Remove {
            write_string(&self.value, writer);
        }
    }

    fn encode_size_with(&self, action: ContractAction) -> usize {
        string_encode_size(&self.key)
            + if action != ContractAction::Remove {
                string_encode_size(&self.value)
            } else {
                0
            }
    }
}

impl Read for LegacyPayload {
    type Cfg = ContractAction;

    fn read_cfg(reader: &mut impl Buf, action: &Self::Cfg) -> Result<Self, Error> {
        let key = read_string(reader)?;
        let value = if *action != ContractAction::Remove {
            read_string(reader)?
        } else {
            String::new()
        };
        Ok(Self { key, value })
    }
}

/// The type-specific content of a contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Payload {
    /// Placeholder that is never valid.
    #[default]
    Empty,
    Legacy(LegacyPayload),
    Beacon(BeaconPayload),
    Claim(ClaimPayload),
    Message(MessagePayload),
    Poll(PollPayload),
    Project(ProjectPayload),
    Vote(VotePayload),
}

impl Payload {
    /// Empty instance of the variant that carries contracts of `contract_type`.
    pub fn empty_for(contract_type: ContractType) -> Self {
        match contract_type {
            ContractType::Unknown => Self::Empty,
            ContractType::Beacon => Self::Beacon(BeaconPayload::default()),
            ContractType::Claim => Self::Claim(ClaimPayload::default()),
            ContractType::Message => Self::Message(MessagePayload::default()),
            ContractType::Poll => Self::Poll(PollPayload::default()),
            ContractType::Project => Self::Project(ProjectPayload::default()),
            ContractType::Protocol | ContractType::Scraper => {
                Self::Legacy(LegacyPayload::default())
            }
            ContractType::Vote => Self::Vote(VotePayload::default()),
        }
    }

    /// Legacy and empty payloads do not know their contract type.
    pub fn contract_type(&self) -> ContractType {
        match self {
            Self::Empty | Self::Legacy(_) => ContractType::Unknown,
            Self::Beacon(_) => ContractType::Beacon,
            Self::Claim(_) => ContractType::Claim,
            Self::Message(_) => ContractType::Message,
            Self::Poll(_) => ContractType::Poll,
            Self::Project(_) => ContractType::Project,
            Self::Vote(_) => ContractType::Vote,
        }
    }

    pub fn well_formed(&self, action: ContractAction) -> bool {
        match self {
            Self::Empty => false,
            Self::Legacy(payload) => payload.well_formed(action),
            Self::Beacon(payload) => payload.well_formed(action),
            Self::Claim(payload) => payload.well_formed(action),
            Self::Message(payload) => payload.well_formed(action),
            Self::Poll(payload) => payload.well_formed(action),
            Self::Project(payload) => payload.well_formed(action),
            Self::Vote(payload) => payload.well_formed(action),
        }
    }

    pub fn legacy_key(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Legacy(payload) => payload.key.clone(),
            Self::Beacon(payload) => payload.legacy_key(),
            Self::Claim(payload) => payload.legacy_key(),
            Self::Message(payload) => payload.legacy_key(),
            Self::Poll(payload) => payload.legacy_key(),
            Self::Project(payload) => payload.legacy_key(),
            Self::Vote(payload) => payload.legacy_key(),
        }
    }

    pub fn legacy_value(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Legacy(payload) => payload.value.clone(),
            Self::Beacon(payload) => payload.legacy_value(),
            Self::Claim(payload) => payload.legacy_value(),
            Self::Message(payload) => payload.legacy_value(),
            Self::Poll(payload) => payload.legacy_value(),
            Self::Project(payload) => payload.legacy_value(),
            Self::Vote(payload) => payload.legacy_value(),
        }
    }

    /// Amount that must be burned by the transaction carrying this payload.
    pub fn required_burn_amount(&self) -> u64 {
        match self {
            Self::Empty => MAX_MONEY,
            Self::Legacy(_) => STANDARD_BURN_AMOUNT,
            Self::Beacon(payload) => payload.required_burn_amount(),
            Self::Claim(payload) => payload.required_burn_amount(),
            Self::Message(payload) => payload.required_burn_amount(),
            Self::Poll(payload) => payload.required_burn_amount(),
            Self::Project(payload) => payload.required_burn_amount(),
            Self::Vote(payload) => payload.required_burn_amount(),
        }
    }

    /// Project onto the legacy key/value strings.
    pub fn to_legacy(&self) -> LegacyPayload {
        match self {
            Self::Legacy(payload) => payload.clone(),
            other => LegacyPayload::new(other.legacy_key(), other.legacy_value()),
        }
    }

    pub(crate) fn write_with(&self, action: ContractAction, writer: &mut impl BufMut) {
        match self {
            Self::Empty => {}
            Self::Legacy(payload) => payload.write_with(action, writer),
            Self::Beacon(payload) => payload.write(writer),
            Self::Claim(payload) => payload.write(writer),
            Self::Message(payload) => payload.write(writer),
            Self::Poll(payload) => payload.write(writer),
            Self::Project(payload) => payload.write(writer),
            Self::Vote(payload) => payload.write(writer),
        }
    }

    pub(crate) fn encode_size_with(&self, action: ContractAction) -> usize {
        match self {
            Self::Empty => 0,
            Self::Legacy(payload) => payload.encode_size_with(action),
            Self::Beacon(payload) => payload.encode_size(),
            Self::Claim(payload) => payload.encode_size(),
            Self::Message(payload) => payload.encode_size(),
            Self::Poll(payload) => payload.encode_size(),
            Self::Project(payload) => payload.encode_size(),
            Self::Vote(payload) => payload.encode_size(),
        }
    }
}

/// Owns the payload of a contract.
///
/// The payload sits behind an [Arc] so that [Body::assume_legacy] can hand out
/// a view of it without copying. Nothing mutates a payload once it is shared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Body {
    payload: Arc<Payload>,
}

impl Body {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload: Arc::new(payload),
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn well_formed(&self, action: ContractAction) -> bool {
        self.payload.well_formed(action)
    }

    /// Share the payload as-is, for callers that only need its legacy strings.
    pub fn assume_legacy(&self) -> Arc<Payload> {
        Arc::clone(&self.payload)
    }

    /// Parse the legacy key/value strings into the payload for `contract_type`.
    ///
    /// PROTOCOL and SCRAPER contracts keep their key/value form, so the
    /// existing payload is shared rather than rebuilt.
    ///
    /// # Panics
    ///
    /// Claims and transaction messages have no legacy contract form. The
    /// dispatcher never routes them here, so converting one is a defect.
    pub fn convert_from_legacy(&self, contract_type: ContractType) -> Arc<Payload> {
        let legacy = self.payload.to_legacy();

        match contract_type {
            ContractType::Unknown => Arc::new(Payload::Empty),
            ContractType::Beacon => Arc::new(Payload::Beacon(BeaconPayload::parse_legacy(
                &legacy.key,
                &legacy.value,
            ))),
            ContractType::Claim => panic!("attempted to convert legacy claim contract"),
            ContractType::Message => panic!("attempted to convert legacy message contract"),
            ContractType::Poll => Arc::new(Payload::Poll(PollPayload::parse_legacy(
                &legacy.key,
                &legacy.value,
            ))),
            ContractType::Project => Arc::new(Payload::Project(ProjectPayload::parse_legacy(
                &legacy.key,
                &legacy.value,
            ))),
            ContractType::Protocol | ContractType::Scraper => Arc::clone(&self.payload),
            ContractType::Vote => Arc::new(Payload::Vote(VotePayload::parse_legacy(
                &legacy.key,
                &legacy.value,
            ))),
        }
    }

    /// Replace the payload with a fresh, empty instance for `contract_type`.
    pub fn reset_type(&mut self, contract_type: ContractType) {
        self.payload = Arc::new(Payload::empty_for(contract_type));
    }

    /// Decode into the (freshly reset) payload variant.
    fn read_payload(&mut self, reader: &mut impl Buf, action: ContractAction) -> Result<(), Error> {
        match Arc::make_mut(&mut self.payload) {
            Payload::Empty => {}
            Payload::Legacy(payload) => *payload = LegacyPayload::read_cfg(reader, &action)?,
            Payload::Beacon(payload) => *payload = BeaconPayload::read(reader)?,
            Payload::Claim(payload) => *payload = ClaimPayload::read(reader)?,
            Payload::Message(payload) => *payload = MessagePayload::read(reader)?,
            Payload::Poll(payload) => *payload = PollPayload::read(reader)?,
            Payload::Project(payload) => *payload = ProjectPayload::read(reader)?,
            Payload::Vote(payload) => *payload = VotePayload::read(reader)?,
        }
        Ok(())
    }
}

impl From<Payload> for Body {
    fn from(payload: Payload) -> Self {
        Self::new(payload)
    }
}

impl Read for Body {
    /// Version 1 bodies are always legacy; later versions are typed by the
    /// contract type.
    type Cfg = (u32, ContractType, ContractAction);

    fn read_cfg(reader: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, Error> {
        let (version, contract_type, action) = *cfg;
        if version == 1 {
            return Ok(Self::new(Payload::Legacy(LegacyPayload::read_cfg(
                reader, &action,
            )?)));
        }

        let mut body = Self::default();
        body.reset_type(contract_type);
        body.read_payload(reader, action)?;
        Ok(body)
    }
}
