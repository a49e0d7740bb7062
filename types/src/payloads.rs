//! Typed (version 2+) contract payloads.
//!
//! Registries that consume these payloads live outside this crate. Each type
//! knows how to project itself onto the legacy key/value strings and, for the
//! types that existed before version 2, how to parse itself back from them.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};
use commonware_utils::{from_hex, hex};

use crate::contract::{ContractAction, POLL_BURN_AMOUNT, STANDARD_BURN_AMOUNT};
use crate::legacy::{read_string, string_encode_size, write_string};

/// Size of an ed25519 public key advertised by a beacon.
pub const BEACON_KEY_LENGTH: usize = 32;

/// Maximum number of answers a single vote may select.
pub const MAX_VOTE_ANSWERS: usize = 20;

/// Separator used by the legacy vote key and answer list.
const LEGACY_VOTE_SEPARATOR: char = ';';

/// Advertises a participant's identity and the key that signs on its behalf.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BeaconPayload {
    pub cpid: String,
    pub public_key: Vec<u8>,
}

impl BeaconPayload {
    pub fn parse_legacy(key: &str, value: &str) -> Self {
        Self {
            cpid: key.to_string(),
            public_key: from_hex(value).unwrap_or_default(),
        }
    }

    pub fn well_formed(&self, action: ContractAction) -> bool {
        !self.cpid.is_empty()
            && (action == ContractAction::Remove || self.public_key.len() == BEACON_KEY_LENGTH)
    }

    pub fn legacy_key(&self) -> String {
        self.cpid.clone()
    }

    pub fn legacy_value(&self) -> String {
        hex(&self.public_key)
    }

    pub fn required_burn_amount(&self) -> u64 {
        STANDARD_BURN_AMOUNT
    }
}

impl Write for BeaconPayload {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.cpid, writer);
        self.public_key.write(writer);
    }
}

impl Read for BeaconPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            cpid: read_string(reader)?,
            public_key: Vec::<u8>::read_range(reader, 0..=BEACON_KEY_LENGTH)?,
        })
    }
}

impl EncodeSize for BeaconPayload {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.cpid) + self.public_key.encode_size()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollPayload {
    pub title: String,
    pub question: String,
}

impl PollPayload {
    pub fn parse_legacy(key: &str, value: &str) -> Self {
        Self {
            title: key.to_string(),
            question: value.to_string(),
        }
    }

    pub fn well_formed(&self, action: ContractAction) -> bool {
        !self.title.is_empty() && (action == ContractAction::Remove || !self.question.is_empty())
    }

    pub fn legacy_key(&self) -> String {
        self.title.clone()
    }

    pub fn legacy_value(&self) -> String {
        self.question.clone()
    }

    pub fn required_burn_amount(&self) -> u64 {
        POLL_BURN_AMOUNT
    }
}

impl Write for PollPayload {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.title, writer);
        write_string(&self.question, writer);
    }
}

impl Read for PollPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            title: read_string(reader)?,
            question: read_string(reader)?,
        })
    }
}

impl EncodeSize for PollPayload {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.title) + string_encode_size(&self.question)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VotePayload {
    pub poll_title: String,
    pub voter: String,
    pub answers: Vec<String>,
}

impl VotePayload {
    /// Legacy votes are keyed `title;voter` and list answers separated by `;`.
    pub fn parse_legacy(key: &str, value: &str) -> Self {
        let (poll_title, voter) = key
            .split_once(LEGACY_VOTE_SEPARATOR)
            .unwrap_or((key, ""));
        let answers = value
            .split(LEGACY_VOTE_SEPARATOR)
            .filter(|answer| !answer.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            poll_title: poll_title.to_string(),
            voter: voter.to_string(),
            answers,
        }
    }

    pub fn well_formed(&self, action: ContractAction) -> bool {
        !self.poll_title.is_empty()
            && !self.voter.is_empty()
            && (action == ContractAction::Remove
                || (!self.answers.is_empty() && self.answers.len() <= MAX_VOTE_ANSWERS))
    }

    pub fn legacy_key(&self) -> String {
        format!("{}{LEGACY_VOTE_SEPARATOR}{}", self.poll_title, self.voter)
    }

    pub fn legacy_value(&self) -> String {
        self.answers.join(&LEGACY_VOTE_SEPARATOR.to_string())
    }

    pub fn required_burn_amount(&self) -> u64 {
        STANDARD_BURN_AMOUNT
    }
}

impl Write for VotePayload {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.poll_title, writer);
        write_string(&self.voter, writer);
        (self.answers.len() as u32).write(writer);
        for answer in &self.answers {
            write_string(answer, writer);
        }
    }
}

impl Read for VotePayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let poll_title = read_string(reader)?;
        let voter = read_string(reader)?;
        let count = u32::read(reader)? as usize;
        if count > MAX_VOTE_ANSWERS {
            return Err(Error::Invalid("VotePayload", "too many answers"));
        }
        let mut answers = Vec::with_capacity(count);
        for _ in 0..count {
            answers.push(read_string(reader)?);
        }

        Ok(Self {
            poll_title,
            voter,
            answers,
        })
    }
}

impl EncodeSize for VotePayload {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.poll_title)
            + string_encode_size(&self.voter)
            + 4
            + self
                .answers
                .iter()
                .map(|answer| string_encode_size(answer))
                .sum::<usize>()
    }
}

/// A whitelisted project.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectPayload {
    pub name: String,
    pub url: String,
    /// Set by the whitelist when the contract is applied; zero for legacy data.
    pub timestamp: u64,
}

impl ProjectPayload {
    pub fn parse_legacy(key: &str, value: &str) -> Self {
        Self {
            name: key.to_string(),
            url: value.to_string(),
            timestamp: 0,
        }
    }

    pub fn well_formed(&self, action: ContractAction) -> bool {
        !self.name.is_empty() && (action == ContractAction::Remove || !self.url.is_empty())
    }

    pub fn legacy_key(&self) -> String {
        self.name.clone()
    }

    pub fn legacy_value(&self) -> String {
        self.url.clone()
    }

    pub fn required_burn_amount(&self) -> u64 {
        STANDARD_BURN_AMOUNT
    }
}

impl Write for ProjectPayload {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.name, writer);
        write_string(&self.url, writer);
        self.timestamp.write(writer);
    }
}

impl Read for ProjectPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            name: read_string(reader)?,
            url: read_string(reader)?,
            timestamp: u64::read(reader)?,
        })
    }
}

impl EncodeSize for ProjectPayload {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.name) + string_encode_size(&self.url) + self.timestamp.encode_size()
    }
}

/// A block reward claim. Only ever carried by a coinbase transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimPayload {
    pub mining_id: String,
    pub block_subsidy: u64,
}

impl ClaimPayload {
    pub fn well_formed(&self, _action: ContractAction) -> bool {
        !self.mining_id.is_empty()
    }

    pub fn legacy_key(&self) -> String {
        self.mining_id.clone()
    }

    pub fn legacy_value(&self) -> String {
        String::new()
    }

    pub fn required_burn_amount(&self) -> u64 {
        0
    }
}

impl Write for ClaimPayload {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.mining_id, writer);
        self.block_subsidy.write(writer);
    }
}

impl Read for ClaimPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            mining_id: read_string(reader)?,
            block_subsidy: u64::read(reader)?,
        })
    }
}

impl EncodeSize for ClaimPayload {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.mining_id) + self.block_subsidy.encode_size()
    }
}

/// Free-form text attached to a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagePayload {
    pub message: String,
}

impl MessagePayload {
    pub fn well_formed(&self, _action: ContractAction) -> bool {
        !self.message.is_empty()
    }

    pub fn legacy_key(&self) -> String {
        String::new()
    }

    pub fn legacy_value(&self) -> String {
        self.message.clone()
    }

    pub fn required_burn_amount(&self) -> u64 {
        STANDARD_BURN_AMOUNT
    }
}

impl Write for MessagePayload {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.message, writer);
    }
}

impl Read for MessagePayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            message: read_string(reader)?,
        })
    }
}

impl EncodeSize for MessagePayload {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.message)
    }
}
