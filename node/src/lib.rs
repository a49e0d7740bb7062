use commonware_codec::DecodeExt;
use commonware_cryptography::ed25519::{PrivateKey, PublicKey};
use commonware_utils::{from_hex_formatted, hex};
use covenant_execution::ReplayParams;
use covenant_types::NetworkKeys;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexBytes(Vec<u8>);

impl HexBytes {
    pub fn from_hex_formatted(value: &str) -> Option<Self> {
        from_hex_formatted(value).map(Self)
    }
}

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for HexBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex(self.as_ref()))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let bytes = from_hex_formatted(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a hex string"))?;
        Ok(Self(bytes))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn replay_params(&self) -> ReplayParams {
        match self {
            Self::Mainnet => ReplayParams::mainnet(),
            Self::Testnet => ReplayParams::testnet(),
        }
    }
}

/// Contract processing configuration, loaded from YAML.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: Network,

    /// Overrides of the network's replay parameters.
    #[serde(default)]
    pub activation_height: Option<u64>,
    #[serde(default)]
    pub max_beacon_age_secs: Option<u64>,
    #[serde(default)]
    pub superblock_min_version: Option<u32>,

    /// Wallet master key that authorizes administrative contracts.
    #[serde(default)]
    pub master_public_key: Option<HexBytes>,
    /// Replacement message key (testnet only).
    #[serde(default)]
    pub message_private_key: Option<HexBytes>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::default(),
            activation_height: None,
            max_beacon_age_secs: None,
            superblock_min_version: None,
            master_public_key: None,
            message_private_key: None,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{field} is invalid: {value}")]
    InvalidDecode {
        field: &'static str,
        value: String,
        #[source]
        source: commonware_codec::Error,
    },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("message_private_key may only be overridden on testnet (network={network:?})")]
    MessageKeyOverride { network: Network },
}

#[derive(Debug)]
pub struct ValidatedConfig {
    pub network: Network,
    pub replay: ReplayParams,
    pub keys: NetworkKeys,
    pub log_level: Level,
}

struct RedactedConfig<'a>(&'a Config);

impl fmt::Debug for RedactedConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cfg = self.0;
        f.debug_struct("Config")
            .field("network", &cfg.network)
            .field("activation_height", &cfg.activation_height)
            .field("max_beacon_age_secs", &cfg.max_beacon_age_secs)
            .field("superblock_min_version", &cfg.superblock_min_version)
            .field(
                "master_public_key",
                &cfg.master_public_key.as_ref().map(|key| hex(key.as_ref())),
            )
            .field(
                "message_private_key",
                &cfg.message_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("log_level", &cfg.log_level)
            .finish()
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn redact_value(field: &'static str, value: String) -> String {
    match field {
        "message_private_key" => "<redacted>".to_string(),
        _ => value,
    }
}

fn decode_bytes<T: DecodeExt<()>>(field: &'static str, value: &HexBytes) -> Result<T, ConfigError> {
    T::decode(value.as_ref()).map_err(|source| ConfigError::InvalidDecode {
        field,
        value: redact_value(field, hex(value.as_ref())),
        source,
    })
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn redacted_debug(&self) -> impl fmt::Debug + '_ {
        RedactedConfig(self)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let defaults = self.network.replay_params();
        let replay = ReplayParams {
            activation_height: self.activation_height.unwrap_or(defaults.activation_height),
            max_beacon_age_secs: self
                .max_beacon_age_secs
                .unwrap_or(defaults.max_beacon_age_secs),
            superblock_min_version: self
                .superblock_min_version
                .unwrap_or(defaults.superblock_min_version),
        };
        if replay.max_beacon_age_secs == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "max_beacon_age_secs",
                value: 0,
            });
        }

        let master = self
            .master_public_key
            .as_ref()
            .map(|key| decode_bytes::<PublicKey>("master_public_key", key))
            .transpose()?;
        let keys = match &self.message_private_key {
            Some(_) if self.network != Network::Testnet => {
                return Err(ConfigError::MessageKeyOverride {
                    network: self.network,
                })
            }
            Some(key) => NetworkKeys::with_message_key(
                decode_bytes::<PrivateKey>("message_private_key", key)?,
                master,
            ),
            None => NetworkKeys::new(master),
        };

        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        Ok(ValidatedConfig {
            network: self.network,
            replay,
            keys,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests;
