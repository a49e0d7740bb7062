use super::*;
use commonware_cryptography::Signer;
use covenant_types::{
    keys::{MESSAGE_PRIVATE_KEY, MESSAGE_PUBLIC_KEY},
    KeySource,
};

const TEST_SEED: [u8; 32] = [7; 32];

#[test]
fn config_defaults_to_mainnet() {
    let validated = Config::from_yaml("{}").unwrap().validate().unwrap();
    assert_eq!(validated.network, Network::Mainnet);
    assert_eq!(validated.replay, ReplayParams::mainnet());
    assert_eq!(validated.log_level, Level::INFO);
    assert!(validated.keys.master_public_key().is_none());
    assert_eq!(
        validated.keys.message_public_key(),
        NetworkKeys::default().message_public_key()
    );
}

#[test]
fn config_applies_overrides() {
    let yaml = format!(
        "network: testnet\nactivation_height: 10\nmax_beacon_age_secs: 3600\nmaster_public_key: {}\nlog_level: debug\n",
        hex(&MESSAGE_PUBLIC_KEY)
    );
    let validated = Config::from_yaml(&yaml).unwrap().validate().unwrap();

    assert_eq!(validated.network, Network::Testnet);
    assert_eq!(validated.replay.activation_height, 10);
    assert_eq!(validated.replay.max_beacon_age_secs, 3600);
    assert_eq!(
        validated.replay.superblock_min_version,
        ReplayParams::SUPERBLOCK_MIN_VERSION
    );
    assert_eq!(validated.log_level, Level::DEBUG);
    assert_eq!(
        validated.keys.master_public_key(),
        Some(NetworkKeys::default().message_public_key())
    );
}

#[test]
fn config_testnet_message_key_override() {
    let yaml = format!("network: testnet\nmessage_private_key: {}\n", hex(&TEST_SEED));
    let validated = Config::from_yaml(&yaml).unwrap().validate().unwrap();

    let expected = PrivateKey::decode(TEST_SEED.as_slice()).unwrap().public_key();
    assert_eq!(validated.keys.message_public_key(), expected);
}

#[test]
fn config_rejects_mainnet_message_key_override() {
    let config = Config {
        message_private_key: HexBytes::from_hex_formatted(&hex(&TEST_SEED)),
        ..Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MessageKeyOverride {
            network: Network::Mainnet
        })
    ));
}

#[test]
fn config_rejects_bad_hex() {
    let err = Config::from_yaml("master_public_key: not-hex\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn config_rejects_bad_key_length() {
    let config = Config {
        master_public_key: HexBytes::from_hex_formatted("deadbeef"),
        ..Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidDecode {
            field: "master_public_key",
            ..
        })
    ));
}

#[test]
fn config_rejects_bad_log_level() {
    let config = Config {
        log_level: "loud".to_string(),
        ..Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidLogLevel { value }) if value == "loud"
    ));
}

#[test]
fn config_rejects_zero_beacon_age() {
    let config = Config {
        max_beacon_age_secs: Some(0),
        ..Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidNonZero {
            field: "max_beacon_age_secs",
            value: 0
        })
    ));
}

#[test]
fn config_redacted_debug_does_not_leak_secrets() {
    let config = Config {
        network: Network::Testnet,
        message_private_key: HexBytes::from_hex_formatted(&hex(&MESSAGE_PRIVATE_KEY)),
        ..Config::default()
    };
    let rendered = format!("{:?}", config.redacted_debug());
    assert!(rendered.contains("<redacted>"));
    assert!(!rendered.contains(&hex(&MESSAGE_PRIVATE_KEY)));

    let validated = config.validate().unwrap();
    let rendered = format!("{validated:?}");
    assert!(!rendered.contains(&hex(&MESSAGE_PRIVATE_KEY)));
}

#[test]
fn config_decode_error_redacts_private_key() {
    let config = Config {
        network: Network::Testnet,
        message_private_key: HexBytes::from_hex_formatted("deadbeef"),
        ..Config::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("<redacted>"));
    assert!(!err.to_string().contains("deadbeef"));
}
