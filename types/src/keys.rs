//! Keys that authorize privileged contract operations.
//!
//! The message key is a network-wide key pair whose private half is public
//! knowledge: it proves only that a contract came from node software, not who
//! sent it. The master key is held by a wallet and is never known to this
//! crate beyond its public half.

use commonware_codec::ReadExt;
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    Signer,
};
use commonware_utils::hex;
use std::fmt;

/// Namespace under which every contract signature is produced.
pub const CONTRACT_NAMESPACE: &[u8] = b"_COVENANT_CONTRACT";

/// Seed of the network message key (valid since genesis).
pub const MESSAGE_PRIVATE_KEY: [u8; 32] = [
    0xfb, 0xd4, 0x5f, 0xfb, 0x02, 0xff, 0x05, 0xa3, 0x32, 0x2c, 0x0d, 0x77, 0xe1, 0xe7, 0xae, 0xa2,
    0x64, 0x86, 0x6c, 0x24, 0xe8, 0x1e, 0x5a, 0xb6, 0xa8, 0xe1, 0x50, 0x66, 0x6b, 0x4d, 0xc6, 0xd8,
];

/// Public half of [MESSAGE_PRIVATE_KEY].
pub const MESSAGE_PUBLIC_KEY: [u8; 32] = [
    0x14, 0xf5, 0x9f, 0x16, 0x96, 0x9b, 0x0c, 0x0c, 0x66, 0xe9, 0x27, 0xf4, 0x6c, 0xe7, 0x64, 0x6b,
    0xb0, 0x87, 0xb1, 0xdd, 0x09, 0xa5, 0x8d, 0xce, 0x73, 0x1b, 0xa8, 0x4c, 0x4f, 0xdc, 0x0d, 0x74,
];

/// Supplies the keys that contract policy may demand.
pub trait KeySource {
    fn message_public_key(&self) -> PublicKey;
    fn message_private_key(&self) -> PrivateKey;
    /// The wallet's master key, if one is configured.
    fn master_public_key(&self) -> Option<PublicKey>;
}

/// Keys for a network: the fixed message key plus the wallet master key.
#[derive(Clone)]
pub struct NetworkKeys {
    message_private: PrivateKey,
    message_public: PublicKey,
    master: Option<PublicKey>,
}

impl NetworkKeys {
    pub fn new(master: Option<PublicKey>) -> Self {
        let message_private = PrivateKey::read(&mut MESSAGE_PRIVATE_KEY.as_slice())
            .expect("message key constant is a valid ed25519 seed");
        let message_public = PublicKey::read(&mut MESSAGE_PUBLIC_KEY.as_slice())
            .expect("message key constant is a valid ed25519 point");

        Self {
            message_private,
            message_public,
            master,
        }
    }

    /// Substitute an alternate message key (test networks).
    pub fn with_message_key(message_private: PrivateKey, master: Option<PublicKey>) -> Self {
        let message_public = message_private.public_key();
        Self {
            message_private,
            message_public,
            master,
        }
    }
}

impl Default for NetworkKeys {
    fn default() -> Self {
        Self::new(None)
    }
}

impl KeySource for NetworkKeys {
    fn message_public_key(&self) -> PublicKey {
        self.message_public.clone()
    }

    fn message_private_key(&self) -> PrivateKey {
        self.message_private.clone()
    }

    fn master_public_key(&self) -> Option<PublicKey> {
        self.master.clone()
    }
}

impl fmt::Debug for NetworkKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkKeys")
            .field("message_public", &hex(self.message_public.as_ref()))
            .field("message_private", &"<redacted>")
            .field("master", &self.master.as_ref().map(|key| hex(key.as_ref())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_math::algebra::Random;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_message_key_constants_match() {
        let keys = NetworkKeys::default();
        assert_eq!(
            keys.message_private_key().public_key(),
            keys.message_public_key()
        );
        let public = keys.message_public_key();
        let bytes: &[u8] = public.as_ref();
        assert_eq!(bytes, MESSAGE_PUBLIC_KEY.as_slice());
        assert!(keys.master_public_key().is_none());
    }

    #[test]
    fn test_substitute_message_key() {
        let mut rng = StdRng::seed_from_u64(7);
        let private = PrivateKey::random(&mut rng);
        let master = PrivateKey::random(&mut rng).public_key();
        let keys = NetworkKeys::with_message_key(private.clone(), Some(master.clone()));

        assert_eq!(keys.message_public_key(), private.public_key());
        assert_ne!(keys.message_public_key(), NetworkKeys::default().message_public_key());
        assert_eq!(keys.master_public_key(), Some(master));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", NetworkKeys::default());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex(&MESSAGE_PRIVATE_KEY)));
    }
}
