/// Network parameters that bound contract replay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayParams {
    /// No legacy contracts exist below this height.
    pub activation_height: u64,
    /// How far back (in seconds) replay starts from the requested block.
    pub max_beacon_age_secs: u64,
    /// Superblocks below this block version predate beacon verification.
    pub superblock_min_version: u32,
}

impl ReplayParams {
    /// Beacons expire after six months.
    pub const MAX_BEACON_AGE_SECS: u64 = 60 * 60 * 24 * 30 * 6;
    pub const SUPERBLOCK_MIN_VERSION: u32 = 11;

    pub fn mainnet() -> Self {
        Self {
            activation_height: 164_618,
            max_beacon_age_secs: Self::MAX_BEACON_AGE_SECS,
            superblock_min_version: Self::SUPERBLOCK_MIN_VERSION,
        }
    }

    pub fn testnet() -> Self {
        Self {
            activation_height: 1,
            ..Self::mainnet()
        }
    }
}

impl Default for ReplayParams {
    fn default() -> Self {
        Self::mainnet()
    }
}
