use ethers::types::U256;

/// The environment used when `ENV` isn't set.
pub const DEFAULT_ENV: &str = "testnet";

/// The directory Foundry writes build artifacts to.
pub const DEFAULT_ARTIFACTS_DIR: &str = "./out";

/// How far back on the target chain to search for delivery events.
pub const DEFAULT_STATUS_LOOKBACK_BLOCKS: u64 = 5_000;

/// Output directory names for the two deployment processes.
pub const DEPLOY_INDIVIDUAL_CONTRACT: &str = "deployIndividualContract";
pub const DEPLOY_HUB_AND_SPOKES: &str = "deployHubAndSpokes";

pub const LAST_RUN_FILE: &str = "lastrun.json";

pub const SEND_MESSAGE_GAS_LIMIT: u64 = 5_000_000;

lazy_static! {
    // The value attached to chat messages and redelivery requests when none
    // is given on the command line. This pays for delivery to the hub.
    pub static ref DEFAULT_MESSAGE_VALUE: U256 = U256::exp10(17) * 2;
}
