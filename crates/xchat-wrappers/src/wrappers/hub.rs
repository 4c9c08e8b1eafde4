//! Bindings for the Hub contract. Only the calls the CLI makes are included;
//! deployments use the full ABI from the Foundry artifact.
use ethers::contract::abigen;

abigen!(
    Hub,
    r#"[
        function registerEmitter(uint16 chainId, bytes32 emitterAddress) external
        function registeredEmitters(uint16 chainId) external view returns (bytes32)
    ]"#
);
