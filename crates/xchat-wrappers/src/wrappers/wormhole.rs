//! Bindings for the Wormhole core contract. Every cross-chain message,
//! including relay requests, is published through this event.
use ethers::contract::abigen;

abigen!(
    Wormhole,
    r#"[
        event LogMessagePublished(address indexed sender, uint64 sequence, uint32 nonce, bytes payload, uint8 consistencyLevel)
    ]"#
);
