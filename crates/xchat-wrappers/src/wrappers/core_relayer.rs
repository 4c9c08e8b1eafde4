//! Bindings for the generic relayer's on-chain entry point.
use ethers::contract::abigen;

abigen!(
    CoreRelayer,
    r#"[
        struct ResendByTx { uint16 sourceChain; bytes32 sourceTxHash; uint32 sourceNonce; uint16 targetChain; uint8 deliveryIndex; uint8 multisendIndex; uint256 newMaxTransactionFee; uint256 newReceiverValue; bytes newRelayParameters; }
        function resend(ResendByTx request, address relayProvider) external payable returns (uint64)
        function getDefaultRelayProvider() external view returns (address)
        function getDefaultRelayParams() external view returns (bytes)
        event Delivery(address indexed recipientContract, uint16 indexed sourceChain, uint64 indexed sequence, bytes32 deliveryVaaHash, uint8 status)
    ]"#
);
