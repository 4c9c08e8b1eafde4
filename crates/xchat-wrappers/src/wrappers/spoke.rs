//! Bindings for the Spoke contract.
use ethers::contract::abigen;

abigen!(
    Spoke,
    r#"[
        struct ChatMessage { address sender; bytes message; }
        function getChatMessages() external view returns (ChatMessage[], uint256)
        function sendChatMessage(bytes message) external payable
    ]"#
);
