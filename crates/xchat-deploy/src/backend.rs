//! Every on-chain action the CLI takes goes through the `HubSpokeBackend`
//! trait. The ethers backend talks to the chains configured in the
//! environment; tests swap in an in-memory backend.
use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    contract::ContractCall,
    providers::{Middleware, PendingTransaction},
    types::{Address, Bytes, H256, U256},
};
use eyre::{Result, WrapErr};
use tracing::info;
use xchat_addresses::{ChainInfo, Deployment};
pub use xchat_wrappers::wrappers::spoke::ChatMessage;
use xchat_wrappers::{
    artifacts::{ContractArtifact, HUB, SPOKE},
    wrappers::{hub::Hub, spoke::Spoke},
};

use crate::{
    chain::confirm,
    constants::SEND_MESSAGE_GAS_LIMIT,
    env::Environment,
    error::Error,
    relayer::{self, DeliveryInfo, RedeliveryRequest},
};

#[async_trait]
pub trait HubSpokeBackend: Send + Sync {
    /// Deployments ///

    async fn deploy_hub(&self, chain: &ChainInfo) -> Result<Deployment>;

    async fn deploy_spoke(&self, chain: &ChainInfo, hub: &Deployment) -> Result<Deployment>;

    /// Hub ///

    /// Registers a spoke as a trusted emitter on the hub. Returns once the
    /// transaction is submitted.
    async fn register_spoke(&self, hub: &Deployment, spoke: &Deployment) -> Result<H256>;

    /// The emitter the hub trusts for a chain, zero when none is registered.
    async fn registered_emitter(&self, hub: &Deployment, chain_id: u16) -> Result<H256>;

    /// Spokes ///

    /// The spoke's stored messages, oldest first.
    async fn get_messages(&self, spoke: &Deployment) -> Result<Vec<ChatMessage>>;

    /// Sends a chat message from the spoke. Returns once the transaction is
    /// submitted.
    async fn send_message(&self, spoke: &Deployment, message: Bytes, value: U256)
        -> Result<H256>;

    /// Waits for a submitted transaction to be mined and fails if it reverted.
    async fn wait_for_transaction(&self, chain_id: u16, tx_hash: H256) -> Result<()>;

    /// Relayer ///

    async fn delivery_status(
        &self,
        source: &ChainInfo,
        target: &ChainInfo,
        tx_hash: H256,
    ) -> Result<Vec<DeliveryInfo>>;

    async fn resend(&self, source: &ChainInfo, request: RedeliveryRequest) -> Result<H256>;
}

/// The Spoke call that sends a chat message. The gas limit is fixed because
/// estimation doesn't account for the relayer's delivery fee.
pub fn send_message_call<M: Middleware>(
    spoke: &Spoke<M>,
    message: Bytes,
    value: U256,
) -> ContractCall<M, ()> {
    spoke
        .send_chat_message(message)
        .value(value)
        .gas(SEND_MESSAGE_GAS_LIMIT)
}

/// The Hub call that trusts a spoke as the emitter for its chain.
pub fn register_spoke_call<M: Middleware>(hub: &Hub<M>, spoke: &Deployment) -> ContractCall<M, ()> {
    hub.register_emitter(spoke.chain_id, spoke.universal_address().0)
}

/// Converts decoded `getChatMessages` output into messages. The returned
/// array can be longer than the number of stored messages, so only the first
/// `length` entries are kept.
pub fn chat_messages(raw: Vec<(Address, Bytes)>, length: U256) -> Vec<ChatMessage> {
    let length = if length < U256::from(raw.len()) {
        length.as_usize()
    } else {
        raw.len()
    };
    raw.into_iter()
        .take(length)
        .map(|(sender, message)| ChatMessage { sender, message })
        .collect()
}

/// A backend that signs with the environment's wallet and sends transactions
/// to the configured RPC endpoints.
#[derive(Clone, Debug)]
pub struct EthersBackend {
    env: Environment,
}

impl EthersBackend {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    fn artifact(&self, name: &str) -> Result<ContractArtifact> {
        ContractArtifact::load(self.env.artifacts_dir(), name)
            .map_err(|e| Error::configuration(format!("{:#}", e)).into())
    }
}

#[async_trait]
impl HubSpokeBackend for EthersBackend {
    async fn deploy_hub(&self, chain: &ChainInfo) -> Result<Deployment> {
        let artifact = self.artifact(HUB)?;
        let client = self.env.signer(chain.chain_id)?;
        crate::deploy::deploy_hub(client, chain, &artifact).await
    }

    async fn deploy_spoke(&self, chain: &ChainInfo, hub: &Deployment) -> Result<Deployment> {
        let artifact = self.artifact(SPOKE)?;
        let client = self.env.signer(chain.chain_id)?;
        crate::deploy::deploy_spoke(client, chain, hub, &artifact).await
    }

    async fn register_spoke(&self, hub: &Deployment, spoke: &Deployment) -> Result<H256> {
        let client = self.env.signer(hub.chain_id)?;
        let hub = Hub::new(hub.address, client);
        let call = register_spoke_call(&hub, spoke);
        let pending_tx = call
            .send()
            .await
            .wrap_err_with(|| format!("couldn't register spoke on chain {}", spoke.chain_id))?;
        let tx_hash = pending_tx.tx_hash();
        info!(?tx_hash, chain_id = spoke.chain_id, "submitted registration");
        Ok(tx_hash)
    }

    async fn registered_emitter(&self, hub: &Deployment, chain_id: u16) -> Result<H256> {
        let chains = self.env.load_chains()?;
        let provider = self.env.provider(chains.get(hub.chain_id)?)?;
        let hub = Hub::new(hub.address, Arc::new(provider));
        let emitter = hub.registered_emitters(chain_id).call().await?;
        Ok(H256(emitter))
    }

    async fn get_messages(&self, spoke: &Deployment) -> Result<Vec<ChatMessage>> {
        let chains = self.env.load_chains()?;
        let provider = self.env.provider(chains.get(spoke.chain_id)?)?;
        let spoke = Spoke::new(spoke.address, Arc::new(provider));
        let (messages, length) = spoke.get_chat_messages().call().await?;
        Ok(chat_messages(messages, length))
    }

    async fn send_message(
        &self,
        spoke: &Deployment,
        message: Bytes,
        value: U256,
    ) -> Result<H256> {
        let client = self.env.signer(spoke.chain_id)?;
        let spoke = Spoke::new(spoke.address, client);
        let call = send_message_call(&spoke, message, value);
        let pending_tx = call.send().await.wrap_err("couldn't send message")?;
        let tx_hash = pending_tx.tx_hash();
        info!(?tx_hash, "submitted message");
        Ok(tx_hash)
    }

    async fn wait_for_transaction(&self, chain_id: u16, tx_hash: H256) -> Result<()> {
        let chains = self.env.load_chains()?;
        let provider = self.env.provider(chains.get(chain_id)?)?;
        confirm(PendingTransaction::new(tx_hash, &provider), "pending").await?;
        Ok(())
    }

    async fn delivery_status(
        &self,
        source: &ChainInfo,
        target: &ChainInfo,
        tx_hash: H256,
    ) -> Result<Vec<DeliveryInfo>> {
        let source_provider = self.env.provider(source)?;
        let target_provider = self.env.provider(target)?;
        relayer::delivery_status(
            Arc::new(source_provider),
            source,
            Arc::new(target_provider),
            target,
            tx_hash,
            self.env.status_lookback_blocks(),
        )
        .await
    }

    async fn resend(&self, source: &ChainInfo, request: RedeliveryRequest) -> Result<H256> {
        info!(
            source_chain = request.source_chain,
            target_chain = request.target_chain,
            tx_hash = ?request.source_tx_hash,
            delivery_index = request.delivery_index,
            "requesting redelivery"
        );
        let client = self.env.signer(source.chain_id)?;
        relayer::resend(client, source, request).await
    }
}
