/// This module talks to the generic relayer's contracts. A message sent from
/// a spoke publishes Wormhole messages on the source chain; the ones emitted
/// by the core relayer are relay requests. The relayer later delivers each
/// request on the target chain and emits a `Delivery` event keyed by the
/// source chain and the request's sequence number.
use std::{fmt, sync::Arc};

use ethers::{
    contract::{ContractCall, EthLogDecode},
    providers::Middleware,
    types::{Address, Bytes, Log, H256, U256, U64},
};
use eyre::Result;
use tracing::{debug, warn};
use xchat_addresses::ChainInfo;
use xchat_wrappers::wrappers::{
    core_relayer::{CoreRelayer, ResendByTx},
    wormhole::LogMessagePublishedFilter,
};

use crate::chain::confirm;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    ReceiverFailure,
    ForwardRequestFailure,
    ForwardRequestSuccess,
    InvalidRedelivery,
    /// No delivery was found on the target chain yet.
    Pending,
    Unknown(u8),
}

impl From<u8> for DeliveryStatus {
    fn from(status: u8) -> Self {
        match status {
            0 => Self::Success,
            1 => Self::ReceiverFailure,
            2 => Self::ForwardRequestFailure,
            3 => Self::ForwardRequestSuccess,
            4 => Self::InvalidRedelivery,
            n => Self::Unknown(n),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "delivered"),
            Self::ReceiverFailure => write!(f, "receiver failure"),
            Self::ForwardRequestFailure => write!(f, "forward request failure"),
            Self::ForwardRequestSuccess => write!(f, "forward request success"),
            Self::InvalidRedelivery => write!(f, "invalid redelivery"),
            Self::Pending => write!(f, "pending"),
            Self::Unknown(n) => write!(f, "unknown status {}", n),
        }
    }
}

/// A relay request published by a source transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayRequest {
    pub sequence: u64,
    pub nonce: u32,
    /// The request's position among all Wormhole messages the transaction
    /// published.
    pub delivery_index: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryInfo {
    pub request: RelayRequest,
    pub status: DeliveryStatus,
    pub target_tx_hash: Option<H256>,
}

/// Everything the relayer needs to redeliver a request with a new fee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedeliveryRequest {
    pub source_chain: u16,
    pub source_tx_hash: H256,
    pub source_nonce: u32,
    pub target_chain: u16,
    pub delivery_index: u8,
    pub new_fee: U256,
}

impl RedeliveryRequest {
    pub fn new(
        source: &ChainInfo,
        target: &ChainInfo,
        source_tx_hash: H256,
        request: &RelayRequest,
        new_fee: U256,
    ) -> Self {
        Self {
            source_chain: source.chain_id,
            source_tx_hash,
            source_nonce: request.nonce,
            target_chain: target.chain_id,
            delivery_index: request.delivery_index,
            new_fee,
        }
    }

    fn into_resend(self, relay_parameters: Bytes) -> ResendByTx {
        ResendByTx {
            source_chain: self.source_chain,
            source_tx_hash: self.source_tx_hash.0,
            source_nonce: self.source_nonce,
            target_chain: self.target_chain,
            delivery_index: self.delivery_index,
            multisend_index: 0,
            new_max_transaction_fee: self.new_fee,
            new_receiver_value: U256::zero(),
            new_relay_parameters: relay_parameters,
        }
    }
}

/// Finds the relay requests among a transaction's logs.
pub fn relay_requests(
    logs: &[Log],
    wormhole: Address,
    core_relayer: Address,
) -> Vec<RelayRequest> {
    logs.iter()
        .filter(|log| log.address == wormhole)
        .filter_map(|log| LogMessagePublishedFilter::decode_log(&log.clone().into()).ok())
        .enumerate()
        .filter(|(_, message)| message.sender == core_relayer)
        .filter_map(|(index, message)| match u8::try_from(index) {
            Ok(delivery_index) => Some(RelayRequest {
                sequence: message.sequence,
                nonce: message.nonce,
                delivery_index,
            }),
            // The relayer can't address a delivery index past u8::MAX.
            Err(_) => {
                warn!(
                    index,
                    sequence = message.sequence,
                    "skipping unaddressable relay request"
                );
                None
            }
        })
        .collect()
}

/// Looks up the delivery status of every relay request published by a source
/// transaction. An unknown transaction has no requests.
pub async fn delivery_status<M: Middleware + 'static>(
    source: Arc<M>,
    source_chain: &ChainInfo,
    target: Arc<M>,
    target_chain: &ChainInfo,
    tx_hash: H256,
    lookback_blocks: u64,
) -> Result<Vec<DeliveryInfo>> {
    let receipt = match source.get_transaction_receipt(tx_hash).await? {
        Some(receipt) => receipt,
        None => {
            debug!(?tx_hash, "no receipt for source transaction");
            return Ok(vec![]);
        }
    };
    let requests = relay_requests(
        &receipt.logs,
        source_chain.wormhole_address,
        source_chain.core_relayer_address,
    );
    if requests.is_empty() {
        return Ok(vec![]);
    }

    let latest = target.get_block_number().await?;
    let from_block = latest.saturating_sub(U64::from(lookback_blocks));
    let relayer = CoreRelayer::new(target_chain.core_relayer_address, target);
    let mut infos = Vec::with_capacity(requests.len());
    for request in requests {
        let deliveries = relayer
            .delivery_filter()
            .topic2(H256::from_low_u64_be(source_chain.chain_id as u64))
            .topic3(H256::from_low_u64_be(request.sequence))
            .from_block(from_block)
            .query_with_meta()
            .await?;
        debug!(
            sequence = request.sequence,
            count = deliveries.len(),
            "queried deliveries"
        );

        // A redelivery emits another event, so the latest one is current.
        let (status, target_tx_hash) = match deliveries.last() {
            Some((delivery, meta)) => (
                DeliveryStatus::from(delivery.status),
                Some(meta.transaction_hash),
            ),
            None => (DeliveryStatus::Pending, None),
        };
        infos.push(DeliveryInfo {
            request,
            status,
            target_tx_hash,
        });
    }

    Ok(infos)
}

/// Asks the source chain's relayer to redeliver a request, paying `new_fee`
/// through the default relay provider.
pub async fn resend<M: Middleware + 'static>(
    client: Arc<M>,
    source_chain: &ChainInfo,
    request: RedeliveryRequest,
) -> Result<H256> {
    let relayer = CoreRelayer::new(source_chain.core_relayer_address, client);
    let relay_provider = relayer.get_default_relay_provider().call().await?;
    let relay_parameters = relayer.get_default_relay_params().call().await?;
    let call = resend_call(&relayer, request, relay_provider, relay_parameters);
    let pending = call.send().await?;
    confirm(pending, "redelivery").await
}

/// The relayer's `resend` call for a redelivery request, with the new fee
/// attached as value.
pub fn resend_call<M: Middleware>(
    relayer: &CoreRelayer<M>,
    request: RedeliveryRequest,
    relay_provider: Address,
    relay_parameters: Bytes,
) -> ContractCall<M, u64> {
    let value = request.new_fee;
    relayer
        .resend(request.into_resend(relay_parameters), relay_provider)
        .value(value)
}
