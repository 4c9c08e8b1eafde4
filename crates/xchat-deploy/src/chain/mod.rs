use std::{sync::Arc, time::Duration};

use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, JsonRpcClient, PendingTransaction, Provider},
    signers::{LocalWallet, Signer},
    types::{H256, U64},
};
use eyre::{eyre, Result, WrapErr};
use tracing::info;
use xchat_addresses::ChainInfo;

/// How often pending transactions are polled for receipts.
const POLL_INTERVAL: Duration = Duration::from_millis(1_000);

pub type ChainProvider = Provider<Http>;

/// A client that signs transactions with the deployer's wallet.
pub type ChainClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// An abstraction over one configured chain that provides convenience methods
/// for constructing read-only providers and signing clients bound to the
/// chain's RPC URL.
#[derive(Clone, Debug)]
pub struct Chain {
    info: ChainInfo,
    provider: ChainProvider,
}

impl Chain {
    /// Builds a provider for the chain's RPC URL. This doesn't contact the
    /// node, so it can't fail on connectivity, only on a malformed URL.
    pub fn connect(info: &ChainInfo) -> Result<Self> {
        let provider = Provider::<Http>::try_from(info.rpc.as_str())
            .wrap_err_with(|| format!("invalid rpc url for chain {}", info.chain_id))?
            .interval(POLL_INTERVAL);
        Ok(Self {
            info: info.clone(),
            provider,
        })
    }

    pub fn info(&self) -> &ChainInfo {
        &self.info
    }

    /// A provider that can access the chain.
    pub fn provider(&self) -> ChainProvider {
        self.provider.clone()
    }

    /// A client that signs for the given wallet on this chain. The wallet's
    /// chain id is set to the chain's EVM network id so that transactions are
    /// replay protected without asking the node.
    pub fn client(&self, signer: LocalWallet) -> Arc<ChainClient> {
        let signer = signer.with_chain_id(self.info.evm_network_id);
        Arc::new(SignerMiddleware::new(self.provider(), signer))
    }
}

/// Waits for a submitted transaction to be mined and checks that it didn't
/// revert. Returns the transaction hash.
pub async fn confirm<P: JsonRpcClient>(
    pending: PendingTransaction<'_, P>,
    what: &str,
) -> Result<H256> {
    let tx_hash = pending.tx_hash();
    info!(?tx_hash, "waiting for {} transaction", what);
    let receipt = pending
        .await?
        .ok_or_else(|| eyre!("{} transaction {:?} was dropped", what, tx_hash))?;
    if receipt.status == Some(U64::zero()) {
        return Err(eyre!("{} transaction {:?} reverted", what, tx_hash));
    }
    Ok(tx_hash)
}
