/// This module deploys Hub and Spoke contracts from their build artifacts.
use std::sync::Arc;

use ethers::{contract::ContractFactory, providers::Middleware, types::Address};
use eyre::{Result, WrapErr};
use tracing::info;
use xchat_addresses::{ChainInfo, Deployment, RunOutput};
use xchat_wrappers::artifacts::ContractArtifact;

use crate::{
    backend::HubSpokeBackend, constants::DEPLOY_HUB_AND_SPOKES, env::Environment, error::Error,
};

/// Deploys a Hub wired to the chain's Wormhole and relayer contracts.
pub async fn deploy_hub<M: Middleware + 'static>(
    client: Arc<M>,
    chain: &ChainInfo,
    artifact: &ContractArtifact,
) -> Result<Deployment> {
    // Deploy the hub.
    let factory = ContractFactory::new(artifact.abi.clone(), artifact.bytecode.clone(), client);
    let (hub, receipt) = factory
        .deploy((chain.wormhole_address, chain.core_relayer_address))?
        .send_with_receipt()
        .await
        .wrap_err_with(|| format!("couldn't deploy hub on chain {}", chain.chain_id))?;
    info!(
        chain_id = chain.chain_id,
        address = ?hub.address(),
        tx_hash = ?receipt.transaction_hash,
        "deployed hub"
    );

    Ok(Deployment {
        chain_id: chain.chain_id,
        address: hub.address(),
    })
}

/// The Spoke constructor's arguments. The hub is addressed by its Wormhole
/// chain id and its address left-padded to 32 bytes.
pub fn spoke_constructor_args(
    chain: &ChainInfo,
    hub: &Deployment,
) -> (Address, Address, [u8; 32], u16) {
    (
        chain.wormhole_address,
        chain.core_relayer_address,
        hub.universal_address().0,
        hub.chain_id,
    )
}

/// Deploys a Spoke that sends its messages to the given hub.
pub async fn deploy_spoke<M: Middleware + 'static>(
    client: Arc<M>,
    chain: &ChainInfo,
    hub: &Deployment,
    artifact: &ContractArtifact,
) -> Result<Deployment> {
    // Deploy the spoke.
    let factory = ContractFactory::new(artifact.abi.clone(), artifact.bytecode.clone(), client);
    let (spoke, receipt) = factory
        .deploy(spoke_constructor_args(chain, hub))?
        .send_with_receipt()
        .await
        .wrap_err_with(|| format!("couldn't deploy spoke on chain {}", chain.chain_id))?;
    info!(
        chain_id = chain.chain_id,
        hub_chain_id = hub.chain_id,
        address = ?spoke.address(),
        tx_hash = ?receipt.transaction_hash,
        "deployed spoke"
    );

    Ok(Deployment {
        chain_id: chain.chain_id,
        address: spoke.address(),
    })
}

/// Deploys a hub on the first configured chain and a spoke on every
/// configured chain, then registers each spoke with the hub. The result is
/// written to the `deployHubAndSpokes` output files and left out of the
/// contracts file; environments read it by setting `useLastRun`.
pub async fn deploy_hub_and_spokes<B: HubSpokeBackend>(
    env: &Environment,
    backend: &B,
) -> crate::Result<RunOutput> {
    let chains = env.load_chains()?;
    let hub_chain = chains
        .first()
        .ok_or_else(|| Error::configuration("no chains are configured"))?;

    // Deploy the hub.
    let hub = backend.deploy_hub(hub_chain).await.map_err(Error::chain)?;

    // Deploy and register the spokes.
    let mut spokes = Vec::with_capacity(chains.len());
    for chain in chains.iter() {
        let spoke = backend
            .deploy_spoke(chain, &hub)
            .await
            .map_err(Error::chain)?;
        let tx_hash = backend
            .register_spoke(&hub, &spoke)
            .await
            .map_err(Error::chain)?;
        backend
            .wait_for_transaction(hub.chain_id, tx_hash)
            .await
            .map_err(Error::chain)?;
        info!(chain_id = spoke.chain_id, ?tx_hash, "registered spoke");
        spokes.push(spoke);
    }

    let output = RunOutput::HubAndSpokes { hub, spokes };
    let files = env.write_output_files(&output, DEPLOY_HUB_AND_SPOKES)?;
    info!(path = ?files.last_run, "wrote hub and spokes deployment");
    Ok(output)
}
