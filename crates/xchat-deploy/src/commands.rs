/// The commands of the `xchat` binary. Parsing is done by clap; `run`
/// executes a parsed command against a backend and writes the user-facing
/// output to a writer so that it can be inspected in tests.
use std::io::Write;

use clap::{Parser, Subcommand};
use ethers::{
    types::{Address, Bytes, H256, U256},
    utils::to_checksum,
};
use tracing::{debug, info};
use xchat_addresses::{Deployment, RunOutput};

use crate::{
    backend::HubSpokeBackend,
    constants::{DEFAULT_MESSAGE_VALUE, DEPLOY_INDIVIDUAL_CONTRACT},
    env::Environment,
    error::{Error, Result},
    relayer::RedeliveryRequest,
};

#[derive(Debug, Parser)]
#[command(
    name = "xchat",
    about = "Welcome to the 'Test xChat Script'!",
    disable_version_flag = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Deploys a hub or a spoke.
    Deploy {
        #[command(subcommand)]
        target: DeployTarget,
    },
    /// Lists all the chains, hub, and spokes.
    Info,
    /// Runs an action against the spoke on a chain.
    Spoke {
        chain_id: u16,
        #[command(subcommand)]
        action: SpokeAction,
    },
    /// Inspects the hub.
    Hub {
        #[command(subcommand)]
        action: HubAction,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum DeployTarget {
    /// Deploys the hub on a chain.
    Hub { chain_id: u16 },
    /// Deploys a spoke on a chain that points at the current hub.
    Spoke { chain_id: u16 },
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
#[command(rename_all = "camelCase")]
pub enum SpokeAction {
    /// Prints the spoke's messages, or only the last `count` of them.
    GetMessages { count: Option<usize> },
    /// Sends a message from the spoke. The value defaults to 0.2 ether.
    SendMessage {
        text: String,
        #[arg(value_parser = parse_wei)]
        value: Option<U256>,
    },
    /// Registers the spoke on the hub.
    Register,
    /// Prints the delivery status of a message sent from the spoke.
    Status {
        #[arg(value_parser = parse_tx_hash)]
        tx_hash: H256,
    },
    /// Requests redelivery of a message sent from the spoke.
    Resend {
        #[arg(value_parser = parse_tx_hash)]
        tx_hash: H256,
        #[arg(value_parser = parse_wei)]
        value: Option<U256>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum HubAction {
    /// Compares the hub's registered emitters with the registered spokes.
    State,
}

/// Parses an amount of wei written in decimal.
fn parse_wei(s: &str) -> std::result::Result<U256, String> {
    U256::from_dec_str(s).map_err(|e| format!("invalid amount of wei {:?}: {}", s, e))
}

fn parse_tx_hash(s: &str) -> std::result::Result<H256, String> {
    s.parse::<H256>()
        .map_err(|e| format!("invalid transaction hash {:?}: {}", s, e))
}

fn checksum(address: Address) -> String {
    to_checksum(&address, None)
}

pub async fn run<B: HubSpokeBackend, W: Write>(
    command: Command,
    env: &Environment,
    backend: &B,
    out: &mut W,
) -> Result<()> {
    debug!(?command, env = env.name(), "running command");
    match command {
        Command::Deploy { target } => deploy(target, env, backend, out).await,
        Command::Info => show_info(env, out),
        Command::Spoke { chain_id, action } => spoke(chain_id, action, env, backend, out).await,
        Command::Hub {
            action: HubAction::State,
        } => hub_state(env, backend, out).await,
    }
}

async fn deploy<B: HubSpokeBackend, W: Write>(
    target: DeployTarget,
    env: &Environment,
    backend: &B,
    out: &mut W,
) -> Result<()> {
    let chains = env.load_chains()?;
    let output = match target {
        DeployTarget::Hub { chain_id } => {
            let chain = chains.get(chain_id)?;
            writeln!(out, "Deploying Hub to chain {}...", chain.chain_id)?;
            let hub = backend.deploy_hub(chain).await.map_err(Error::chain)?;
            writeln!(
                out,
                "Hub deployed to {} (chain {})",
                checksum(hub.address),
                hub.chain_id
            )?;
            RunOutput::Hub { hub }
        }
        DeployTarget::Spoke { chain_id } => {
            let chain = chains.get(chain_id)?;
            let hub = env.load_hub()?;
            writeln!(out, "Deploying Spoke to chain {}...", chain.chain_id)?;
            let spoke = backend
                .deploy_spoke(chain, &hub)
                .await
                .map_err(Error::chain)?;
            writeln!(
                out,
                "Spoke deployed to {} (chain {})",
                checksum(spoke.address),
                spoke.chain_id
            )?;
            RunOutput::Spoke { spoke }
        }
    };

    env.write_output_files(&output, DEPLOY_INDIVIDUAL_CONTRACT)?;
    env.write_to_contracts(&output)?;
    Ok(())
}

fn show_info<W: Write>(env: &Environment, out: &mut W) -> Result<()> {
    let chains = env.load_chains()?;
    writeln!(out, "Current chains: ")?;
    for chain in chains.iter() {
        writeln!(out, "({}): {}", chain.chain_id, chain.description)?;
    }

    // Info is useful before anything has been deployed, so a missing hub or
    // registry isn't an error here.
    match env.load_hub() {
        Ok(hub) => writeln!(out, "Current Hub: {}", hub.chain_id)?,
        Err(Error::NotFound(msg)) => {
            debug!(%msg, "no current hub");
            writeln!(out, "Current Hub: none")?
        }
        Err(e) => return Err(e),
    }
    let spokes = match env.load_spokes() {
        Ok(spokes) => spokes,
        Err(Error::NotFound(msg)) => {
            debug!(%msg, "no current spokes");
            vec![]
        }
        Err(e) => return Err(e),
    };
    let spokes = spokes
        .iter()
        .map(|s| s.chain_id.to_string())
        .collect::<Vec<_>>();
    writeln!(out, "Current Spokes: {}", spokes.join(", "))?;
    Ok(())
}

async fn spoke<B: HubSpokeBackend, W: Write>(
    chain_id: u16,
    action: SpokeAction,
    env: &Environment,
    backend: &B,
    out: &mut W,
) -> Result<()> {
    let chains = env.load_chains()?;
    let chain = chains.get(chain_id)?;
    let spoke = env.spoke(chain.chain_id)?;

    match action {
        SpokeAction::GetMessages { count } => {
            let messages = backend.get_messages(&spoke).await.map_err(Error::chain)?;
            // A count of zero prints everything, as does no count.
            let skip = match count {
                Some(count) if count > 0 => messages.len().saturating_sub(count),
                _ => 0,
            };
            for message in messages.iter().skip(skip) {
                writeln!(
                    out,
                    "Sender {}: {}",
                    checksum(message.sender),
                    String::from_utf8_lossy(&message.message)
                )?;
            }
        }
        SpokeAction::SendMessage { text, value } => {
            let value = value.unwrap_or(*DEFAULT_MESSAGE_VALUE);
            let tx_hash = backend
                .send_message(&spoke, Bytes::from(text.into_bytes()), value)
                .await
                .map_err(Error::chain)?;
            writeln!(out, "Sent message! ({:?})", tx_hash)?;
            backend
                .wait_for_transaction(spoke.chain_id, tx_hash)
                .await
                .map_err(Error::chain)?;
            writeln!(out, "Message confirmed!")?;
        }
        SpokeAction::Register => {
            let hub = env.load_hub()?;
            let tx_hash = backend
                .register_spoke(&hub, &spoke)
                .await
                .map_err(Error::chain)?;
            writeln!(out, "Sent registration message! ({:?})", tx_hash)?;
            backend
                .wait_for_transaction(hub.chain_id, tx_hash)
                .await
                .map_err(Error::chain)?;
            writeln!(out, "Message confirmed!")?;
        }
        SpokeAction::Status { tx_hash } => {
            let hub = env.load_hub()?;
            let target = chains.get(hub.chain_id)?;
            let deliveries = backend
                .delivery_status(chain, target, tx_hash)
                .await
                .map_err(Error::chain)?;
            if deliveries.is_empty() {
                writeln!(out, "not found")?;
            }
            for delivery in deliveries {
                write!(
                    out,
                    "Delivery {} (sequence {}): {}",
                    delivery.request.delivery_index, delivery.request.sequence, delivery.status
                )?;
                match delivery.target_tx_hash {
                    Some(hash) => writeln!(out, " in {:?}", hash)?,
                    None => writeln!(out)?,
                }
            }
        }
        SpokeAction::Resend { tx_hash, value } => {
            let hub = env.load_hub()?;
            let target = chains.get(hub.chain_id)?;
            let deliveries = backend
                .delivery_status(chain, target, tx_hash)
                .await
                .map_err(Error::chain)?;
            let request = deliveries.first().map(|d| d.request).ok_or_else(|| {
                Error::not_found(format!("no relay request in transaction {:?}", tx_hash))
            })?;
            let value = value.unwrap_or(*DEFAULT_MESSAGE_VALUE);
            let redelivery = RedeliveryRequest::new(chain, target, tx_hash, &request, value);
            let resend_hash = backend
                .resend(chain, redelivery)
                .await
                .map_err(Error::chain)?;
            info!(?resend_hash, "redelivery requested");
            writeln!(out, "Redelivery requested! ({:?})", resend_hash)?;
        }
    }

    Ok(())
}

async fn hub_state<B: HubSpokeBackend, W: Write>(
    env: &Environment,
    backend: &B,
    out: &mut W,
) -> Result<()> {
    let hub = env.load_hub()?;
    let spokes = env.load_spokes()?;
    writeln!(
        out,
        "Hub {} (chain {})",
        checksum(hub.address),
        hub.chain_id
    )?;
    for spoke in spokes {
        let emitter = backend
            .registered_emitter(&hub, spoke.chain_id)
            .await
            .map_err(Error::chain)?;
        writeln!(out, "{}", emitter_state(&spoke, emitter))?;
    }
    Ok(())
}

fn emitter_state(spoke: &Deployment, emitter: H256) -> String {
    if emitter.is_zero() {
        format!("({}): not registered", spoke.chain_id)
    } else if emitter == spoke.universal_address() {
        format!("({}): registered {}", spoke.chain_id, checksum(spoke.address))
    } else {
        format!(
            "({}): registered {:?}, expected {}",
            spoke.chain_id,
            emitter,
            checksum(spoke.address)
        )
    }
}
