use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// A chain that the hub and spokes can be deployed to. The `chain_id` is the
/// Wormhole chain id, which is unrelated to the EVM network id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub evm_network_id: u64,
    pub chain_id: u16,
    pub rpc: String,
    pub wormhole_address: Address,
    pub core_relayer_address: Address,
    pub description: String,
}

/// A contract deployed to a Wormhole chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub chain_id: u16,
    pub address: Address,
}

impl Deployment {
    /// The deployment's address left-padded to 32 bytes, which is how
    /// Wormhole addresses contracts across chains.
    pub fn universal_address(&self) -> H256 {
        to_universal_address(self.address)
    }
}

pub fn to_universal_address(address: Address) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_bytes());
    H256::from(bytes)
}

/// The output of a single deployment run. This serializes without a tag, so
/// the JSON is exactly `{hub}`, `{spoke}` or `{hub, spokes}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutput {
    // NOTE: This variant needs to come first. Untagged deserialization picks
    // the first variant that matches and unknown fields are ignored.
    HubAndSpokes {
        hub: Deployment,
        spokes: Vec<Deployment>,
    },
    Hub {
        hub: Deployment,
    },
    Spoke {
        spoke: Deployment,
    },
}

impl RunOutput {
    pub fn hub(&self) -> Option<&Deployment> {
        match self {
            Self::HubAndSpokes { hub, .. } | Self::Hub { hub } => Some(hub),
            Self::Spoke { .. } => None,
        }
    }

    pub fn spokes(&self) -> Option<&[Deployment]> {
        match self {
            Self::HubAndSpokes { spokes, .. } => Some(spokes),
            _ => None,
        }
    }
}

/// The canonical record of which contracts are deployed where.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractsRegistry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub: Option<Deployment>,
    #[serde(default)]
    pub spokes: Vec<Deployment>,
    /// Prefer the last bulk deployment's output over this registry.
    #[serde(default)]
    pub use_last_run: bool,
    // Anything else in the file is carried through rewrites untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// What merging a run output did to the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryUpdate {
    HubSet,
    SpokeAdded,
    SpokeReplaced,
    HubAndSpokesSet,
    Unchanged,
}

impl ContractsRegistry {
    pub fn spoke(&self, chain_id: u16) -> Option<&Deployment> {
        self.spokes.iter().find(|s| s.chain_id == chain_id)
    }

    /// Merges a run output into the registry. A spoke replaces any existing
    /// spoke on the same chain and is moved to the end of the list.
    pub fn merge(&mut self, output: &RunOutput) -> RegistryUpdate {
        let before = self.clone();
        let update = match output {
            RunOutput::Hub { hub } => {
                self.hub = Some(*hub);
                RegistryUpdate::HubSet
            }
            RunOutput::Spoke { spoke } => self.upsert_spoke(*spoke),
            RunOutput::HubAndSpokes { hub, spokes } => {
                self.hub = Some(*hub);
                for spoke in spokes {
                    self.upsert_spoke(*spoke);
                }
                RegistryUpdate::HubAndSpokesSet
            }
        };
        if *self == before {
            RegistryUpdate::Unchanged
        } else {
            update
        }
    }

    fn upsert_spoke(&mut self, spoke: Deployment) -> RegistryUpdate {
        let len = self.spokes.len();
        self.spokes.retain(|s| s.chain_id != spoke.chain_id);
        let replaced = self.spokes.len() != len;
        self.spokes.push(spoke);
        if replaced {
            RegistryUpdate::SpokeReplaced
        } else {
            RegistryUpdate::SpokeAdded
        }
    }
}
