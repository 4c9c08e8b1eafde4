/// This module resolves the active environment and loads everything that
/// belongs to it: the chain list, the contract registry, the last bulk
/// deployment's output, and the wallet used to sign transactions.
///
/// The files for an environment `<env>` live relative to the working root:
///
/// - `<env>/chains.json`
/// - `config/<env>/contracts.json`
/// - `output/<env>/<process>/lastrun.json`
use std::{
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use ethers::signers::LocalWallet;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info};
use xchat_addresses::{ChainInfo, ContractsRegistry, Deployment, RunOutput};

use crate::{
    chain::{Chain, ChainClient, ChainProvider},
    constants::{
        DEFAULT_ARTIFACTS_DIR, DEFAULT_ENV, DEFAULT_STATUS_LOOKBACK_BLOCKS, DEPLOY_HUB_AND_SPOKES,
        LAST_RUN_FILE,
    },
    error::{Error, Result},
};

/// Settings read from the process environment (after dotenv files have been
/// loaded). Field names map to upper-case variables, e.g. `WALLET_KEY`.
#[derive(Clone, Debug, Deserialize)]
struct Settings {
    env: Option<String>,
    wallet_key: Option<String>,
    artifacts_dir: Option<PathBuf>,
    status_lookback_blocks: Option<u64>,
}

impl Settings {
    fn from_env() -> Result<Self> {
        envy::from_env::<Settings>().map_err(|e| Error::configuration(e.to_string()))
    }
}

/// Caller overrides for `Environment::init`.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// `Some(true)` always reads the last run, `Some(false)` always reads the
    /// registry, `None` defers to the registry's `useLastRun` flag.
    pub last_run_override: Option<bool>,
    /// The directory that environment files are resolved against.
    pub root: Option<PathBuf>,
}

/// The active environment. This is constructed once per process and passed by
/// reference to everything that needs configuration.
#[derive(Clone)]
pub struct Environment {
    name: String,
    root: PathBuf,
    last_run_override: Option<bool>,
    wallet_key: Option<String>,
    artifacts_dir: PathBuf,
    status_lookback_blocks: u64,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("last_run_override", &self.last_run_override)
            .field("wallet_key", &self.wallet_key.as_ref().map(|_| "<redacted>"))
            .field("artifacts_dir", &self.artifacts_dir)
            .field("status_lookback_blocks", &self.status_lookback_blocks)
            .finish()
    }
}

impl Environment {
    /// Resolves the environment from `ENV`, loads its dotenv file and reads
    /// the remaining settings from the process environment.
    pub fn init(overrides: Overrides) -> Result<Self> {
        let name = match Settings::from_env()?.env.filter(|e| !e.is_empty()) {
            Some(name) => name,
            None => {
                info!("No environment was specified, using default environment files");
                DEFAULT_ENV.to_string()
            }
        };
        let root = overrides.root.unwrap_or_else(|| PathBuf::from("."));

        // The default environment reads `.env`, every other one `.env.<env>`.
        let dotenv_path = if name == DEFAULT_ENV {
            root.join(".env")
        } else {
            root.join(format!(".env.{}", name))
        };
        match dotenvy::from_path(&dotenv_path) {
            Ok(()) => debug!(path = ?dotenv_path, "loaded dotenv file"),
            Err(e) => debug!(path = ?dotenv_path, error = %e, "no dotenv file loaded"),
        }

        let settings = Settings::from_env()?;
        let mut env = Self::new(name, root);
        env.last_run_override = overrides.last_run_override;
        env.wallet_key = settings.wallet_key.filter(|k| !k.is_empty());
        if let Some(dir) = settings.artifacts_dir {
            env.artifacts_dir = dir;
        }
        if let Some(blocks) = settings.status_lookback_blocks {
            env.status_lookback_blocks = blocks;
        }
        Ok(env)
    }

    /// An environment with default settings that doesn't read the process
    /// environment.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            last_run_override: None,
            wallet_key: None,
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            status_lookback_blocks: DEFAULT_STATUS_LOOKBACK_BLOCKS,
        }
    }

    pub fn with_wallet_key(mut self, key: impl Into<String>) -> Self {
        self.wallet_key = Some(key.into());
        self
    }

    pub fn with_last_run_override(mut self, last_run: bool) -> Self {
        self.last_run_override = Some(last_run);
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn status_lookback_blocks(&self) -> u64 {
        self.status_lookback_blocks
    }

    /// Paths ///

    pub fn chains_path(&self) -> PathBuf {
        self.root.join(&self.name).join("chains.json")
    }

    pub fn contracts_path(&self) -> PathBuf {
        self.root.join("config").join(&self.name).join("contracts.json")
    }

    pub fn output_dir(&self, process_name: &str) -> PathBuf {
        self.root.join("output").join(&self.name).join(process_name)
    }

    pub fn last_run_path(&self, process_name: &str) -> PathBuf {
        self.output_dir(process_name).join(LAST_RUN_FILE)
    }

    /// Chains ///

    pub fn load_chains(&self) -> Result<ChainRegistry> {
        #[derive(Deserialize)]
        struct ChainsFile {
            chains: Option<Vec<ChainInfo>>,
        }

        let path = self.chains_path();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::configuration(format!("couldn't read chain file {:?}: {}", path, e))
        })?;
        let file = serde_json::from_str::<ChainsFile>(&raw).map_err(|e| {
            Error::configuration(format!("couldn't parse chain file {:?}: {}", path, e))
        })?;
        let chains = file.chains.ok_or_else(|| {
            Error::configuration(format!("chain file {:?} has no `chains` list", path))
        })?;
        debug!(path = ?path, count = chains.len(), "loaded chains");
        Ok(ChainRegistry::new(chains))
    }

    /// Contracts ///

    pub fn load_registry(&self) -> Result<ContractsRegistry> {
        let path = self.contracts_path();
        read_json(&path, "contracts file")
    }

    fn load_last_run(&self) -> Result<RunOutput> {
        let path = self.last_run_path(DEPLOY_HUB_AND_SPOKES);
        read_json(&path, "last run file")
    }

    fn use_last_run(&self, registry: &ContractsRegistry) -> bool {
        self.last_run_override.unwrap_or(registry.use_last_run)
    }

    /// The current hub, from the registry or the last bulk deployment.
    pub fn load_hub(&self) -> Result<Deployment> {
        let registry = self.load_registry()?;
        if self.use_last_run(&registry) {
            self.load_last_run()?
                .hub()
                .copied()
                .ok_or_else(|| Error::not_found("the last run didn't deploy a hub"))
        } else {
            registry
                .hub
                .ok_or_else(|| Error::not_found("no hub in the contracts file"))
        }
    }

    /// The current spokes, from the registry or the last bulk deployment.
    pub fn load_spokes(&self) -> Result<Vec<Deployment>> {
        let registry = self.load_registry()?;
        if self.use_last_run(&registry) {
            self.load_last_run()?
                .spokes()
                .map(|spokes| spokes.to_vec())
                .ok_or_else(|| Error::not_found("the last run didn't deploy spokes"))
        } else {
            Ok(registry.spokes)
        }
    }

    pub fn spoke(&self, chain_id: u16) -> Result<Deployment> {
        self.load_spokes()?
            .into_iter()
            .find(|s| s.chain_id == chain_id)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "failed to find a spoke contract address on chain {}",
                    chain_id
                ))
            })
    }

    /// Clients ///

    pub fn private_key(&self) -> Result<LocalWallet> {
        let key = self
            .wallet_key
            .as_deref()
            .ok_or_else(|| Error::configuration("WALLET_KEY is not set"))?;
        key.parse::<LocalWallet>()
            .map_err(|e| Error::configuration(format!("WALLET_KEY is invalid: {}", e)))
    }

    /// A read-only provider for a configured chain.
    pub fn provider(&self, chain: &ChainInfo) -> Result<ChainProvider> {
        let chain = self.load_chains()?.get(chain.chain_id)?.clone();
        Ok(connect(&chain)?.provider())
    }

    /// A signing client for a configured chain.
    pub fn signer(&self, chain_id: u16) -> Result<Arc<ChainClient>> {
        let chain = self.load_chains()?.get(chain_id)?.clone();
        let wallet = self.private_key()?;
        Ok(connect(&chain)?.client(wallet))
    }
}

fn connect(chain: &ChainInfo) -> Result<Chain> {
    Chain::connect(chain).map_err(|e| Error::configuration(format!("{:#}", e)))
}

/// Reads a JSON file, reporting a missing file as not found and anything else
/// as a configuration problem.
fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::not_found(format!("failed to find {} {:?}", what, path)))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&raw)
        .map_err(|e| Error::configuration(format!("couldn't parse {} {:?}: {}", what, path, e)))
}

/// The configured chains in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainRegistry {
    chains: Vec<ChainInfo>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainInfo>) -> Self {
        Self { chains }
    }

    /// Looks up a chain by Wormhole chain id. Chain ids aren't checked for
    /// uniqueness; the first match in file order wins.
    pub fn get(&self, chain_id: u16) -> Result<&ChainInfo> {
        self.chains
            .iter()
            .find(|c| c.chain_id == chain_id)
            .ok_or_else(|| Error::not_found(format!("invalid chain {}", chain_id)))
    }

    pub fn first(&self) -> Option<&ChainInfo> {
        self.chains.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainInfo> {
        self.chains.iter()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
