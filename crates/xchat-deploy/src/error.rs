use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration: chain files, registry files,
    /// private keys, artifacts.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A chain, spoke, hub or file that the command needs doesn't exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// An RPC call, transaction or deployment failed.
    #[error("chain interaction failed: {0}")]
    ChainInteraction(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Wraps an on-chain failure, keeping the full chain of causes. Reports
    /// that carry one of our own errors keep their kind.
    pub fn chain(report: eyre::Report) -> Self {
        match report.downcast::<Error>() {
            Ok(err) => err,
            Err(report) => Self::ChainInteraction(format!("{:#}", report)),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Io(_) => 1,
            Self::Configuration(_) => 2,
            Self::NotFound(_) => 3,
            Self::ChainInteraction(_) => 4,
        }
    }
}
