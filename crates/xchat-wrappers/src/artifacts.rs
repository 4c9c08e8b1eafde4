/// This module loads contract ABIs and creation bytecode from build artifacts.
/// Foundry writes these to `out/<Name>.sol/<Name>.json`; Hardhat-style
/// artifacts with a flat `bytecode` string are accepted as well.
use std::path::{Path, PathBuf};

use ethers::{abi::Abi, types::Bytes};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;

pub const HUB: &str = "Hub";
pub const SPOKE: &str = "Spoke";

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Foundry { object: Bytes },
    Flat(Bytes),
}

#[derive(Deserialize)]
struct RawArtifact {
    abi: Abi,
    bytecode: RawBytecode,
}

#[derive(Clone, Debug)]
pub struct ContractArtifact {
    pub name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// The location of a contract's artifact within an artifacts directory.
    pub fn path(artifacts_dir: &Path, name: &str) -> PathBuf {
        artifacts_dir
            .join(format!("{}.sol", name))
            .join(format!("{}.json", name))
    }

    pub fn load(artifacts_dir: &Path, name: &str) -> Result<Self> {
        let path = Self::path(artifacts_dir, name);
        let raw = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("couldn't read artifact for {} at {:?}", name, path))?;
        Self::parse(name, &raw)
    }

    pub fn parse(name: &str, raw: &str) -> Result<Self> {
        let artifact = serde_json::from_str::<RawArtifact>(raw)
            .wrap_err_with(|| format!("malformed artifact for {}", name))?;
        let bytecode = match artifact.bytecode {
            RawBytecode::Foundry { object } => object,
            RawBytecode::Flat(bytecode) => bytecode,
        };
        if bytecode.is_empty() {
            return Err(eyre!("artifact for {} has no creation bytecode", name));
        }
        Ok(Self {
            name: name.to_string(),
            abi: artifact.abi,
            bytecode,
        })
    }
}
