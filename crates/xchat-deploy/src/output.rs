use std::{
    fs::{create_dir_all, OpenOptions},
    io::{ErrorKind, Write},
    path::PathBuf,
};

use chrono::Utc;
use tracing::{debug, info};
use xchat_addresses::{RegistryUpdate, RunOutput};

use crate::{
    env::Environment,
    error::{Error, Result},
};

/// The files written for one run of a deployment process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFiles {
    pub last_run: PathBuf,
    pub history: PathBuf,
}

impl Environment {
    /// Writes a run's output to the process's `lastrun.json`, replacing the
    /// previous run, and to a new file named after the current unix time in
    /// milliseconds. Both files get the same bytes.
    pub fn write_output_files(
        &self,
        output: &RunOutput,
        process_name: &str,
    ) -> Result<OutputFiles> {
        let dir = self.output_dir(process_name);
        create_dir_all(&dir)?;
        let contents = serde_json::to_string_pretty(output)
            .map_err(|e| Error::configuration(format!("couldn't encode run output: {}", e)))?;

        let last_run = self.last_run_path(process_name);
        std::fs::write(&last_run, &contents)?;

        // History files are never overwritten. If two runs land on the same
        // millisecond, the later one takes the next free millisecond.
        let mut millis = Utc::now().timestamp_millis();
        let history = loop {
            let path = dir.join(format!("{}.json", millis));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(contents.as_bytes())?;
                    break path;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => millis += 1,
                Err(e) => return Err(e.into()),
            }
        };
        debug!(last_run = ?last_run, history = ?history, "wrote output files");

        Ok(OutputFiles { last_run, history })
    }

    /// Merges a run's output into the contracts registry and rewrites it. The
    /// read-modify-write isn't atomic, so concurrent runs against the same
    /// environment can drop each other's updates.
    pub fn write_to_contracts(&self, output: &RunOutput) -> Result<RegistryUpdate> {
        let mut registry = self.load_registry()?;
        let update = registry.merge(output);
        if update == RegistryUpdate::Unchanged {
            info!("contracts file already up to date");
            return Ok(update);
        }
        let contents = serde_json::to_string_pretty(&registry)
            .map_err(|e| Error::configuration(format!("couldn't encode contracts: {}", e)))?;
        std::fs::write(self.contracts_path(), contents)?;
        info!(?update, path = ?self.contracts_path(), "updated contracts file");
        Ok(update)
    }
}
