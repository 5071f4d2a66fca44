//! Harness configuration.
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::graph::Party;

/// Number of trials averaged per MSF scenario.
pub const DEFAULT_TRIALS: u32 = 3;

/// Where the harness keeps its files and how it invokes the protocol executable.
///
/// All relative paths are resolved against [`HarnessConfig::root`], which is also the working
/// directory of the executable (it reads and writes its precomputation dumps there).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Working directory of the sweep.
    pub root: PathBuf,
    /// The protocol executable.
    pub executable: PathBuf,
    /// Number of threads the executable may use (`-c`).
    pub concurrency: u32,
    /// Number of trials per MSF scenario.
    pub trials: u32,
    /// Directory of per-scenario input files.
    pub inputs_dir: PathBuf,
    /// Directory the executable writes stats files to.
    pub stats_dir: PathBuf,
    /// Directory holding TSPLIB instances (`<name>.tsp`).
    pub tsp_dir: PathBuf,
    /// Precomputation dumps removed before every triple generation run.
    pub precomp_dumps: Vec<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            executable: PathBuf::from("build/bin/msf"),
            concurrency: 8,
            trials: DEFAULT_TRIALS,
            inputs_dir: PathBuf::from("inputs"),
            stats_dir: PathBuf::from("stats"),
            tsp_dir: PathBuf::from("tsp"),
            precomp_dumps: vec![
                PathBuf::from("pre_comp_client.dump"),
                PathBuf::from("pre_comp_server.dump"),
            ],
        }
    }
}

/// Errors raised while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path:?}")]
    Read {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The file is not valid JSON for a [`HarnessConfig`].
    #[error("invalid config {path:?}")]
    Parse {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
    /// A value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

impl HarnessConfig {
    /// Loads a JSON config; fields missing from the file keep their defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the executable or the aggregation cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be positive".into()));
        }
        if self.trials == 0 {
            return Err(ConfigError::Invalid("trials must be positive".into()));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// The resolved inputs directory.
    pub fn inputs_path(&self) -> PathBuf {
        self.resolve(&self.inputs_dir)
    }

    /// The resolved stats directory.
    pub fn stats_path(&self) -> PathBuf {
        self.resolve(&self.stats_dir)
    }

    /// The resolved TSPLIB directory.
    pub fn tsp_path(&self) -> PathBuf {
        self.resolve(&self.tsp_dir)
    }

    /// The resolved protocol executable.
    pub fn executable_path(&self) -> PathBuf {
        self.resolve(&self.executable)
    }

    /// The run ledger of `party`, kept next to the stats files.
    pub fn ledger_path(&self, party: Party) -> PathBuf {
        self.stats_path()
            .join(format!("ledger-p{}.json", party.index()))
    }
}
