//! Persistent record of which scenarios a party has run.
//!
//! The ledger is a JSON map from canonical scenario name to [`LedgerEntry`]. Every update
//! rewrites the whole file atomically, so an interrupted sweep leaves either the previous or the
//! new ledger on disk, never a mix of both.
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{graph::Party, runner::Outcome, utils::write_atomic};

/// Number of stderr lines kept per ledger entry.
const STDERR_TAIL_LINES: usize = 20;

/// Lifecycle of a scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Part of a sweep but not started yet.
    Pending,
    /// The executable was started; a crash leaves the entry in this state.
    Running,
    /// A complete stats file exists.
    Done,
    /// The last run did not produce a valid stats file.
    Failed,
}

/// What the ledger remembers about the last run of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Exit code of the executable, `None` if it was killed by a signal or never started.
    pub exit_code: Option<i32>,
    /// Runtime in milliseconds.
    pub elapsed_ms: u64,
    /// The last lines of stderr, or the reason the run was rejected.
    pub message: String,
}

impl From<&Outcome> for RunSummary {
    fn from(outcome: &Outcome) -> Self {
        Self {
            exit_code: outcome.exit_code,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            message: outcome.stderr_tail(STDERR_TAIL_LINES),
        }
    }
}

/// State and last run of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Current state.
    pub state: RunState,
    /// The last finished run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    party: Party,
    entries: BTreeMap<String, LedgerEntry>,
}

/// Errors raised while loading or persisting a ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger file could not be read or written.
    #[error("ledger i/o error for {path:?}")]
    Io {
        /// The ledger file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The ledger file exists but is not a valid ledger.
    #[error("ledger {path:?} is corrupt")]
    Corrupt {
        /// The ledger file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
    /// The ledger file belongs to the other party.
    #[error("ledger {path:?} belongs to party {found}, expected party {expected}")]
    WrongParty {
        /// The ledger file.
        path: PathBuf,
        /// The party this process runs as.
        expected: Party,
        /// The party recorded in the file.
        found: Party,
    },
}

/// The run ledger of one party.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    party: Party,
    entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    /// Loads the ledger at `path`, or starts an empty one if the file does not exist.
    pub fn open(path: &Path, party: Party) -> Result<Self, LedgerError> {
        let entries = match fs::read_to_string(path) {
            Ok(contents) => {
                let file: LedgerFile =
                    serde_json::from_str(&contents).map_err(|source| LedgerError::Corrupt {
                        path: path.to_path_buf(),
                        source,
                    })?;
                if file.party != party {
                    return Err(LedgerError::WrongParty {
                        path: path.to_path_buf(),
                        expected: party,
                        found: file.party,
                    });
                }
                file.entries
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            party,
            entries,
        })
    }

    /// The file backing this ledger.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The entry of `name`, if the scenario is known.
    pub fn entry(&self, name: &str) -> Option<&LedgerEntry> {
        self.entries.get(name)
    }

    /// The state of `name`, if the scenario is known.
    pub fn state(&self, name: &str) -> Option<RunState> {
        self.entries.get(name).map(|e| e.state)
    }

    /// All entries, ordered by scenario name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &LedgerEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Registers all unknown `names` as [`RunState::Pending`] and persists the ledger once.
    pub fn register<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), LedgerError> {
        let mut changed = false;
        for name in names {
            if !self.entries.contains_key(name) {
                self.entries.insert(
                    name.to_string(),
                    LedgerEntry {
                        state: RunState::Pending,
                        last_run: None,
                    },
                );
                changed = true;
            }
        }
        if changed {
            self.persist()?;
        }
        Ok(())
    }

    /// Moves `name` to `state`, replacing the last run if `last_run` is given, and persists.
    pub fn transition(
        &mut self,
        name: &str,
        state: RunState,
        last_run: Option<RunSummary>,
    ) -> Result<(), LedgerError> {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert(LedgerEntry {
                state,
                last_run: None,
            });
        debug!(scenario = name, from = ?entry.state, to = ?state, "ledger transition");
        entry.state = state;
        if last_run.is_some() {
            entry.last_run = last_run;
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let file = LedgerFile {
            party: self.party,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| LedgerError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &json).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
