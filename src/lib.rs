//! A benchmark harness for a two-party secure minimum spanning forest (MSF) protocol.
//!
//! The protocol itself is an external executable. This crate prepares its inputs, runs it for one
//! party across large parameter sweeps and turns the stats files it writes into comparable
//! numbers.
//!
//! ## Main Components
//!
//! * [`graph`]: Deterministic random graph instances, split between the two parties.
//! * [`orchestrator`]: Runs [`scenario::Scenario`]s one after another, skipping completed ones
//!   and recording progress in a [`ledger::Ledger`].
//! * [`stats`]: Parsers for the stats files of the executable and their aggregation over trials.
//! * [`report`]: Lookup of finished stats by scenario parameters.
//!
//! ## Reproducibility
//!
//! Every scenario has a canonical name such as `bounded-1000-3000-0.5-2`. The name identifies the
//! input directory, the stats file and the ledger entry, and it is the key from which the random
//! graph is derived (see [`seed`]). Both parties therefore generate the same instance
//! independently and each keeps its own half.
//!
//! ## Example
//!
//! ```no_run
//! use msf_harness::{
//!     config::HarnessConfig,
//!     graph::Party,
//!     orchestrator::Orchestrator,
//!     runner::ProcessExecutor,
//!     scenario::msf_sweep,
//! };
//!
//! # fn example() -> Result<(), msf_harness::Error> {
//! let config = HarnessConfig::default();
//! let scenarios = msf_sweep(config.trials);
//! let mut orchestrator =
//!     Orchestrator::new(config, Party::Zero, "10.0.0.2:9000", ProcessExecutor)?;
//! let summary = orchestrator.run_all(&scenarios)?;
//! println!("{} failed", summary.failed.len());
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod graph;
pub mod ledger;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod seed;
pub mod stats;
pub mod tsplib;
mod utils;

/// Any error of the harness.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Graph generation or input files.
    #[error(transparent)]
    Graph(#[from] graph::GraphError),
    /// TSPLIB conversion.
    #[error(transparent)]
    Tsplib(#[from] tsplib::TsplibError),
    /// Stats file parsing.
    #[error(transparent)]
    Stats(#[from] stats::StatsError),
    /// Stats lookup for reporting.
    #[error(transparent)]
    Lookup(#[from] report::LookupError),
    /// The run ledger.
    #[error(transparent)]
    Ledger(#[from] ledger::LedgerError),
    /// A sweep had to be aborted.
    #[error(transparent)]
    Run(#[from] orchestrator::RunError),
}
