//! Command line front ends of the MSF benchmark harness.
//!
//! `msf-bench` runs scenario sweeps for one party, `msf-stats` prints what the sweeps measured.
use std::{fmt::Write as _, path::PathBuf, str::FromStr};

use clap::{Parser, ValueEnum, ValueHint};
use msf_harness::{
    config::HarnessConfig,
    graph::Party,
    report::{
        self, NetworkProfile, Query, Report, connectivity_queries, msf_queries, ot_queries,
        subgraph_queries, tsp_queries,
    },
    scenario::{self, Density, Scenario},
};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Environment variable holding the log filter of both binaries.
pub const LOG_ENV_VAR: &str = "MSF_HARNESS_LOG";

/// Installs a `tracing` subscriber filtered by [`LOG_ENV_VAR`].
pub fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive("msf_harness=info".parse()?)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Renders `err` followed by its sources, separated by `: `.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        let _ = write!(out, ": {e}");
        source = e.source();
    }
    out
}

fn parse_party(s: &str) -> Result<Party, String> {
    let index: u8 = s
        .parse()
        .map_err(|_| format!("party must be 0 or 1, got {s:?}"))?;
    Party::try_from(index)
}

/// The benchmark families `msf-bench` can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    /// MSF on random graphs (`<n> <m> [w]`, `all`) or on TSPLIB instances (`tsp`).
    Msf,
    /// Multiplication triple generation (`<count>`, `all`).
    Mt,
    /// The connectivity subprotocol (`<size> <count>`, `all`).
    Connectivity,
    /// The subgraph subprotocol (`<size> <count>`, `all`).
    Subgraph,
}

/// Runs MSF benchmark scenarios for one party against the protocol executable.
///
/// Both parties run this with the same arguments apart from the party. Completed scenarios are
/// skipped, so an interrupted sweep continues where it stopped.
///
/// Logging can be controlled with an EnvFilter via the `MSF_HARNESS_LOG` environment variable.
#[derive(Debug, Parser)]
#[command(name = "msf-bench", version)]
pub struct BenchCli {
    /// The party this process plays, 0 or 1.
    #[arg(value_parser = parse_party)]
    pub party: Party,
    /// Address of the peer, passed on to the protocol executable.
    pub address: String,
    /// What to benchmark.
    #[arg(value_enum)]
    pub operation: Operation,
    /// Parameters of the operation, or `all` for the predefined sweep, or `tsp`.
    #[arg(required = true, num_args = 1..)]
    pub params: Vec<String>,
    /// JSON configuration file; the flags below override its values.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Working directory holding `inputs/`, `stats/` and the precomputation dumps.
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub root: Option<PathBuf>,
    /// The protocol executable, relative to the root.
    #[arg(long = "bin", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub executable: Option<PathBuf>,
    /// Number of threads of the protocol executable.
    #[arg(long, short)]
    pub concurrency: Option<u32>,
    /// Number of trials of each random MSF instance.
    #[arg(long)]
    pub trials: Option<u32>,
    /// Only write the input files of graph scenarios, do not run anything.
    #[arg(long)]
    pub generate_only: bool,
}

impl BenchCli {
    /// Builds the configuration from `--config` and the override flags.
    pub fn config(&self) -> Result<HarnessConfig, msf_harness::Error> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_path(path)?,
            None => HarnessConfig::default(),
        };
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(executable) = &self.executable {
            config.executable = executable.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(trials) = self.trials {
            config.trials = trials;
        }
        config.validate()?;
        Ok(config)
    }

    /// The scenarios selected by the operation and its parameters.
    pub fn scenarios(&self, trials: u32) -> Result<Vec<Scenario>, UsageError> {
        select_scenarios(self.operation, &self.params, trials)
    }
}

/// Operation parameters that do not describe any scenario.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

fn param<T: FromStr>(params: &[String], index: usize, what: &str) -> Result<T, UsageError>
where
    T::Err: std::fmt::Display,
{
    let raw = params
        .get(index)
        .ok_or_else(|| UsageError(format!("missing {what}")))?;
    raw.parse()
        .map_err(|e| UsageError(format!("invalid {what} {raw:?}: {e}")))
}

fn expect_len(params: &[String], max: usize) -> Result<(), UsageError> {
    if params.len() > max {
        return Err(UsageError(format!(
            "unexpected parameters: {}",
            params[max..].join(" ")
        )));
    }
    Ok(())
}

/// Maps `operation` and its parameters onto scenarios.
///
/// - `msf all` / `msf tsp` / `msf <n> <m> [w]` (without `w` or with `unique`, unique weights;
///   one scenario per trial)
/// - `mt all` / `mt <count>`
/// - `connectivity all` / `connectivity <size> <count>`, same for `subgraph`
pub fn select_scenarios(
    operation: Operation,
    params: &[String],
    trials: u32,
) -> Result<Vec<Scenario>, UsageError> {
    let first = params.first().map(String::as_str);
    if first == Some("all") || first == Some("tsp") {
        expect_len(params, 1)?;
    }
    let scenarios = match (operation, first) {
        (Operation::Msf, Some("all")) => scenario::msf_sweep(trials),
        (Operation::Msf, Some("tsp")) => scenario::tsp_sweep(),
        (_, Some("tsp")) => {
            return Err(UsageError("`tsp` is only available for msf".into()));
        }
        (Operation::Mt, Some("all")) => scenario::mt_sweep(),
        (Operation::Connectivity, Some("all")) => scenario::connectivity_sweep(),
        (Operation::Subgraph, Some("all")) => scenario::subgraph_sweep(),
        (Operation::Msf, _) => {
            expect_len(params, 3)?;
            let vertices: u32 = param(params, 0, "vertex count")?;
            let edges: usize = param(params, 1, "edge count")?;
            let density = match params.get(2).map(String::as_str) {
                None | Some("unique") => None,
                Some(_) => Some(param::<Density>(params, 2, "density")?),
            };
            (1..=trials)
                .map(|trial| match density {
                    None => Scenario::MsfUnique {
                        vertices,
                        edges,
                        trial,
                    },
                    Some(density) => Scenario::MsfBounded {
                        vertices,
                        edges,
                        density,
                        trial,
                    },
                })
                .collect()
        }
        (Operation::Mt, _) => {
            expect_len(params, 1)?;
            vec![Scenario::GenerateMts {
                count: param(params, 0, "triple count")?,
            }]
        }
        (Operation::Connectivity, _) | (Operation::Subgraph, _) => {
            expect_len(params, 2)?;
            let size = param(params, 0, "instance size")?;
            let count = param(params, 1, "instance count")?;
            match operation {
                Operation::Connectivity => vec![Scenario::Connectivity { size, count }],
                _ => vec![Scenario::Subgraph { size, count }],
            }
        }
    };
    Ok(scenarios)
}

/// Groups of measurements `msf-stats` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Sweep {
    /// MSF on random graphs, averaged over trials.
    Msf,
    /// MSF on TSPLIB instances.
    Tsp,
    /// Multiplication triple generation.
    Mt,
    /// Connectivity subprotocol.
    Connectivity,
    /// Subgraph subprotocol.
    Subgraph,
    /// Everything above.
    All,
}

impl Sweep {
    /// The measurements of this group.
    pub fn queries(self) -> Vec<Query> {
        match self {
            Sweep::Msf => msf_queries(),
            Sweep::Tsp => tsp_queries(),
            Sweep::Mt => ot_queries(),
            Sweep::Connectivity => connectivity_queries(),
            Sweep::Subgraph => subgraph_queries(),
            Sweep::All => [
                msf_queries(),
                tsp_queries(),
                ot_queries(),
                connectivity_queries(),
                subgraph_queries(),
            ]
            .concat(),
        }
    }
}

/// Prints the measurements found in a stats directory.
///
/// Missing or corrupt stats files are reported as warnings; everything else is printed.
///
/// Logging can be controlled with an EnvFilter via the `MSF_HARNESS_LOG` environment variable.
#[derive(Debug, Parser)]
#[command(name = "msf-stats", version)]
pub struct StatsCli {
    /// Which measurements to report.
    #[arg(value_enum, default_value_t = Sweep::All)]
    pub sweep: Sweep,
    /// Directory containing the stats directories.
    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    pub root: PathBuf,
    /// Read `stats_<network>/` and estimate the combined time for this network.
    #[arg(long)]
    pub network: Option<NetworkProfile>,
    /// Whose stats files to read.
    #[arg(long, value_parser = parse_party, default_value = "0")]
    pub party: Party,
    /// Number of trials averaged per MSF measurement.
    #[arg(long, default_value_t = msf_harness::config::DEFAULT_TRIALS)]
    pub trials: u32,
    /// Print the rows as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl StatsCli {
    /// Looks up every measurement of the selected sweep.
    pub fn collect(&self) -> Report {
        let store = report::StatsStore::for_network(&self.root, self.network)
            .with_party(self.party)
            .with_trials(self.trials);
        Report::collect(&store, self.network, self.sweep.queries())
    }
}

fn optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

/// Renders report rows as a console table.
pub fn render_table(rows: &[report::Row]) -> String {
    let mut out = String::new();
    // writing to a String never fails
    let _ = writeln!(
        out,
        "{:<28} {:>12} {:>12} {:>12} {:>14} {:>14} {:>12}",
        "Scenario", "Time(s)", "Phase1(s)", "Phase2(s)", "Mults", "Comm(B)", "Combined(s)"
    );
    let _ = writeln!(out, "{}", "-".repeat(110));
    for row in rows {
        let (phase1, phase2) = match row.phase_seconds {
            Some([p1, p2]) => (Some(p1), Some(p2)),
            None => (None, None),
        };
        let _ = writeln!(
            out,
            "{:<28} {:>12.3} {:>12} {:>12} {:>14} {:>14} {:>12}",
            row.name,
            row.seconds,
            optional(phase1, 3),
            optional(phase2, 3),
            optional(row.multiplications, 0),
            optional(row.comm, 0),
            optional(row.combined_seconds, 3),
        );
    }
    out
}
