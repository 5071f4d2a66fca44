//! Sequential execution of benchmark scenarios for one party.
//!
//! For every scenario the orchestrator decides between skipping and running:
//!
//! - If the stats file of the party exists (under its canonical or a legacy name), the scenario is
//!   complete and the executable is not started.
//! - Otherwise the input file is generated if needed, the executable writes its stats to
//!   `<stats file>.partial`, and only a successful run with a well-formed partial file is renamed
//!   onto the final path. A present stats file therefore always means a complete run.
//!
//! Progress is recorded in the party's [`Ledger`].
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{Level, debug, info, instrument, warn};

use crate::{
    config::HarnessConfig,
    graph::{GraphError, Party, input_file},
    ledger::{Ledger, LedgerError, RunState, RunSummary},
    runner::{Executor, Invocation, Outcome},
    scenario::{Scenario, stats_file_name},
    stats::{self, StatsError},
    tsplib::{TspInstance, TsplibError},
    utils::{ensure_dir, remove_if_exists},
};

/// Suffix of the file the executable writes its stats to before validation.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Errors that abort a whole sweep.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// A file of the harness could not be accessed.
    #[error("i/o error for {path:?}")]
    Io {
        /// The file or directory.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The executable could not be started.
    #[error("failed to start `{invocation}`")]
    Spawn {
        /// The rendered command line.
        invocation: String,
        /// The underlying error.
        source: io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RunError + '_ {
    move |source| RunError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Why a single scenario did not complete. The sweep continues with the next scenario.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    /// The random input graph could not be generated.
    #[error("failed to generate inputs")]
    Graph(#[from] GraphError),
    /// The TSPLIB instance could not be converted.
    #[error("failed to convert TSPLIB instance")]
    Tsplib(#[from] TsplibError),
    /// The executable exited with a non-zero status or was killed.
    #[error("executable exited with status {0:?}")]
    ExitStatus(Option<i32>),
    /// The executable exited successfully without writing a stats file.
    #[error("executable wrote no stats file")]
    MissingStats,
    /// The stats file written by the executable does not parse.
    #[error("executable wrote a corrupt stats file")]
    CorruptStats(#[source] StatsError),
}

impl FailureReason {
    fn summary(&self, outcome: Option<&Outcome>) -> RunSummary {
        let mut message = self.to_string();
        if let Some(source) = std::error::Error::source(self) {
            message = format!("{message}: {source}");
        }
        match outcome {
            Some(outcome) => {
                let mut summary = RunSummary::from(outcome);
                if !summary.message.is_empty() {
                    message = format!("{message}\n{}", summary.message);
                }
                summary.message = message;
                summary
            }
            None => RunSummary {
                exit_code: None,
                elapsed_ms: 0,
                message,
            },
        }
    }
}

/// The result of [`Orchestrator::run`].
#[derive(Debug)]
pub enum RunStatus {
    /// A stats file already existed; nothing was executed.
    Skipped,
    /// The executable ran and its stats file was accepted.
    Completed,
    /// The scenario failed; see the reason.
    Failed(FailureReason),
}

/// Counts of a finished sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Scenarios that were already complete.
    pub skipped: usize,
    /// Scenarios that ran successfully.
    pub completed: usize,
    /// Names of the scenarios that failed.
    pub failed: Vec<String>,
}

/// Runs scenarios for one party against the protocol executable.
#[derive(Debug)]
pub struct Orchestrator<E> {
    config: HarnessConfig,
    party: Party,
    address: String,
    executor: E,
    ledger: Ledger,
}

impl<E: Executor> Orchestrator<E> {
    /// Creates the working directories below `config.root` and opens the ledger of `party`.
    ///
    /// The root is canonicalized, so every path handed to the executable is absolute.
    pub fn new(
        mut config: HarnessConfig,
        party: Party,
        address: impl Into<String>,
        executor: E,
    ) -> Result<Self, RunError> {
        ensure_dir(&config.root).map_err(io_error(&config.root))?;
        config.root = config.root.canonicalize().map_err(io_error(&config.root))?;
        let stats = config.stats_path();
        ensure_dir(&stats).map_err(io_error(&stats))?;
        let ledger = Ledger::open(&config.ledger_path(party), party)?;
        Ok(Self {
            config,
            party,
            address: address.into(),
            executor,
            ledger,
        })
    }

    /// The configuration with the canonical root.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The party this orchestrator runs as.
    pub fn party(&self) -> Party {
        self.party
    }

    /// The ledger of this party.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The executor driving the protocol executable.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Final path of the stats file of `scenario`.
    pub fn stats_path(&self, scenario: &Scenario) -> PathBuf {
        self.config
            .stats_path()
            .join(scenario.stats_file_name(self.party))
    }

    fn completed_stats(&self, scenario: &Scenario) -> Option<PathBuf> {
        let stats = self.config.stats_path();
        std::iter::once(scenario.name())
            .chain(scenario.legacy_names())
            .map(|name| stats.join(stats_file_name(&name, self.party)))
            .find(|path| path.exists())
    }

    /// Makes sure the input file of this party exists for graph scenarios and returns its path.
    ///
    /// Random graphs are generated from the scenario name, TSP scenarios are converted from
    /// `<tsp dir>/<instance>.tsp`. Existing input files are never rewritten. Returns `None` for
    /// scenarios without graph input.
    pub fn prepare_inputs(&self, scenario: &Scenario) -> Result<Option<PathBuf>, FailureReason> {
        if !scenario.is_graph() {
            return Ok(None);
        }
        let name = scenario.name();
        let dir = self.config.inputs_path().join(&name);
        let path = input_file(&dir, self.party);
        if path.exists() {
            debug!(input = ?path, "reusing input file");
            return Ok(Some(path));
        }
        let split = match (scenario.graph_spec(), scenario) {
            (Some(spec), _) => spec.generate()?,
            (None, Scenario::Tsp { instance }) => {
                let source = self.config.tsp_path().join(format!("{instance}.tsp"));
                TspInstance::load(&source)?.split(&name)
            }
            (None, _) => return Ok(None),
        };
        let written = split.write_inputs(&dir)?;
        debug!(scenario = %name, written, "generated input files");
        Ok(Some(path))
    }

    fn remove_precomp_dumps(&self) -> Result<(), RunError> {
        for dump in &self.config.precomp_dumps {
            let path = self.config.root.join(dump);
            if remove_if_exists(&path).map_err(io_error(&path))? {
                debug!(dump = ?path, "removed precomputation dump");
            }
        }
        Ok(())
    }

    fn fail(
        &mut self,
        name: &str,
        reason: FailureReason,
        outcome: Option<&Outcome>,
    ) -> Result<RunStatus, RunError> {
        warn!(scenario = name, "{reason}");
        self.ledger
            .transition(name, RunState::Failed, Some(reason.summary(outcome)))?;
        Ok(RunStatus::Failed(reason))
    }

    /// Runs `scenario` unless its stats file already exists.
    ///
    /// Failures of the scenario itself are reported as [`RunStatus::Failed`]; an error is
    /// returned only if the harness cannot continue at all.
    #[instrument(level = Level::DEBUG, skip_all, fields(scenario = %scenario), err)]
    pub fn run(&mut self, scenario: &Scenario) -> Result<RunStatus, RunError> {
        let name = scenario.name();
        if let Some(existing) = self.completed_stats(scenario) {
            info!("Skipping {name}");
            debug!(stats = ?existing, "stats file present");
            if self.ledger.state(&name) != Some(RunState::Done) {
                self.ledger.transition(&name, RunState::Done, None)?;
            }
            return Ok(RunStatus::Skipped);
        }

        let stdin = match self.prepare_inputs(scenario) {
            Ok(stdin) => stdin,
            // unwritable inputs abort the sweep
            Err(FailureReason::Graph(GraphError::Io { path, source })) => {
                return Err(RunError::Io { path, source });
            }
            Err(reason) => return self.fail(&name, reason, None),
        };
        if matches!(scenario, Scenario::GenerateMts { .. }) {
            self.remove_precomp_dumps()?;
        }

        let target = self.stats_path(scenario);
        let partial = partial_path(&target);
        remove_if_exists(&partial).map_err(io_error(&partial))?;

        let mut args = vec![
            "-r".to_string(),
            self.party.index().to_string(),
            "-a".to_string(),
            self.address.clone(),
            "-c".to_string(),
            self.config.concurrency.to_string(),
            "-f".to_string(),
            partial.display().to_string(),
        ];
        args.extend(scenario.protocol_args());
        let invocation = Invocation {
            program: self.config.executable_path(),
            args,
            stdin,
            working_dir: self.config.root.clone(),
        };

        self.ledger.transition(&name, RunState::Running, None)?;
        info!("Running {name}");
        let outcome = match self.executor.execute(&invocation) {
            Ok(outcome) => outcome,
            Err(source) => {
                let summary = RunSummary {
                    exit_code: None,
                    elapsed_ms: 0,
                    message: format!("failed to start: {source}"),
                };
                self.ledger
                    .transition(&name, RunState::Failed, Some(summary))?;
                return Err(RunError::Spawn {
                    invocation: invocation.to_string(),
                    source,
                });
            }
        };

        if !outcome.success {
            return self.fail(&name, FailureReason::ExitStatus(outcome.exit_code), Some(&outcome));
        }
        let bytes = match fs::read(&partial) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return self.fail(&name, FailureReason::MissingStats, Some(&outcome));
            }
            Err(source) => {
                return Err(RunError::Io {
                    path: partial,
                    source,
                });
            }
        };
        let validated =
            stats::decode(bytes).and_then(|text| scenario.stats_format().validate(&text));
        if let Err(e) = validated {
            return self.fail(&name, FailureReason::CorruptStats(e), Some(&outcome));
        }
        fs::rename(&partial, &target).map_err(io_error(&target))?;
        info!(
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Finished {name}"
        );
        self.ledger
            .transition(&name, RunState::Done, Some(RunSummary::from(&outcome)))?;
        Ok(RunStatus::Completed)
    }

    /// Registers all scenarios as pending, then runs them one after another.
    pub fn run_all(&mut self, scenarios: &[Scenario]) -> Result<SweepSummary, RunError> {
        let names: Vec<String> = scenarios.iter().map(Scenario::name).collect();
        self.ledger.register(names.iter().map(String::as_str))?;
        let mut summary = SweepSummary::default();
        for (scenario, name) in scenarios.iter().zip(names) {
            match self.run(scenario)? {
                RunStatus::Skipped => summary.skipped += 1,
                RunStatus::Completed => summary.completed += 1,
                RunStatus::Failed(_) => summary.failed.push(name),
            }
        }
        info!(
            skipped = summary.skipped,
            completed = summary.completed,
            failed = summary.failed.len(),
            "sweep finished"
        );
        Ok(summary)
    }
}

/// `<stats file>.partial`
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::scenario::Density;

    const MSF_STATS: &str = "iterations 5\nphase1 1 2 3 4\ncomm1 100 200\nphase2 5 6 7 8\n\
                             comm2 300 400\nmults 1 2 3\nsubgraphs 3:2 4:1\n";

    /// Writes `stats` to the `-f` path and exits with `exit_code`.
    struct FakeExecutor {
        stats: Option<&'static [u8]>,
        exit_code: i32,
        calls: Vec<Invocation>,
    }

    impl FakeExecutor {
        fn writing(stats: &'static str) -> Self {
            Self {
                stats: Some(stats.as_bytes()),
                exit_code: 0,
                calls: vec![],
            }
        }
    }

    impl Executor for FakeExecutor {
        fn execute(&mut self, invocation: &Invocation) -> io::Result<Outcome> {
            self.calls.push(invocation.clone());
            if let (Some(stats), Some(path)) = (self.stats, invocation.flag("-f")) {
                fs::write(path, stats)?;
            }
            Ok(Outcome {
                exit_code: Some(self.exit_code),
                success: self.exit_code == 0,
                stderr: "protocol log\n".into(),
                elapsed: Duration::from_millis(7),
            })
        }
    }

    fn orchestrator(dir: &TempDir, party: Party, executor: FakeExecutor) -> Orchestrator<FakeExecutor> {
        let config = HarnessConfig {
            root: dir.path().to_path_buf(),
            ..HarnessConfig::default()
        };
        Orchestrator::new(config, party, "127.0.0.1:9000", executor).unwrap()
    }

    fn unique(vertices: u32, edges: usize) -> Scenario {
        Scenario::MsfUnique {
            vertices,
            edges,
            trial: 1,
        }
    }

    #[test]
    fn graph_scenario_runs_and_is_then_skipped() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Party::One, FakeExecutor::writing(MSF_STATS));
        let scenario = unique(10, 30);

        assert!(matches!(orch.run(&scenario).unwrap(), RunStatus::Completed));
        let call = &orch.executor().calls[0];
        assert_eq!(call.flag("-r"), Some("1"));
        assert_eq!(call.flag("-a"), Some("127.0.0.1:9000"));
        assert_eq!(call.flag("-c"), Some("8"));
        assert!(call.flag("-f").unwrap().ends_with("unique-10-30-1-p1.txt.partial"));
        assert!(call.stdin.as_ref().unwrap().ends_with("inputs/unique-10-30-1/p1.txt"));
        assert_eq!(call.flag("-t"), None);

        let target = orch.stats_path(&scenario);
        assert_eq!(fs::read_to_string(&target).unwrap(), MSF_STATS);
        assert!(!partial_path(&target).exists());
        assert_eq!(orch.ledger().state("unique-10-30-1"), Some(RunState::Done));

        assert!(matches!(orch.run(&scenario).unwrap(), RunStatus::Skipped));
        assert_eq!(orch.executor().calls.len(), 1);
    }

    #[test]
    fn existing_stats_file_means_zero_invocations() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Party::Zero, FakeExecutor::writing(MSF_STATS));
        let scenario = Scenario::MsfBounded {
            vertices: 10,
            edges: 30,
            density: Density(0.5),
            trial: 2,
        };
        fs::write(orch.stats_path(&scenario), "whatever").unwrap();
        assert!(matches!(orch.run(&scenario).unwrap(), RunStatus::Skipped));
        assert!(orch.executor().calls.is_empty());
        // inputs are left alone when skipping
        assert!(!dir.path().join("inputs").join(scenario.name()).exists());
        assert_eq!(orch.ledger().state(&scenario.name()), Some(RunState::Done));
    }

    #[test]
    fn legacy_connectivity_stats_count_as_complete() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Party::Zero, FakeExecutor::writing("x"));
        let stats = dir.path().join("stats");
        fs::write(stats.join("connctivity-5-10-p0.txt"), "old").unwrap();
        let scenario = Scenario::Connectivity { size: 5, count: 10 };
        assert!(matches!(orch.run(&scenario).unwrap(), RunStatus::Skipped));
        assert!(orch.executor().calls.is_empty());
    }

    #[test]
    fn failing_executable_leaves_no_stats_file() {
        let dir = TempDir::new().unwrap();
        let mut executor = FakeExecutor::writing("iterations 5\nphase1 1 2");
        executor.exit_code = 1;
        let mut orch = orchestrator(&dir, Party::Zero, executor);
        let scenario = unique(10, 30);

        let status = orch.run(&scenario).unwrap();
        assert!(matches!(status, RunStatus::Failed(FailureReason::ExitStatus(Some(1)))));
        let target = orch.stats_path(&scenario);
        assert!(!target.exists());
        assert!(partial_path(&target).exists());
        let entry = orch.ledger().entry("unique-10-30-1").unwrap();
        assert_eq!(entry.state, RunState::Failed);
        let last = entry.last_run.as_ref().unwrap();
        assert_eq!(last.exit_code, Some(1));
        assert!(last.message.contains("protocol log"));

        // the next sweep retries
        orch.executor.exit_code = 0;
        orch.executor.stats = Some(MSF_STATS.as_bytes());
        assert!(matches!(orch.run(&scenario).unwrap(), RunStatus::Completed));
        assert_eq!(orch.executor().calls.len(), 2);
    }

    #[test]
    fn truncated_stats_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Party::Zero, FakeExecutor::writing("iterations 5\n"));
        let scenario = unique(10, 30);
        let status = orch.run(&scenario).unwrap();
        assert!(matches!(status, RunStatus::Failed(FailureReason::CorruptStats(_))));
        assert!(!orch.stats_path(&scenario).exists());
    }

    #[test]
    fn binary_stats_fail_only_their_scenario() {
        let dir = TempDir::new().unwrap();
        let mut executor = FakeExecutor::writing("");
        executor.stats = Some(&[0xff, 0xfe, 0x00, 0x41]);
        let mut orch = orchestrator(&dir, Party::Zero, executor);
        let scenarios = [
            Scenario::GenerateMts { count: 100 },
            Scenario::GenerateMts { count: 200 },
        ];
        let summary = orch.run_all(&scenarios).unwrap();
        assert_eq!(summary.failed, vec!["genmt-100", "genmt-200"]);
        assert_eq!(orch.executor().calls.len(), 2);
        let status = orch.run(&scenarios[0]).unwrap();
        assert!(matches!(
            status,
            RunStatus::Failed(FailureReason::CorruptStats(StatsError::InvalidUtf8 {
                valid_up_to: 0
            }))
        ));
        assert!(!orch.stats_path(&scenarios[0]).exists());
    }

    /// Fails to start the executable.
    struct Unstartable;

    impl Executor for Unstartable {
        fn execute(&mut self, _: &Invocation) -> io::Result<Outcome> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    #[test]
    fn spawn_failure_is_recorded_in_the_ledger() {
        let dir = TempDir::new().unwrap();
        let config = HarnessConfig {
            root: dir.path().to_path_buf(),
            ..HarnessConfig::default()
        };
        let mut orch =
            Orchestrator::new(config, Party::Zero, "127.0.0.1:9000", Unstartable).unwrap();
        let err = orch.run(&Scenario::GenerateMts { count: 100 }).unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
        let entry = orch.ledger().entry("genmt-100").unwrap();
        assert_eq!(entry.state, RunState::Failed);
        let last = entry.last_run.as_ref().unwrap();
        assert_eq!(last.exit_code, None);
        assert!(last.message.contains("no such file"));
    }

    #[test]
    fn unwritable_inputs_abort_the_sweep() {
        let dir = TempDir::new().unwrap();
        // a file where the inputs directory belongs
        fs::write(dir.path().join("inputs"), "").unwrap();
        let mut orch = orchestrator(&dir, Party::Zero, FakeExecutor::writing(MSF_STATS));
        let err = orch.run_all(&[unique(10, 30), unique(20, 60)]).unwrap_err();
        assert!(matches!(err, RunError::Io { .. }));
        assert!(orch.executor().calls.is_empty());
    }

    #[test]
    fn missing_stats_after_success_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let executor = FakeExecutor {
            stats: None,
            exit_code: 0,
            calls: vec![],
        };
        let mut orch = orchestrator(&dir, Party::Zero, executor);
        let status = orch.run(&Scenario::GenerateMts { count: 100 }).unwrap();
        assert!(matches!(status, RunStatus::Failed(FailureReason::MissingStats)));
    }

    #[test]
    fn triple_generation_removes_precomputation_dumps() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Party::Zero, FakeExecutor::writing("ots(total) 1500\n"));
        for dump in ["pre_comp_client.dump", "pre_comp_server.dump"] {
            fs::write(dir.path().join(dump), "stale").unwrap();
        }
        let status = orch.run(&Scenario::GenerateMts { count: 1000 }).unwrap();
        assert!(matches!(status, RunStatus::Completed));
        assert!(!dir.path().join("pre_comp_client.dump").exists());
        assert!(!dir.path().join("pre_comp_server.dump").exists());
        let call = &orch.executor().calls[0];
        assert_eq!(call.flag("-t"), Some("genots"));
        assert_eq!(call.flag("-n"), Some("1000"));
        assert_eq!(call.stdin, None);
    }

    #[test]
    fn generation_failure_does_not_invoke_the_executable() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Party::Zero, FakeExecutor::writing(MSF_STATS));
        let scenario = Scenario::MsfBounded {
            vertices: 2,
            edges: 1000,
            density: Density(0.01),
            trial: 1,
        };
        let status = orch.run(&scenario).unwrap();
        assert!(matches!(
            status,
            RunStatus::Failed(FailureReason::Graph(GraphError::InsufficientTripleSpace { .. }))
        ));
        assert!(orch.executor().calls.is_empty());
        assert_eq!(orch.ledger().state(&scenario.name()), Some(RunState::Failed));
    }

    #[test]
    fn tsp_scenario_converts_the_tsplib_file() {
        let dir = TempDir::new().unwrap();
        let tsp = dir.path().join("tsp");
        fs::create_dir_all(&tsp).unwrap();
        fs::write(
            tsp.join("tiny.tsp"),
            "NAME: tiny\nTYPE: TSP\nDIMENSION: 3\nEDGE_WEIGHT_TYPE: EUC_2D\n\
             NODE_COORD_SECTION\n1 0 0\n2 3 0\n3 0 4\nEOF\n",
        )
        .unwrap();
        let mut orch = orchestrator(&dir, Party::Zero, FakeExecutor::writing(MSF_STATS));
        let scenario = Scenario::Tsp {
            instance: "tiny".into(),
        };
        assert!(matches!(orch.run(&scenario).unwrap(), RunStatus::Completed));
        let input = dir.path().join("inputs").join("tiny-1").join("p0.txt");
        assert!(fs::read_to_string(input).unwrap().starts_with("3 1\n"));
        assert!(orch.stats_path(&scenario).ends_with("tiny-1-p0.txt"));
    }

    #[test]
    fn run_all_continues_after_failures() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Party::Zero, FakeExecutor::writing(MSF_STATS));
        let scenarios = vec![
            unique(10, 30),
            Scenario::Tsp {
                instance: "absent".into(),
            },
            unique(20, 60),
        ];
        fs::write(orch.stats_path(&scenarios[2]), MSF_STATS).unwrap();
        let summary = orch.run_all(&scenarios).unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                skipped: 1,
                completed: 1,
                failed: vec!["absent-1".into()],
            }
        );
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/s/genmt-100-p0.txt")),
            PathBuf::from("/s/genmt-100-p0.txt.partial")
        );
    }
}
