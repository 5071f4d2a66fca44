use std::{fs, io, time::Duration};

use msf_harness::{
    config::HarnessConfig,
    graph::{Party, parse_input},
    ledger::{Ledger, RunState},
    orchestrator::{Orchestrator, RunStatus, SweepSummary},
    runner::{Executor, Invocation, Outcome},
    scenario::{Density, Scenario},
    stats::StatsRecord,
};
use tempfile::TempDir;

/// Plays the protocol executable: checks its input and writes stats matching the scenario type.
#[derive(Default)]
struct Protocol {
    invocations: Vec<Invocation>,
}

impl Executor for Protocol {
    fn execute(&mut self, invocation: &Invocation) -> io::Result<Outcome> {
        self.invocations.push(invocation.clone());
        let stats = match invocation.flag("-t") {
            Some("genots") => "ots(total) 1200\nots(recv/send) 10 20\n".to_string(),
            Some(kind) => format!("{kind}(total) 300\nands 77\n{kind}(recv/send) 1 2\n"),
            None => {
                let input = fs::read_to_string(invocation.stdin.as_ref().unwrap())?;
                let (_, edges) = parse_input(&input).unwrap();
                format!(
                    "iterations 4\nphase1 10 0 0 0\ncomm1 1 1\nphase2 20 0 0 0\ncomm2 1 1\n\
                     mults {} 0 0\nsubgraphs 2:1\n",
                    edges.len()
                )
            }
        };
        fs::write(invocation.flag("-f").unwrap(), stats)?;
        Ok(Outcome {
            exit_code: Some(0),
            success: true,
            stderr: String::new(),
            elapsed: Duration::from_millis(1),
        })
    }
}

fn config(dir: &TempDir) -> HarnessConfig {
    HarnessConfig {
        root: dir.path().join("bench"),
        concurrency: 2,
        ..HarnessConfig::default()
    }
}

#[test]
fn mixed_sweep_runs_every_kind_once() {
    let dir = TempDir::new().unwrap();
    let scenarios = vec![
        Scenario::MsfUnique {
            vertices: 50,
            edges: 150,
            trial: 1,
        },
        Scenario::MsfBounded {
            vertices: 50,
            edges: 150,
            density: Density(0.1),
            trial: 1,
        },
        Scenario::GenerateMts { count: 500 },
        Scenario::Connectivity { size: 5, count: 1 },
        Scenario::Subgraph { size: 6, count: 100 },
    ];

    let mut orch =
        Orchestrator::new(config(&dir), Party::Zero, "peer:7766", Protocol::default()).unwrap();
    let summary = orch.run_all(&scenarios).unwrap();
    assert_eq!(
        summary,
        SweepSummary {
            completed: 5,
            ..SweepSummary::default()
        }
    );
    let calls = &orch.executor().invocations;
    assert!(calls.iter().all(|c| c.flag("-c") == Some("2")));
    assert_eq!(calls[3].flag("-k"), Some("5"));
    assert_eq!(calls[4].flag("-t"), Some("subgraph"));

    // party 0 holds half of the 150 edges
    let stats = orch.stats_path(&scenarios[0]);
    let record = StatsRecord::parse(&fs::read_to_string(stats).unwrap()).unwrap();
    assert_eq!(record.multiplications, 75);

    let ledger = Ledger::open(&config(&dir).ledger_path(Party::Zero), Party::Zero).unwrap();
    assert!(ledger.entries().all(|(_, e)| e.state == RunState::Done));
    assert_eq!(ledger.entries().count(), 5);

    // a second sweep in a new process starts nothing
    let mut orch =
        Orchestrator::new(config(&dir), Party::Zero, "peer:7766", Protocol::default()).unwrap();
    let summary = orch.run_all(&scenarios).unwrap();
    assert_eq!(summary.skipped, 5);
    assert!(orch.executor().invocations.is_empty());
}

#[test]
fn both_parties_share_one_instance() {
    let dir = TempDir::new().unwrap();
    let scenario = Scenario::MsfBounded {
        vertices: 30,
        edges: 91,
        density: Density(0.5),
        trial: 2,
    };
    for party in Party::BOTH {
        let mut orch =
            Orchestrator::new(config(&dir), party, "peer:7766", Protocol::default()).unwrap();
        assert!(matches!(orch.run(&scenario).unwrap(), RunStatus::Completed));
    }
    let inputs = dir.path().join("bench/inputs").join(scenario.name());
    let p0 = fs::read_to_string(inputs.join("p0.txt")).unwrap();
    let p1 = fs::read_to_string(inputs.join("p1.txt")).unwrap();
    assert!(p0.starts_with("30 45\n"));
    assert!(p1.starts_with("30 46\n"));
}

#[test]
fn interrupted_run_is_repeated() {
    let dir = TempDir::new().unwrap();
    let scenario = Scenario::GenerateMts { count: 200 };
    let config = config(&dir);
    fs::create_dir_all(config.stats_path()).unwrap();

    // a crash left the ledger in `Running` and a partial stats file behind
    let mut ledger = Ledger::open(&config.ledger_path(Party::One), Party::One).unwrap();
    ledger
        .transition(&scenario.name(), RunState::Running, None)
        .unwrap();
    let partial = config.stats_path().join("genmt-200-p1.txt.partial");
    fs::write(&partial, "ots(total)").unwrap();

    let mut orch = Orchestrator::new(config, Party::One, "peer:7766", Protocol::default()).unwrap();
    assert!(matches!(orch.run(&scenario).unwrap(), RunStatus::Completed));
    assert_eq!(orch.executor().invocations.len(), 1);
    assert_eq!(orch.ledger().state(&scenario.name()), Some(RunState::Done));
    assert!(!partial.exists());
}
