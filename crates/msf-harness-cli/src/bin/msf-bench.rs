//! Runs MSF benchmark scenarios for one party.
use anyhow::Context;
use clap::{CommandFactory, Parser};
use msf_harness::{
    Error, config::ConfigError, orchestrator::Orchestrator, runner::ProcessExecutor,
};
use msf_harness_cli::{BenchCli, error_chain, init_tracing};
use tracing::{info, warn};

fn usage(reason: &dyn std::fmt::Display) -> anyhow::Result<()> {
    eprintln!("error: {reason}\n");
    let _ = BenchCli::command().print_help();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing().context("tracing initialization")?;

    // invalid invocations print usage and do nothing
    let cli = match BenchCli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return Ok(());
        }
    };
    let config = match cli.config() {
        Ok(config) => config,
        Err(Error::Config(ConfigError::Invalid(reason))) => return usage(&reason),
        Err(e) => return Err(e).context("invalid configuration"),
    };
    let scenarios = match cli.scenarios(config.trials) {
        Ok(scenarios) => scenarios,
        Err(e) => return usage(&e),
    };

    let mut orchestrator = Orchestrator::new(config, cli.party, cli.address, ProcessExecutor)
        .context("failed to set up the working directory")?;

    if cli.generate_only {
        let mut generated = 0;
        for scenario in scenarios.iter().filter(|s| s.is_graph()) {
            match orchestrator.prepare_inputs(scenario) {
                Ok(_) => generated += 1,
                Err(e) => warn!(scenario = %scenario, "{}", error_chain(&e)),
            }
        }
        info!(generated, "input generation finished");
        return Ok(());
    }

    let summary = orchestrator
        .run_all(&scenarios)
        .context("sweep aborted")?;
    println!(
        "{} completed, {} skipped, {} failed",
        summary.completed,
        summary.skipped,
        summary.failed.len()
    );
    for name in &summary.failed {
        println!("failed: {name}");
    }
    Ok(())
}
