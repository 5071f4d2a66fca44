//! Prints the measurements of finished sweeps.
use anyhow::Context;
use clap::Parser;
use msf_harness_cli::{StatsCli, error_chain, init_tracing, render_table};
use tracing::warn;

fn main() -> anyhow::Result<()> {
    init_tracing().context("tracing initialization")?;

    let cli = StatsCli::parse();
    let report = cli.collect();
    for (query, err) in &report.problems {
        warn!(measurement = %query, "{}", error_chain(err));
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&report.rows).context("serializing report")?;
        println!("{json}");
    } else {
        print!("{}", render_table(&report.rows));
    }
    Ok(())
}
