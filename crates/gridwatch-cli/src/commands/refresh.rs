use clap::Args;
use gridwatch_core::SourceOutcome;

use super::{block_on, load_config, orchestrator, CliResult};

#[derive(Args)]
pub struct RefreshArgs {
    /// Parse and publish even when the feed is unchanged
    #[arg(long)]
    force: bool,
    /// Forget stored fingerprints first, so every source counts as changed
    #[arg(long)]
    reset: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: RefreshArgs) -> CliResult {
    let config = load_config()?;
    let orchestrator = orchestrator(&config)?;

    if args.reset {
        let removed = orchestrator.detector().reset()?;
        tracing::info!(removed, "fingerprints cleared");
    }

    let report = block_on(orchestrator.refresh_all(args.force))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for outcome in &report.outcomes {
            match outcome {
                SourceOutcome::Updated { source } => println!("{source:<22} updated"),
                SourceOutcome::Unchanged { source } => println!("{source:<22} unchanged"),
                SourceOutcome::Failed { source, error } => println!("{source:<22} failed: {error}"),
            }
        }
        if report.did_update {
            println!("data refreshed");
        } else {
            println!("no new data");
        }
    }

    if !report.outcomes.is_empty() && report.failures().count() == report.outcomes.len() {
        return Err("every source failed".into());
    }
    Ok(())
}
