use chrono::Utc;
use gridwatch_core::{Countdown, NO_UPCOMING};

use super::{block_on, load_config, orchestrator, CliResult};

pub fn run(json: bool) -> CliResult {
    let config = load_config()?;
    let orchestrator = orchestrator(&config)?;

    let report = block_on(orchestrator.refresh_all(false))?;
    for failure in report.failures() {
        tracing::warn!(source = %failure.source(), "source unavailable");
    }

    let countdown = Countdown::compute(Utc::now(), &orchestrator.sessions().snapshot());

    if json {
        println!("{}", serde_json::to_string_pretty(&countdown)?);
        return Ok(());
    }

    match &countdown.target {
        Some(next) => {
            println!("{}", next.label);
            println!("  starts {}", next.start.format("%Y-%m-%d %H:%M UTC"));
            println!("  {}", countdown.text);
        }
        None => println!("{NO_UPCOMING}"),
    }
    Ok(())
}
