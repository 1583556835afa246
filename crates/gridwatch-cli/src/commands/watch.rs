use std::io::Write;
use std::sync::Arc;

use clap::Args;
use gridwatch_core::notify::{ConfigFilePreferences, Silent};
use gridwatch_core::{Config, Event, NotificationScheduler, Runtime, RuntimeSettings, SoundPlayer};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::{load_config, orchestrator, Bell, CliResult, ConsoleNotifier};

#[derive(Args)]
pub struct WatchArgs {
    /// Do not ring the terminal bell
    #[arg(long)]
    silent: bool,
}

pub fn run(args: WatchArgs) -> CliResult {
    let config = load_config()?;
    let orchestrator = orchestrator(&config)?;
    let sound: Arc<dyn SoundPlayer> = if args.silent { Arc::new(Silent) } else { Arc::new(Bell) };

    let runtime = Runtime::new(
        orchestrator,
        NotificationScheduler::from_config(&config.notifications),
        // Preferences are re-read every pass so `config set` applies live.
        Arc::new(ConfigFilePreferences::new(Config::path()?)),
        Arc::new(ConsoleNotifier),
        sound,
    )
    .with_settings(RuntimeSettings::from_config(&config));

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(async move {
        let handle = runtime.spawn(CancellationToken::new());
        let mut countdown = handle.countdown();
        let mut events = handle.subscribe();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = countdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let text = countdown.borrow_and_update().text.clone();
                    print!("\r\x1b[2K{text}");
                    let _ = std::io::stdout().flush();
                }
                event = events.recv() => match event {
                    Ok(Event::DataRefreshed { updated: true, sources, .. }) => {
                        println!("\r\x1b[2Kdata refreshed: {}", join(&sources));
                    }
                    Ok(Event::SourceFailed { source, message, .. }) => {
                        println!("\r\x1b[2K{source} unavailable: {message}");
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "event stream lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        println!();
        handle.shutdown().await;
    });
    Ok(())
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
