use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gridwatch", version, about = "Gridwatch session countdown and notifier")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run countdown, notifications and refresh until Ctrl-C
    Watch(commands::watch::WatchArgs),
    /// Fetch the feed once and show the next session
    Next {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one refresh cycle
    Refresh(commands::refresh::RefreshArgs),
    /// Fire the notifications of a preference class now
    NotifyTest {
        /// practice, qualifying, sprint or race
        class: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("GRIDWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Watch(args) => commands::watch::run(args),
        Commands::Next { json } => commands::next::run(json),
        Commands::Refresh(args) => commands::refresh::run(args),
        Commands::NotifyTest { class } => commands::notify_test::run(&class),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
