//! webwatch — Binary Entrypoint
//! Parses the CLI, wires tracing, and dispatches to the watch/list commands.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webwatch::cli::{run_list, run_watch, Cli, Command};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op where there is none.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Watch(args) => run_watch(args).await,
        Command::List(args) => run_list(args).await,
    }
}
