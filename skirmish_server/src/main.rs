// CLI entry point for the Skirmish session server.
//
// Loads the session config and hero list, starts the server, and blocks
// until the process is killed. Logging goes to stderr through
// `tracing-subscriber`; `RUST_LOG` overrides the default filter.
//
// Usage:
//   skirmish-server [--port 7979] [--host 127.0.0.1] [--config session.json]
//                   [--heroes heroes.json] [--tick-ms 50] [--seed N]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use skirmish_server::{ServerConfig, ServerError, start_server};
use skirmish_session::{SessionConfig, StaticCatalog};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Authoritative match-session server.
#[derive(Parser, Debug)]
#[command(name = "skirmish-server")]
#[command(about = "Authoritative lobby, hero draft and match-result coordinator")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 7979)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Session config (JSON); missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hero catalog: a JSON array of hero ids
    #[arg(long)]
    heroes: Option<PathBuf>,

    /// Tick interval in milliseconds
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Fixed seed for draft randomness (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skirmish=info")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "server failed to start");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ServerError> {
    let mut session = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if args.seed.is_some() {
        session.rng_seed = args.seed;
    }
    let catalog = args
        .heroes
        .as_deref()
        .map(StaticCatalog::from_json_file)
        .transpose()?;

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        tick_interval: Duration::from_millis(args.tick_ms.max(1)),
        session,
        catalog,
    };
    let (handle, addr) = start_server(config)?;
    info!(%addr, "ready; Ctrl+C to stop");
    handle.wait();
    Ok(())
}
