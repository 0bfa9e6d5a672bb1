//! Larder command line.
//!
//! Loads configuration, runs the startup phases and prints what ended up in
//! each cache. Exits non-zero if configuration fails to load or any startup
//! task fails.

use clap::{ArgAction, Parser};
use larder_config::Config;
use larder_startup::start;
use larder_structures::KeyedCache;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "larder", version, about = "Open the broadcast store and warm its caches")]
struct Args {
    /// Configuration file (.toml, .yaml, .yml or .json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use a private in-memory database instead of the configured file
    #[arg(long)]
    in_memory: bool,

    /// Increase logging verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{err:?}");
            return ExitCode::from(2);
        }
    };
    if args.in_memory {
        config.database.in_memory = true;
    }

    tracing::info!("starting larder");
    let (ctx, report) = start(config).await;

    if let Ok(caches) = ctx.caches().await {
        println!("{}: {}", caches.broadcast.name(), caches.broadcast.len());
        println!("{}: {}", caches.cache_locally.name(), caches.cache_locally.len());
    }
    ctx.close().await;

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        tracing::error!(failed = ?report.failed, "startup did not complete");
        ExitCode::FAILURE
    }
}
