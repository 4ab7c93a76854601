//! Daemon entrypoint: CLI parsing, config loading, logging bootstrap. Wiring
//! a concrete `NfsRpc`/`DelegationRegistry`/`LayoutCollaborator`/`IdMapper`
//! (the transport and session layer) is left to the integrator that embeds
//! this crate -- those collaborators live outside it by design.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use nfs41_open_state::config::DaemonConfig;

#[derive(Debug, Parser)]
#[command(name = "nfs41-open-stated", about = "NFSv4.1 client open-state engine")]
struct Cli {
    /// Path to a TOML config file; unset fields keep their hardcoded defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    thread_pool_size: Option<usize>,

    #[arg(long)]
    max_supersede_retries: Option<u32>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load_from_file(path).unwrap_or_else(|err| {
            tracing::error!(?err, path = %path.display(), "failed to load config file, using defaults");
            DaemonConfig::default()
        }),
        None => DaemonConfig::default(),
    };

    if let Some(size) = cli.thread_pool_size {
        config.thread_pool_size = size;
    }
    if let Some(retries) = cli.max_supersede_retries {
        config.max_supersede_retries = retries;
    }

    info!(?config, "nfs41-open-stated configured");
}
