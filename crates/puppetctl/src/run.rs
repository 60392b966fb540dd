//! Shared plumbing for the subcommands.
//!
//! Functions:
//!
//! - `initialise_tracing` configures logging.
//! - `open_fetcher` builds the resource fetcher every subcommand reads assets through.

use anyhow::{Context, Result};
use modelpack::ResourceFetcher;
use tracing_subscriber::EnvFilter;

pub fn initialise_tracing() {
    let default_filter =
        "warn,puppetctl=info,renderer=info,modelpack=info,lipsync=info,wgpu=error,naga=error";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn open_fetcher() -> Result<ResourceFetcher> {
    ResourceFetcher::new().context("failed to initialise resource fetcher")
}
