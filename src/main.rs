//! Chunkvault - content-addressed caching for bundler output chunks
//!
//! Takes the chunk graph an external bundler already produced, rewrites
//! inter-chunk references to stable virtual identifiers, hashes the
//! rewritten bytes, and emits the manifest the runtime loader consumes to
//! serve chunks from a hash-addressed store with a network fallback.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod build;
mod cli;
mod config;
mod graph;
mod manifest;
mod rewriter;
mod runtime;
mod selector;
mod utils;

pub use cli::Cli;
pub use config::Config;

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chunkvault=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chunkvault=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    cli.execute().await
}
