//! Command-line interface for Chunkvault
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: rewrite chunks, hash them, emit the manifest
//! - `inspect`: print the contents of a build manifest
//! - `warm`: seed the local content store from a built output

mod build;
mod inspect;
mod warm;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::{BuildCommand, BuildOptions};
pub use inspect::InspectCommand;
pub use warm::WarmCommand;

/// Chunkvault - content-addressed caching for bundler output chunks
#[derive(Parser, Debug)]
#[command(name = "chunkvault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to chunkvault.toml config file
    #[arg(short, long, global = true, default_value = "chunkvault.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rewrite chunks, hash them, and emit the manifest
    Build(BuildCommand),

    /// Print the chunk table of a build manifest
    Inspect(InspectCommand),

    /// Seed the local content store from a built output
    Warm(WarmCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Inspect(cmd) => cmd.execute(&self.config).await,
            Commands::Warm(cmd) => cmd.execute(&self.config).await,
        }
    }
}

/// Print the Chunkvault banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "◈".cyan(),
        "Chunkvault".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
