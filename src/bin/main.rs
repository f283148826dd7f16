//! regvault binary.
//!
//! Command-line front end for the version-controlled service registry: inspect
//! and edit service definitions as an administrator (against master) or as a
//! user (against a private working copy), then publish the result.

use clap::Parser;
use regvault_core::cli::{
    commands::{Commands, LoggingOptions, RegistryOptions},
    handle_command,
};
use tracing::debug;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub registry: RegistryOptions,

    #[command(flatten)]
    pub logging: LoggingOptions,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = cli.logging.get_effective_level();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.parse().unwrap_or(LevelFilter::WARN).into())
                .parse_lossy(cli.logging.log_filter.as_deref().unwrap_or("")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    debug!("regvault starting up");

    handle_command(&cli.registry, cli.command).await
}
