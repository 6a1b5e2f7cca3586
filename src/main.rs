use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod core;
mod error;
mod iso;
mod utils;

use crate::cli::Commands;
use crate::core::Builder;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "onion-farmer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("onion_farmer={},warn", log_level))
        .init();

    info!("onion-farmer v{} starting", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Build {
            iso,
            output,
            config,
            keep_workspace,
            templates,
            partition_tables,
        } => {
            info!("Building provisioned ISO from {}", iso.display());

            let config = config::load_config(&config)
                .with_context(|| format!("Failed to load config file: {}", config.display()))?;

            let mut builder = Builder::new(config, iso, output);
            builder.set_keep_workspace(keep_workspace);
            builder.set_templates_dir(templates);
            builder.set_partition_tables_dir(partition_tables);

            builder.build().await
        }
        Commands::Validate { config } => {
            info!("Validating configuration: {}", config.display());
            config::validate_config(&config)
        }
    };

    match result {
        Ok(_) => {
            info!("✓ Operation completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("✗ Operation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
