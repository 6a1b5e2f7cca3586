use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Build a customized installer ISO
    Build {
        /// Path to the stock installer ISO
        iso: PathBuf,
        /// Destination for the built ISO
        #[arg(short, long, default_value = "/tmp/seconion.iso")]
        output: PathBuf,
        /// Path to the YAML host configuration
        #[arg(short, long)]
        config: PathBuf,
        /// Leave the scratch directories (and source mount) in place after
        /// the build
        #[arg(long)]
        keep_workspace: bool,
        /// Directory of provisioning templates
        #[arg(long, default_value = "templates")]
        templates: PathBuf,
        /// Directory of partition-table files referenced by host entries
        #[arg(long, default_value = "partition_tables")]
        partition_tables: PathBuf,
    },
    /// Validate a host configuration without building
    Validate {
        /// Path to the YAML host configuration
        config: PathBuf,
    },
}
