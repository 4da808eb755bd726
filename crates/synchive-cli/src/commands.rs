use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "synchive")]
#[command(about = "One-way directory backup with a checksum index", long_about = None)]
pub struct Cli {
    /// Configuration file to use instead of `Config.toml` in the working directory
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Copy new source files to the destination and archive the ones the source dropped
    Sync {
        /// Source directory (overrides the configured `source`)
        source: Option<PathBuf>,
        /// Destination directory (overrides the configured `destination`)
        destination: Option<PathBuf>,
    },
    /// Summarize the index file stored in a destination
    ShowIndex {
        /// Destination directory (defaults to the configured `destination`)
        destination: Option<PathBuf>,
    },
    /// Print configuration values
    PrintConfig,
}
