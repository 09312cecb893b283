use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

use crate::render::ConfigFile;

/// identity-converge - idempotent convergence for an identity-service node
#[derive(Parser)]
#[command(name = "identity-converge")]
#[command(about = "Resolve attributes and converge this host to the declared identity server")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: diff every unit and report what would change.
    ///
    /// No package, file, service or scheduled job is touched and
    /// notifications are only reported.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log level (overridden by RUST_LOG when set)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Converge this host
    Converge {
        /// Attribute files, applied in order on top of the built-in defaults
        #[arg(short, long = "attributes", value_name = "FILE")]
        attributes: Vec<PathBuf>,
    },
    /// Print the ordered resource graph without touching the host
    Plan {
        #[arg(short, long = "attributes", value_name = "FILE")]
        attributes: Vec<PathBuf>,
    },
    /// Print a rendered configuration file
    Render {
        #[arg(short, long = "attributes", value_name = "FILE")]
        attributes: Vec<PathBuf>,
        /// Which file to print
        #[arg(short, long, default_value = "keystone-conf")]
        file: ConfigFile,
    },
    /// Resolve, compute, render and declare; report the first error
    Validate {
        #[arg(short, long = "attributes", value_name = "FILE")]
        attributes: Vec<PathBuf>,
    },
}

impl Commands {
    pub fn attribute_files(&self) -> &[PathBuf] {
        match self {
            Self::Converge { attributes }
            | Self::Plan { attributes }
            | Self::Render { attributes, .. }
            | Self::Validate { attributes } => attributes,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
