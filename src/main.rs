//! identity-converge - main entry point
//!
//! Loads attribute files, then plans, renders, validates or converges the
//! identity server on this host.

use anyhow::{bail, Result};
use std::process::ExitCode;
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;

use identity_converge::cli::{Cli, Commands};
use identity_converge::config_file;
use identity_converge::converge::{converge, Declaration};
use identity_converge::engine::EngineOptions;
use identity_converge::host::system::LocalHost;
use identity_converge::sanity;

/// Initialize tracing; `RUST_LOG` wins over `--log-level`
fn init_logger(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logger(cli.log_level);
    debug!("CLI arguments parsed");

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the run completed but something failed.
fn run(cli: &Cli) -> Result<bool> {
    let store = config_file::load_store(cli.command.attribute_files())?;
    let mut host = LocalHost::new();

    match &cli.command {
        Commands::Converge { .. } => {
            if !cli.dry_run {
                sanity::run_preflight_checks();
            }
            let options = EngineOptions {
                dry_run: cli.dry_run,
            };
            let report = converge(&store, &mut host, options)?;
            println!("{}", report);
            for (unit, reason) in report.failures() {
                eprintln!("✗ {}: {}", unit, reason);
            }
            Ok(report.is_success())
        }
        Commands::Plan { .. } => {
            let declaration = Declaration::build(&store, &host)?;
            for line in declaration.plan()? {
                println!("{}", line);
            }
            Ok(true)
        }
        Commands::Render { file, .. } => {
            let declaration = Declaration::build(&store, &host)?;
            match declaration.files.get(*file) {
                Some(doc) => {
                    print!("{}", doc);
                    Ok(true)
                }
                None => bail!("{} is not rendered with the current attributes", file),
            }
        }
        Commands::Validate { .. } => {
            let declaration = Declaration::build(&store, &host)?;
            info!("Attribute validation successful");
            println!("✓ Attributes are valid: {} units declared", declaration.graph.len());
            Ok(true)
        }
    }
}
