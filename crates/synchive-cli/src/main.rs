mod commands;
mod logging;
mod progress;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use synchive_core::index_file;
use synchive_core::{AppConfig, AuditTrail, IndexSource, SyncEngine, SyncResult, Tee};
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let loaded = match &args.config {
        Some(path) => synchive_core::config::load_configuration_from(path),
        None => synchive_core::config::load_configuration(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let outcome = match args.command {
        Some(Commands::Sync {
            source,
            destination,
        }) => run_sync(config, source, destination),
        Some(Commands::ShowIndex { destination }) => {
            show_index(destination.or_else(|| config.destination.as_ref().map(PathBuf::from)))
                .map(|_| true)
        }
        Some(Commands::PrintConfig) => print_config(&config).map(|_| true),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(true)
        }
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            error!("Error: {:#}", err);
            process::exit(1);
        }
    }
}

/// Returns `false` when the run finished but reported per-file errors.
fn run_sync(
    mut config: AppConfig,
    source: Option<PathBuf>,
    destination: Option<PathBuf>,
) -> Result<bool> {
    if let Some(source) = source {
        config.source = Some(utf8_path(source)?);
    }
    if let Some(destination) = destination {
        config.destination = Some(utf8_path(destination)?);
    }

    let engine = SyncEngine::from_config(&config).context("Unable to set up sync")?;

    let audit = if config.audit_trail {
        match AuditTrail::open(engine.destination()) {
            Ok(audit) => Some(audit),
            Err(err) => {
                warn!("Audit trail disabled: {}", err);
                None
            }
        }
    } else {
        None
    };

    let reporter = CliReporter::new();
    let result = match &audit {
        Some(audit) => engine.run(&Tee(&reporter, audit)),
        None => engine.run(&reporter),
    }
    .context("Sync aborted")?;

    print_summary(&result);
    Ok(result.errors == 0)
}

fn utf8_path(path: PathBuf) -> Result<String> {
    match path.into_os_string().into_string() {
        Ok(path) => Ok(path),
        Err(raw) => bail!("Path {} is not valid UTF-8", Path::new(&raw).display()),
    }
}

fn print_summary(result: &SyncResult) {
    println!();
    let index_source = match &result.index_source {
        IndexSource::Persisted { skipped_lines, .. } if *skipped_lines > 0 => {
            format!("index file ({} lines skipped)", skipped_lines)
        }
        IndexSource::Persisted { .. } => "index file".to_string(),
        IndexSource::FreshScan => "fresh scan".to_string(),
    };
    info!(
        "Destination: {}, Source: {}, Compare: {}, Archive: {} (destination from {})",
        format!("{:.2}s", result.index_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.source_scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.compare_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.archive_duration.as_secs_f64()).green(),
        index_source,
    );
    info!(
        "{} files scanned, {} added, {} unchanged, {} moved to leftover",
        format!("{}", result.files_scanned).cyan(),
        format!("{}", result.files_added).green(),
        format!("{}", result.files_unchanged).cyan(),
        format!("{}", result.files_archived).yellow(),
    );
    info!(
        "{} directories created, {} empty directories removed",
        format!("{}", result.directories_created).cyan(),
        format!("{}", result.directories_pruned).cyan(),
    );
    if result.errors > 0 {
        warn!(
            "{} files could not be processed, see the log for details",
            format!("{}", result.errors).red()
        );
    }
    info!(
        "Index written to {} in {}",
        result.index_path.display(),
        format!("{:.2}s", result.total_duration().as_secs_f64()).green()
    );
}

fn show_index(destination: Option<PathBuf>) -> Result<()> {
    let Some(destination) = destination else {
        bail!("No destination directory given or configured");
    };
    let path = index_file::index_path(&destination);
    if !path.is_file() {
        bail!("No index file in {}", destination.display());
    }

    let persisted = index_file::read_index(&path)
        .with_context(|| format!("Unable to read {}", path.display()))?;
    print_index(&path, &persisted);
    Ok(())
}

fn print_index(path: &Path, persisted: &index_file::PersistedIndex) {
    match &persisted.header {
        Some(header) => println!(
            "{} {} {}, root={}",
            path.display(),
            header.tool.cyan(),
            header.version,
            header.root
        ),
        None => println!("{} {}", path.display(), "(no header)".yellow()),
    }

    for entry in persisted.index.iter() {
        println!(
            "  {:<60} {:>8}",
            entry.key().to_string(),
            format!("{}", entry.len()).cyan()
        );
    }

    println!(
        "{} directories, {} files",
        persisted.index.len(),
        persisted.index.file_count()
    );
    if persisted.skipped_lines > 0 {
        println!(
            "{}",
            format!("{} malformed lines skipped", persisted.skipped_lines).yellow()
        );
    }
}

fn print_config(config: &AppConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Unable to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
