mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process;
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info};
use zapper_core::{AppConfig, Engine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = match zapper_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let _guard = logging::init_logger(&config);

    let args = Cli::parse();
    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return Ok(());
    };

    let start = Instant::now();
    match run(command, &config) {
        Ok(()) => info!(
            "Completed in {}",
            format!("{:.2}s", start.elapsed().as_secs_f64()).green()
        ),
        Err(err) => {
            error!("Error: {:#}", err);
            if err
                .downcast_ref::<zapper_core::Error>()
                .is_some_and(zapper_core::Error::is_invariant_violation)
            {
                process::exit(1);
            }
        }
    }

    Ok(())
}

fn open_engine(config: &AppConfig) -> anyhow::Result<Engine> {
    Engine::open(config.clone()).with_context(|| format!("opening database {}", config.db_path))
}

fn run(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    let reporter = CliReporter::new();

    match command {
        Commands::Crawl { path } => {
            let summary = open_engine(config)?.crawl(&path, &reporter)?;
            info!(
                "Crawled {}: {} folders, {} files, {} ignored",
                summary.root.display(),
                summary.folders.to_string().cyan(),
                summary.files.to_string().cyan(),
                summary.ignored.to_string().yellow(),
            );
        }
        Commands::Hash => {
            let summary = open_engine(config)?.hash_files(&reporter)?;
            info!(
                "{} files hashed, {} new hashes, {} duplicates",
                summary.files_hashed.to_string().cyan(),
                summary.new_hashes.to_string().green(),
                summary.duplicates.to_string().red(),
            );
            report_problems(summary.missing, summary.collisions, summary.skipped);
        }
        Commands::Size => {
            let summary = open_engine(config)?.size_files(&reporter)?;
            info!(
                "{} hashes sized, {} files updated",
                summary.hashes_sized.to_string().cyan(),
                summary.files_updated.to_string().cyan(),
            );
            report_problems(summary.missing, 0, 0);
        }
        Commands::Type => {
            let summary = open_engine(config)?.type_files(&reporter)?;
            info!(
                "{} hashes typed ({} new types), {} files updated",
                summary.hashes_typed.to_string().cyan(),
                summary.new_types.to_string().green(),
                summary.files_updated.to_string().cyan(),
            );
            report_problems(summary.missing, 0, 0);
        }
        Commands::DuplicateHashSanityCheck => {
            let summary = open_engine(config)?.duplicate_hash_sanity_check(&reporter)?;
            info!(
                "{} files checked, {} size mismatches, {} type mismatches, {} missing",
                summary.checked.to_string().cyan(),
                summary.size_mismatches.to_string().red(),
                summary.type_mismatches.to_string().red(),
                summary.missing.to_string().yellow(),
            );
        }
        Commands::Zap { destination, safe } => {
            let summary = open_engine(config)?.zap(destination.as_deref(), safe, &reporter)?;
            info!(
                "{} unique files zapped, {} duplicates zapped ({} removed), {} folders removed{}",
                summary.uniques_zapped.to_string().green(),
                summary.duplicates_zapped.to_string().green(),
                summary.duplicates_removed.to_string().red(),
                summary.pruned.folders_removed.to_string().cyan(),
                if summary.safe_mode { " (safe mode)" } else { "" },
            );
            info!(
                "{} bytes of unique content out of {} bytes, a reduction of {}",
                summary.totals.unique_bytes.to_string().cyan(),
                summary.totals.total_bytes.to_string().cyan(),
                format!("{:.2}%", summary.reduction_percentage()).green(),
            );
            report_problems(summary.missing, summary.collisions, 0);
        }
        Commands::Unzap {
            source,
            destination,
        } => {
            let summary = open_engine(config)?.unzap(&source, &destination, &reporter)?;
            info!(
                "{} files restored to {}",
                summary.files_restored.to_string().green(),
                destination.display(),
            );
            report_problems(summary.missing, summary.conflicts, summary.failed);
        }
        Commands::MergeZaps {
            source,
            destination,
        } => {
            let summary =
                zapper_core::store::merge_zaps(&source, &destination, config, &reporter)?;
            info!(
                "{} files moved, {} already present, {} conflicts",
                summary.moved.to_string().green(),
                summary.identical.to_string().cyan(),
                summary.conflicts.to_string().red(),
            );
        }
        Commands::ClearEmptyFolders { path } => {
            let summary = zapper_core::store::clear_empty_folders(&path)?;
            info!(
                "{} empty folders removed, {} junk files removed",
                summary.folders_removed.to_string().green(),
                summary.junk_removed.to_string().cyan(),
            );
        }
        Commands::Integrity { source } => {
            let summary = open_engine(config)?.integrity(source.as_deref(), &reporter)?;
            info!(
                "{} stored hashes checked, {} missing, {} size mismatches",
                summary.checked.to_string().cyan(),
                summary.missing.to_string().red(),
                summary.size_mismatches.to_string().red(),
            );
        }
        Commands::HashFile { path } => print_hash(&path)?,
        Commands::Purge => {
            let summary = open_engine(config)?.purge()?;
            info!(
                "{} files and {} folders purged",
                summary.files.to_string().red(),
                summary.paths.to_string().red(),
            );
        }
        Commands::PrintConfig => {
            println!("Configuration: {:?}", config);
        }
    }

    Ok(())
}

fn print_hash(path: &Path) -> anyhow::Result<()> {
    let hash = zapper_core::hasher::hash_file(path)
        .with_context(|| format!("hashing {}", path.display()))?;
    let hex = zapper_core::hasher::hash_to_hex(&hash)?;
    println!("{}", hash);
    println!("{}", hex.dimmed());
    Ok(())
}

fn report_problems(missing: usize, collisions: usize, skipped: usize) {
    if missing > 0 {
        info!("{} files no longer exist", missing.to_string().yellow());
    }
    if collisions > 0 {
        info!(
            "{} suspected collisions or conflicts, see the log",
            collisions.to_string().red()
        );
    }
    if skipped > 0 {
        info!("{} files skipped or failed, see the log", skipped.to_string().yellow());
    }
}
