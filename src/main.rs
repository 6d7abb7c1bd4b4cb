use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gallery_sync::catalog::{open_store, update_photo_metadata};
use gallery_sync::config::AppConfig;
use gallery_sync::sync::{run_sync, LibrarySyncEngine, SyncReport};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gallery-sync", version, about = "Keeps a photo catalog and its thumbnails in step with a directory of originals")]
struct Cli {
    /// Extra configuration file layered over config/default and config/local.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the originals directory with the catalog.
    Sync,
    /// List supported originals that have no catalog record.
    Missing,
    /// Edit the title, description and date of one photo.
    SetMetadata {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        date_taken: Option<String>,
    },
}

fn print_report(report: &SyncReport) {
    println!("{} photos in catalog", report.catalog.len());
    for duplicate in &report.duplicates {
        println!("duplicate: {} ({})", duplicate.filename, duplicate.hash);
    }
    for filename in &report.unsupported {
        println!("unsupported: {}", filename);
    }
    for filename in &report.unreadable {
        println!("unreadable: {}", filename);
    }
    for filename in &report.pruned {
        println!("removed: {}", filename);
    }
    for copy in &report.verbatim_fallbacks {
        println!("copied without resizing: {} {} -> {}", copy.filename, copy.size, copy.path.display());
    }
    for missing in &report.thumbnails_missing {
        println!("missing thumbnail: {} {} -> {}", missing.filename, missing.size, missing.path.display());
    }
    println!("{} thumbnails generated", report.thumbnails_generated);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting gallery-sync");

    let mut store = open_store(config.catalog_backend, &config.catalog_path, config.record_defaults())
        .with_context(|| format!("opening catalog {}", config.catalog_path.display()))?;
    let engine = LibrarySyncEngine::from_config(&config);

    match cli.command {
        Command::Sync => {
            let report = run_sync(&engine, store.as_mut(), config.backup_directory.as_deref())?;
            print_report(&report);
        }
        Command::Missing => {
            let catalog = store.load()?;
            for filename in engine.find_untracked_photos(&catalog)? {
                println!("{}", filename);
            }
        }
        Command::SetMetadata { id, title, description, date_taken } => {
            let mut catalog = store.load()?;
            let record = update_photo_metadata(&mut catalog, &id, &title, &description, date_taken.as_deref())?;
            println!("updated {} ({})", record.id, record.filename);
            store.save(&catalog)?;
        }
    }

    info!("gallery-sync finished");
    Ok(())
}
