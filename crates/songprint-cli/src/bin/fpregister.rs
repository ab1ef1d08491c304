//! fpregister - Register fingerprint files in the song library
//!
//! Usage:
//!   fpregister <files or dirs...>                    # Uses config.toml
//!   fpregister --config <path> <files or dirs...>    # Uses custom config

use anyhow::{Context, Result};
use clap::Parser;
use songprint_cli::{collect_fingerprint_files, load_config, load_fingerprint_files};
use songprint_core::{BackendKind, Library, LibraryError};

#[derive(Parser, Debug)]
#[command(name = "fpregister")]
#[command(about = "Register fingerprint files in the song library", long_about = None)]
struct Args {
    /// Path to configuration file (TOML). If not provided, uses config.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Fingerprint files (.json, .bson, .sfp) or directories containing them
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    registered: usize,
    resumed: usize,
    skipped: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    songprint_cli::init_logger(args.verbose);

    let config = load_config(args.config.as_deref())?;
    if config.storage.backend == BackendKind::Memory {
        log::warn!("In-memory backend selected: registrations are lost when fpregister exits");
    }
    let library = Library::open(&config)
        .await
        .context("Failed to open song library")?;

    let files = collect_fingerprint_files(&args.inputs)?;
    log::info!("Found {} fingerprint files, loading in parallel...", files.len());

    let (loaded, load_failures) = load_fingerprint_files(&files);
    for (path, e) in &load_failures {
        log::error!("Failed to load {}: {:#}", path.display(), e);
    }

    let mut summary = Summary {
        failed: load_failures.len(),
        ..Default::default()
    };

    for (path, file) in &loaded {
        match library.register_fp_file(file).await {
            Ok(outcome) => {
                log::info!(
                    "Registered '{}' by '{}' as song {} ({} fingerprints)",
                    file.metadata.title,
                    file.metadata.artist,
                    outcome.song_id,
                    outcome.fingerprints
                );
                summary.registered += 1;
                if outcome.resumed {
                    summary.resumed += 1;
                }
            }
            Err(e @ LibraryError::DuplicateKey { .. }) => {
                log::info!("Skipping {}: {}", path.display(), e);
                summary.skipped += 1;
            }
            Err(e) => {
                log::error!("Failed to register {}: {}", path.display(), e);
                summary.failed += 1;
            }
        }
    }

    log::info!("Registration summary:");
    log::info!("   Total files:  {}", files.len());
    log::info!("   Registered:   {} ({} resumed)", summary.registered, summary.resumed);
    log::info!("   Skipped:      {}", summary.skipped);
    log::info!("   Failed:       {}", summary.failed);
    log::info!("   Library size: {} songs", library.count().await?);

    if summary.failed > 0 {
        anyhow::bail!("{} files failed to register", summary.failed);
    }

    Ok(())
}
