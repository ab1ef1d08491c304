//! fpmatcher - Fingerprint matcher
//!
//! Usage:
//!   fpmatcher <query_fp>                      # Uses config.toml
//!   fpmatcher --config <path> <query_fp>      # Uses custom config
//!   fpmatcher --db-dir <dir> <query_fp>       # In-memory library built from a directory

use anyhow::{Context, Result};
use clap::Parser;
use songprint_cli::output::print_json_results;
use songprint_cli::{collect_fingerprint_files, load_config, load_fingerprint_files};
use songprint_core::{Fingerprint, Library, LibraryError};
use songprint_fp::FpJsonFile;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "fpmatcher")]
#[command(about = "Match a query fingerprint file against the song library", long_about = None)]
struct Args {
    /// Path to configuration file (TOML). If not provided, uses config.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Build an in-memory library from the fingerprint files in this
    /// directory instead of using the configured backend
    #[arg(long)]
    db_dir: Option<String>,

    /// Override the number of results
    #[arg(long)]
    top_k: Option<usize>,

    /// Query fingerprint file
    query: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    songprint_cli::init_logger(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(top_k) = args.top_k {
        config.matching.top_k = top_k;
    }

    let query_path = Path::new(&args.query);
    if !query_path.exists() {
        anyhow::bail!("Query file not found: {}", query_path.display());
    }

    let library = match &args.db_dir {
        Some(db_dir) => preload_library(db_dir, &config.matching).await?,
        None => Library::open(&config)
            .await
            .context("Failed to open song library")?,
    };

    log::info!("Loading query: {}", query_path.display());
    let query_file = FpJsonFile::load_auto(query_path)?;
    let query = Fingerprint::from_pairs(&query_file.get_all_fingerprints());
    log::info!("Query has {} fingerprints", query.len());

    let match_start = std::time::Instant::now();
    let results = library.match_fingerprints(&query).await?;
    log::info!(
        "Matching completed in {:.3}s, found {} results",
        match_start.elapsed().as_secs_f64(),
        results.len()
    );

    print_json_results(&args.query, &results);

    Ok(())
}

async fn preload_library(
    db_dir: &str,
    config: &songprint_core::MatcherConfig,
) -> Result<Library> {
    let db_path = Path::new(db_dir);
    if !db_path.is_dir() {
        anyhow::bail!("Database directory not found: {}", db_path.display());
    }

    log::info!("Loading database from: {}", db_path.display());
    let files = collect_fingerprint_files(&[db_path])?;
    let (loaded, failures) = load_fingerprint_files(&files);
    for (path, e) in &failures {
        log::warn!("Failed to load {}: {:#}", path.display(), e);
    }

    config.validate()?;
    let library = Library::in_memory(config.clone());
    for (path, file) in &loaded {
        match library.register_fp_file(file).await {
            Ok(_) => {}
            Err(e @ LibraryError::DuplicateKey { .. }) => {
                log::warn!("Skipping {}: {}", path.display(), e)
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to index {}", path.display())),
        }
    }

    log::info!("In-memory library holds {} songs", library.count().await?);
    Ok(library)
}
