//! Shared plumbing for the songprint binaries

pub mod output;

use anyhow::{Context, Result};
use rayon::prelude::*;
use songprint_core::SongprintConfig;
use songprint_fp::{is_fingerprint_file, FpJsonFile};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "config.toml";

/// Initialize env_logger; `RUST_LOG` still overrides the default filter
pub fn init_logger(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

/// Load the TOML configuration.
///
/// An explicit path must exist. Without one, `config.toml` is used when
/// present and the in-memory defaults otherwise.
pub fn load_config(path: Option<&str>) -> Result<SongprintConfig> {
    let (path, explicit) = match path {
        Some(p) => (Path::new(p), true),
        None => (Path::new(DEFAULT_CONFIG), false),
    };

    if !explicit && !path.exists() {
        log::info!("No {} found, using in-memory storage", DEFAULT_CONFIG);
        return Ok(SongprintConfig::default_memory());
    }

    let config = SongprintConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    log::info!("Loaded configuration from: {}", path.display());
    log::info!("Storage backend: {:?}", config.storage.backend);
    Ok(config)
}

/// Expand arguments into fingerprint files; directories are scanned one
/// level deep. Results are sorted for a stable registration order.
pub fn collect_fingerprint_files<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            let entries = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {}", input.display()))?;
            files.extend(
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.is_file() && is_fingerprint_file(path)),
            );
        } else if input.exists() {
            files.push(input.to_path_buf());
        } else {
            anyhow::bail!("Fingerprint file not found: {}", input.display());
        }
    }
    files.sort();
    Ok(files)
}

/// Load every file in parallel, keeping load failures beside the results
pub fn load_fingerprint_files(
    paths: &[PathBuf],
) -> (Vec<(PathBuf, FpJsonFile)>, Vec<(PathBuf, anyhow::Error)>) {
    let load_start = std::time::Instant::now();
    let (loaded, failed): (Vec<_>, Vec<_>) = paths
        .par_iter()
        .map(|path| {
            log::debug!("Loading: {}", path.display());
            FpJsonFile::load_auto(path)
                .map(|file| (path.clone(), file))
                .map_err(|e| (path.clone(), e))
        })
        .partition(|result| result.is_ok());

    let loaded: Vec<_> = loaded.into_iter().filter_map(|r| r.ok()).collect();
    let failed: Vec<_> = failed.into_iter().filter_map(|r| r.err()).collect();

    log::info!(
        "Loaded {} fingerprint files in {:.2}s ({} failed)",
        loaded.len(),
        load_start.elapsed().as_secs_f64(),
        failed.len()
    );
    (loaded, failed)
}
