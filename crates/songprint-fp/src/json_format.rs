//! JSON/BSON format for fingerprint files
//!
//! Human-readable interchange format written by the fingerprint generator:
//! song metadata plus the flat list of (address, anchor time) pairs.

use crate::format::{FpFile, FpMetadata};
use crate::reader::FpReader;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete JSON fingerprint file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpJsonFile {
    pub version: String,
    pub metadata: FpJsonMetadata,
    pub fingerprints: Vec<FpJsonFingerprint>,
}

/// Metadata about the fingerprinted song
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpJsonMetadata {
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub duration_ms: u32,
    #[serde(default)]
    pub created_at: String,
}

/// Individual fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpJsonFingerprint {
    pub address: u32,
    pub anchor_time_ms: u32,
}

impl FpJsonFile {
    /// Create a new JSON fingerprint file
    pub fn new(
        title: String,
        artist: String,
        external_id: Option<String>,
        source_path: String,
        duration_ms: u32,
    ) -> Self {
        Self {
            version: "1.0".to_string(),
            metadata: FpJsonMetadata {
                title,
                artist,
                external_id,
                source_path,
                duration_ms,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
            fingerprints: Vec::new(),
        }
    }

    /// Append (address, anchor_time_ms) pairs
    pub fn add_fingerprints(&mut self, fingerprints: &[(u32, u32)]) {
        self.fingerprints
            .extend(fingerprints.iter().map(|&(address, anchor_time_ms)| FpJsonFingerprint {
                address,
                anchor_time_ms,
            }));
    }

    /// Save to JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json_str = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json_str)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let fp_file: FpJsonFile = serde_json::from_str(&json_str)
            .with_context(|| format!("Failed to parse JSON fingerprints: {}", path.display()))?;
        Ok(fp_file)
    }

    /// Save to BSON file
    pub fn save_bson(&self, path: &Path) -> Result<()> {
        let bytes = bson::to_vec(self).context("Failed to encode BSON fingerprints")?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load from BSON file
    pub fn load_bson(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let fp_file: FpJsonFile = bson::from_slice(&bytes)
            .with_context(|| format!("Failed to parse BSON fingerprints: {}", path.display()))?;
        Ok(fp_file)
    }

    /// Load any supported fingerprint file, choosing the decoder by extension
    /// (`.json`, `.bson`, `.sfp`)
    pub fn load_auto(path: &Path) -> Result<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::load(path),
            Some("bson") => Self::load_bson(path),
            Some("sfp") => Ok(FpReader::read(path)?.into()),
            other => anyhow::bail!(
                "Unsupported fingerprint file extension {:?}: {}",
                other,
                path.display()
            ),
        }
    }

    /// Get all fingerprints as (address, anchor_time_ms) tuples
    pub fn get_all_fingerprints(&self) -> Vec<(u32, u32)> {
        self.fingerprints
            .iter()
            .map(|fp| (fp.address, fp.anchor_time_ms))
            .collect()
    }

    /// Binary metadata block for the .sfp writer
    pub fn to_fp_metadata(&self) -> FpMetadata {
        FpMetadata {
            title: self.metadata.title.clone(),
            artist: self.metadata.artist.clone(),
            external_id: self.metadata.external_id.clone(),
            source_path: self.metadata.source_path.clone(),
            duration_ms: self.metadata.duration_ms,
        }
    }
}

impl From<FpFile> for FpJsonFile {
    fn from(fp_file: FpFile) -> Self {
        let meta = fp_file.metadata;
        let mut json = FpJsonFile::new(
            meta.title,
            meta.artist,
            meta.external_id,
            meta.source_path,
            meta.duration_ms,
        );
        json.add_fingerprints(&fp_file.fingerprints);
        json
    }
}

/// Returns true when `path` carries an extension `load_auto` understands
pub fn is_fingerprint_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext == "json" || ext == "bson" || ext == "sfp")
        .unwrap_or(false)
}
