//! .sfp file writer

use crate::format::{FpHeader, FpMetadata, CHECKSUM, HEADER_SIZE, RECORD_SIZE};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct FpWriter {
    /// zstd level, `None` writes the payload uncompressed
    compression_level: Option<i32>,
}

impl FpWriter {
    pub fn new() -> Self {
        Self {
            compression_level: None,
        }
    }

    /// Compress the fingerprint payload with zstd at `level`
    pub fn with_compression(mut self, level: i32) -> Self {
        self.compression_level = Some(level);
        self
    }

    /// Write .sfp file
    pub fn write(
        &self,
        path: &Path,
        metadata: &FpMetadata,
        fingerprints: &[(u32, u32)],
    ) -> Result<()> {
        let bytes = self.encode(metadata, fingerprints)?;

        let file = File::create(path)
            .with_context(|| format!("Failed to create .sfp file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;

        Ok(())
    }

    /// Encode a complete .sfp image in memory
    pub fn encode(&self, metadata: &FpMetadata, fingerprints: &[(u32, u32)]) -> Result<Vec<u8>> {
        let metadata_bytes =
            bincode::serialize(metadata).context("Failed to serialize .sfp metadata")?;

        let mut payload = Vec::with_capacity(fingerprints.len() * RECORD_SIZE);
        self.write_fingerprints(&mut payload, fingerprints)?;

        let mut header = FpHeader::new(metadata_bytes.len() as u32, fingerprints.len() as u32);

        let stored = match self.compression_level {
            Some(level) => {
                let compressed = zstd::encode_all(&payload[..], level)
                    .context("Failed to compress fingerprint payload")?;
                header.set_compressed(true);
                header.payload_size_compressed = compressed.len() as u64;
                compressed
            }
            None => payload,
        };
        header.checksum = CHECKSUM.checksum(&stored);

        let mut out = Vec::with_capacity(HEADER_SIZE + metadata_bytes.len() + stored.len());
        self.write_header(&mut out, &header)?;
        out.write_all(&metadata_bytes)?;
        out.write_all(&stored)?;

        Ok(out)
    }

    fn write_header<W: Write>(&self, writer: &mut W, header: &FpHeader) -> Result<()> {
        // Write as little-endian binary
        writer.write_all(&header.magic)?;
        writer.write_all(&header.version.to_le_bytes())?;
        writer.write_all(&header.flags.to_le_bytes())?;
        writer.write_all(&header.metadata_size.to_le_bytes())?;
        writer.write_all(&header.num_fingerprints.to_le_bytes())?;
        writer.write_all(&header.payload_size.to_le_bytes())?;
        writer.write_all(&header.payload_size_compressed.to_le_bytes())?;
        writer.write_all(&header.checksum.to_le_bytes())?;
        writer.write_all(&header.reserved.to_le_bytes())?;

        Ok(())
    }

    fn write_fingerprints<W: Write>(
        &self,
        writer: &mut W,
        fingerprints: &[(u32, u32)],
    ) -> Result<()> {
        // 8 bytes per record
        for (address, anchor_time_ms) in fingerprints {
            writer.write_all(&address.to_le_bytes())?;
            writer.write_all(&anchor_time_ms.to_le_bytes())?;
        }

        Ok(())
    }
}

impl Default for FpWriter {
    fn default() -> Self {
        Self::new()
    }
}
