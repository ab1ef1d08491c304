//! .sfp file reader

use crate::format::{
    FormatError, FpFile, FpHeader, FpMetadata, CHECKSUM, HEADER_SIZE, MAGIC, RECORD_SIZE, VERSION,
};
use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

pub struct FpReader;

impl FpReader {
    /// Read .sfp file
    pub fn read(path: &Path) -> Result<FpFile> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open .sfp file: {}", path.display()))?;

        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(FormatError::Truncated {
                needed: HEADER_SIZE as u64,
                available: len,
            })
            .with_context(|| format!("Failed to read .sfp file: {}", path.display()));
        }

        // SAFETY: the mapping is read-only and dropped before this function returns
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map .sfp file: {}", path.display()))?;

        Self::decode(&mmap).with_context(|| format!("Failed to read .sfp file: {}", path.display()))
    }

    /// Decode a complete .sfp image
    pub fn decode(bytes: &[u8]) -> Result<FpFile> {
        let available = bytes.len() as u64;
        if available < HEADER_SIZE as u64 {
            return Err(FormatError::Truncated {
                needed: HEADER_SIZE as u64,
                available,
            }
            .into());
        }

        let mut reader = Cursor::new(bytes);

        // Read header
        let header = Self::read_header(&mut reader)?;

        // Validate magic
        if header.magic != MAGIC {
            return Err(FormatError::BadMagic.into());
        }
        if header.version != VERSION {
            return Err(FormatError::UnsupportedVersion(header.version).into());
        }

        let expected_payload = header.num_fingerprints as u64 * RECORD_SIZE as u64;
        if header.payload_size != expected_payload {
            return Err(FormatError::PayloadSize {
                declared: header.payload_size,
                actual: expected_payload,
            }
            .into());
        }

        let needed = (HEADER_SIZE as u64)
            .checked_add(header.metadata_size as u64)
            .and_then(|n| n.checked_add(header.stored_payload_size()))
            .ok_or(FormatError::Truncated {
                needed: u64::MAX,
                available,
            })?;
        if available < needed {
            return Err(FormatError::Truncated { needed, available }.into());
        }

        // Read metadata
        let metadata = Self::read_metadata(&mut reader, header.metadata_size as usize)?;

        // Verify and unpack payload; `needed` fits in the image, so these offsets fit in usize
        let start = HEADER_SIZE + header.metadata_size as usize;
        let stored = &bytes[start..needed as usize];

        let actual = CHECKSUM.checksum(stored);
        if actual != header.checksum {
            return Err(FormatError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            }
            .into());
        }

        let payload = if header.is_compressed() {
            let mut payload = Vec::new();
            zstd::stream::read::Decoder::new(stored)
                .context("Failed to decompress fingerprint payload")?
                .take(header.payload_size.saturating_add(1))
                .read_to_end(&mut payload)
                .context("Failed to decompress fingerprint payload")?;
            payload
        } else {
            stored.to_vec()
        };

        if payload.len() as u64 != header.payload_size {
            return Err(FormatError::PayloadSize {
                declared: header.payload_size,
                actual: payload.len() as u64,
            }
            .into());
        }

        // Read fingerprints
        let fingerprints = Self::read_fingerprints(
            &mut Cursor::new(&payload[..]),
            header.num_fingerprints as usize,
        )?;

        Ok(FpFile {
            header,
            metadata,
            fingerprints,
        })
    }

    fn read_header<R: Read>(reader: &mut R) -> Result<FpHeader> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        let version = Self::read_u16(reader)?;
        let flags = Self::read_u16(reader)?;
        let metadata_size = Self::read_u32(reader)?;
        let num_fingerprints = Self::read_u32(reader)?;
        let payload_size = Self::read_u64(reader)?;
        let payload_size_compressed = Self::read_u64(reader)?;
        let checksum = Self::read_u64(reader)?;
        let reserved = Self::read_u64(reader)?;

        Ok(FpHeader {
            magic,
            version,
            flags,
            metadata_size,
            num_fingerprints,
            payload_size,
            payload_size_compressed,
            checksum,
            reserved,
        })
    }

    fn read_metadata<R: Read>(reader: &mut R, size: usize) -> Result<FpMetadata> {
        let mut metadata_bytes = vec![0u8; size];
        reader.read_exact(&mut metadata_bytes)?;

        bincode::deserialize(&metadata_bytes).context("Failed to decode .sfp metadata")
    }

    fn read_fingerprints<R: Read>(reader: &mut R, count: usize) -> Result<Vec<(u32, u32)>> {
        let mut fingerprints = Vec::with_capacity(count);

        for _ in 0..count {
            let address = Self::read_u32(reader)?;
            let anchor_time_ms = Self::read_u32(reader)?;

            fingerprints.push((address, anchor_time_ms));
        }

        Ok(fingerprints)
    }

    fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}
