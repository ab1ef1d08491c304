//! .sfp file format structures

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Magic bytes for .sfp files: "SPFP"
pub const MAGIC: [u8; 4] = [0x53, 0x50, 0x46, 0x50];

/// Current format version
pub const VERSION: u16 = 1;

/// Header size in bytes (fixed)
pub const HEADER_SIZE: usize = 48;

/// Size of one fingerprint record: address (u32) + anchor time (u32)
pub const RECORD_SIZE: usize = 8;

/// CRC-64 used for the payload checksum
pub const CHECKSUM: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_ECMA_182);

/// File header (48 bytes fixed size, little-endian)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FpHeader {
    /// Magic bytes: "SPFP"
    pub magic: [u8; 4],
    /// Format version
    pub version: u16,
    /// Flags (bit 0: compressed)
    pub flags: u16,
    /// Size of the bincode metadata section
    pub metadata_size: u32,
    /// Number of fingerprints
    pub num_fingerprints: u32,
    /// Size of payload (uncompressed)
    pub payload_size: u64,
    /// Compressed payload size (0 if uncompressed)
    pub payload_size_compressed: u64,
    /// CRC-64 of the payload bytes as stored on disk
    pub checksum: u64,
    /// Reserved
    pub reserved: u64,
}

impl FpHeader {
    pub fn new(metadata_size: u32, num_fingerprints: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            metadata_size,
            num_fingerprints,
            payload_size: num_fingerprints as u64 * RECORD_SIZE as u64,
            payload_size_compressed: 0,
            checksum: 0,
            reserved: 0,
        }
    }

    pub fn is_compressed(&self) -> bool {
        (self.flags & 0x1) != 0
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        if compressed {
            self.flags |= 0x1;
        } else {
            self.flags &= !0x1;
        }
    }

    /// Number of payload bytes that follow the metadata section
    pub fn stored_payload_size(&self) -> u64 {
        if self.is_compressed() {
            self.payload_size_compressed
        } else {
            self.payload_size
        }
    }
}

/// Song metadata carried by a fingerprint file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpMetadata {
    pub title: String,
    pub artist: String,
    pub external_id: Option<String>,
    /// Path of the audio the fingerprints were generated from
    pub source_path: String,
    pub duration_ms: u32,
}

/// Complete .sfp file structure
#[derive(Debug, Clone)]
pub struct FpFile {
    pub header: FpHeader,
    pub metadata: FpMetadata,
    /// Fingerprint data: (address, anchor_time_ms)
    pub fingerprints: Vec<(u32, u32)>,
}

impl FpFile {
    pub fn new(metadata: FpMetadata, fingerprints: Vec<(u32, u32)>) -> Self {
        Self {
            header: FpHeader::new(0, fingerprints.len() as u32),
            metadata,
            fingerprints,
        }
    }
}

/// Structural problems detected while decoding a .sfp file
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid .sfp file: magic bytes mismatch")]
    BadMagic,

    #[error("unsupported .sfp version {0}")]
    UnsupportedVersion(u16),

    #[error("truncated .sfp file: need {needed} bytes, have {available}")]
    Truncated { needed: u64, available: u64 },

    #[error("payload checksum mismatch (header {expected:#018x}, computed {actual:#018x})")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("payload holds {actual} bytes, header declares {declared}")]
    PayloadSize { declared: u64, actual: u64 },
}
