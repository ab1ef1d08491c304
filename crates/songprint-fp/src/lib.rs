//! Songprint fingerprint file format library

pub mod format;
pub mod json_format;
pub mod reader;
pub mod writer;

pub use format::{FormatError, FpFile, FpHeader, FpMetadata, MAGIC, VERSION};
pub use json_format::{is_fingerprint_file, FpJsonFile, FpJsonFingerprint, FpJsonMetadata};
pub use reader::FpReader;
pub use writer::FpWriter;
