//! Error taxonomy shared by the catalog, the fingerprint store, the
//! registrar and the matcher.
//!
//! A lookup miss is not an error: catalog lookups return `Option::None` and
//! addresses without couples come back as empty vectors.

use crate::model::SongId;
use songprint_db::DbError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LibraryError>;

/// Which unique catalog key a registration collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    NaturalKey,
    ExternalId,
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyField::NaturalKey => f.write_str("natural key"),
            KeyField::ExternalId => f.write_str("external id"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    /// Registration conflicts with an existing catalog row
    #[error("duplicate {field}: {value}")]
    DuplicateKey { field: KeyField, value: String },

    /// Transient backend failure (connection, lock, deadline); retryable
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Malformed song metadata or fingerprint set
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The catalog row exists but its fingerprint batch was rolled back.
    /// Registering the same song again resumes the write.
    #[error("fingerprints of song {song_id} were not written: {reason}")]
    PartialWriteFailure { song_id: SongId, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl LibraryError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LibraryError::StorageUnavailable(_) | LibraryError::PartialWriteFailure { .. }
        )
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, LibraryError::DuplicateKey { .. })
    }
}

impl From<DbError> for LibraryError {
    fn from(err: DbError) -> Self {
        LibraryError::StorageUnavailable(err.to_string())
    }
}
