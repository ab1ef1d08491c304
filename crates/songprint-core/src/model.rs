//! Catalog and index data model

use serde::{Deserialize, Serialize};
use songprint_fp::FpJsonMetadata;
use std::fmt;

/// Hash key derived from a pair of spectral peaks
pub type Address = u32;

/// Millisecond offset of the anchor peak within its source audio
pub type AnchorTime = u32;

/// Catalog identity of a song. Assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(pub u32);

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload stored under an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Couple {
    pub anchor_time_ms: AnchorTime,
    pub song_id: SongId,
}

/// One (address, anchor time) tuple from the fingerprint generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub address: Address,
    pub anchor_time_ms: AnchorTime,
}

impl Fingerprint {
    pub fn new(address: Address, anchor_time_ms: AnchorTime) -> Self {
        Self {
            address,
            anchor_time_ms,
        }
    }

    /// Convert generator tuples
    pub fn from_pairs(pairs: &[(u32, u32)]) -> Vec<Fingerprint> {
        pairs
            .iter()
            .map(|&(address, anchor_time_ms)| Fingerprint::new(address, anchor_time_ms))
            .collect()
    }
}

/// A catalog row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    pub external_id: Option<String>,
    pub natural_key: String,
    /// False until the song's fingerprints are committed to the store
    pub indexed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Metadata for a song about to be registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub external_id: Option<String>,
}

impl NewSong {
    /// Blank external IDs are treated as absent
    pub fn new(title: impl Into<String>, artist: impl Into<String>, external_id: Option<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            external_id: external_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
        }
    }

    pub fn natural_key(&self) -> String {
        natural_key(&self.title, &self.artist)
    }
}

impl From<&FpJsonMetadata> for NewSong {
    fn from(meta: &FpJsonMetadata) -> Self {
        NewSong::new(meta.title.clone(), meta.artist.clone(), meta.external_id.clone())
    }
}

/// Outcome of a catalog registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub song_id: SongId,
    /// True when an unindexed row for the same song was reused
    pub resumed: bool,
}

/// The closed set of catalog access paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongLookup {
    Id(SongId),
    ExternalId(String),
    NaturalKey(String),
    /// Case-insensitive substring of the title; lowest (title, id) wins
    TitleContains(String),
}

impl SongLookup {
    pub fn by_title_and_artist(title: &str, artist: &str) -> Self {
        SongLookup::NaturalKey(natural_key(title, artist))
    }
}

/// Normalized title + artist: lowercase, whitespace runs collapsed
pub fn natural_key(title: &str, artist: &str) -> String {
    format!("{}---{}", fold(title), fold(artist))
}

/// True when the first `---` of the title's natural key is the separator.
///
/// A folded title that contains `---` or ends with `-` could collide with a
/// different title and artist split.
pub fn natural_key_is_unambiguous(title: &str) -> bool {
    let folded = fold(title);
    !folded.contains("---") && !folded.ends_with('-')
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
