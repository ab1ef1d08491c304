use serde::{Deserialize, Serialize};

/// A row of the songs relation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub external_id: Option<String>,
    pub natural_key: String,
    pub indexed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Input structure for registering a song
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub external_id: Option<String>,
    pub natural_key: String,
}

/// Outcome of a catalog insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredSong {
    pub id: i64,
    /// True when an unindexed row with the same natural key was reused
    pub resumed: bool,
}

/// A row of the fingerprints relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub address: i64,
    pub anchor_time_ms: i64,
    pub song_id: i64,
}
