//! Storage backend traits and implementations
//!
//! Two independent seams: the fingerprint index and the song catalog. Each
//! backend owns its handle (a lock-protected map or a connection pool) and
//! is injected into the matcher and registrar as an `Arc<dyn …>`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;
use crate::model::{Address, Couple, NewSong, Registration, Song, SongId, SongLookup};

mod memory;
mod postgres;

pub use memory::{MemoryCatalog, MemoryStore};
pub use postgres::{connect, PostgresCatalog, PostgresStore};

/// How long a registration may hold an unindexed row before another
/// registration of the same song may take it over
pub const REGISTRATION_CLAIM_TTL: Duration = Duration::from_secs(600);

/// Inverted index from address to couples
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Upsert every couple under its address. The batch becomes visible to
    /// readers all at once or not at all; identical triples are no-ops.
    async fn put(&self, entries: &[(Address, Couple)]) -> Result<()>;

    /// Couples stored under each requested address. Every requested address
    /// is a key of the result, mapped to an empty vector when it has none.
    async fn batch_get(&self, addresses: &[Address]) -> Result<HashMap<Address, Vec<Couple>>>;

    /// Remove every couple of one song, returning how many were removed
    async fn delete_song(&self, song_id: SongId) -> Result<u64>;

    /// Remove every couple
    async fn clear(&self) -> Result<()>;

    /// Total stored couples
    async fn count(&self) -> Result<u64>;
}

/// Song metadata with unique natural key and external ID
#[async_trait]
pub trait SongCatalog: Send + Sync {
    /// Create a row for `song`, or resume an unindexed row with the same
    /// natural key that nobody currently claims. The returned row is claimed
    /// by the caller until `mark_indexed` or `release`. Fails with
    /// `DuplicateKey` on any other collision, including a live claim.
    async fn register(&self, song: &NewSong) -> Result<Registration>;

    /// Record that the song's fingerprints are committed and drop the claim
    async fn mark_indexed(&self, song_id: SongId) -> Result<()>;

    /// Drop the claim on an unindexed row so a later registration can
    /// resume it
    async fn release(&self, song_id: SongId) -> Result<()>;

    async fn lookup(&self, by: &SongLookup) -> Result<Option<Song>>;

    /// Remove the catalog row only; returns false when it did not exist
    async fn delete(&self, song_id: SongId) -> Result<bool>;

    /// All songs ordered by title, then identity
    async fn list(&self) -> Result<Vec<Song>>;

    async fn count(&self) -> Result<u64>;

    async fn clear(&self) -> Result<()>;
}
