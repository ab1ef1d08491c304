//! Songprint Core - Fingerprint Indexing and Matching
//!
//! Stores fingerprints produced by an external generator in an inverted
//! index and identifies songs from a query's fingerprint set by the
//! temporal coherence of address hits.

pub mod config;
pub mod error;
pub mod library;
pub mod matching;
pub mod model;
pub mod registrar;
pub mod storage_backend;
pub mod storage_config;

pub use config::MatcherConfig;
pub use error::{KeyField, LibraryError, Result};
pub use library::{Library, SongMatch};
pub use matching::{rank_candidates, score_candidates, Candidate, Matcher};
pub use model::{
    natural_key, Address, AnchorTime, Couple, Fingerprint, NewSong, Registration, Song, SongId,
    SongLookup,
};
pub use registrar::{RegisterOutcome, Registrar};
pub use storage_backend::{
    FingerprintStore, MemoryCatalog, MemoryStore, PostgresCatalog, PostgresStore, SongCatalog,
};
pub use storage_config::{BackendKind, PostgresqlConfig, SongprintConfig, StorageConfig};
