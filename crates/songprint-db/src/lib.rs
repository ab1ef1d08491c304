//! Songprint Database Layer
//!
//! PostgreSQL integration for the song catalog and the fingerprint index

pub mod connection;
pub mod error;
pub mod models;
pub mod operations;

// Re-export commonly used types
pub use connection::{create_pool, ensure_schema, test_connection, ConnectionParams, DbPool};
pub use error::{DbError, DbResult};
pub use models::{Fingerprint, NewSong, RegisteredSong, Song};
pub use operations::{
    count_fingerprints, count_songs, delete_all_fingerprints, delete_all_songs,
    delete_fingerprints_by_song, delete_song, get_all_songs, get_fingerprints_by_addresses,
    get_song_by_external_id, get_song_by_id, get_song_by_natural_key,
    get_song_by_title_fragment, insert_fingerprints_batch, mark_song_indexed, register_song,
    release_song_claim, EXTERNAL_ID_CONSTRAINT, NATURAL_KEY_CONSTRAINT,
};
