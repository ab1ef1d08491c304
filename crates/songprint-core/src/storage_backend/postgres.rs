//! PostgreSQL-based backends

use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::collections::HashMap;

use super::{FingerprintStore, SongCatalog, REGISTRATION_CLAIM_TTL};
use crate::error::{KeyField, LibraryError, Result};
use crate::model::{Address, Couple, NewSong, Registration, Song, SongId, SongLookup};
use crate::storage_config::PostgresqlConfig;

/// Create the pool, verify it and make sure the schema exists.
///
/// The returned pool is cheap to clone; hand one clone to each backend.
pub async fn connect(config: &PostgresqlConfig) -> Result<Pool> {
    let pool = songprint_db::create_pool(&config.connection_params())
        .map_err(|e| LibraryError::Config(format!("invalid PostgreSQL settings: {e:#}")))?;

    songprint_db::test_connection(&pool)
        .await
        .map_err(|e| LibraryError::StorageUnavailable(format!("PostgreSQL unreachable: {e:#}")))?;
    songprint_db::ensure_schema(&pool)
        .await
        .map_err(|e| LibraryError::StorageUnavailable(format!("schema setup failed: {e:#}")))?;

    log::info!(
        "Connected to PostgreSQL at {}:{}/{}",
        config.host,
        config.port,
        config.database
    );
    Ok(pool)
}

fn song_id_from_db(id: i64) -> Result<SongId> {
    u32::try_from(id)
        .map(SongId)
        .map_err(|_| LibraryError::StorageUnavailable(format!("song id {} out of range", id)))
}

fn song_from_db(row: songprint_db::Song) -> Result<Song> {
    Ok(Song {
        id: song_id_from_db(row.id)?,
        title: row.title,
        artist: row.artist,
        external_id: row.external_id,
        natural_key: row.natural_key,
        indexed: row.indexed,
        created_at: row.created_at,
    })
}

/// Fingerprint index in the `fingerprints` relation
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FingerprintStore for PostgresStore {
    async fn put(&self, entries: &[(Address, Couple)]) -> Result<()> {
        let rows: Vec<songprint_db::Fingerprint> = entries
            .iter()
            .map(|(address, couple)| songprint_db::Fingerprint {
                address: *address as i64,
                anchor_time_ms: couple.anchor_time_ms as i64,
                song_id: couple.song_id.0 as i64,
            })
            .collect();

        let inserted = songprint_db::insert_fingerprints_batch(&self.pool, &rows).await?;
        log::debug!(
            "Upserted {} fingerprints ({} new)",
            rows.len(),
            inserted
        );
        Ok(())
    }

    async fn batch_get(&self, addresses: &[Address]) -> Result<HashMap<Address, Vec<Couple>>> {
        let keys: Vec<i64> = addresses.iter().map(|a| *a as i64).collect();
        let rows = songprint_db::get_fingerprints_by_addresses(&self.pool, &keys).await?;

        let mut hits: HashMap<Address, Vec<Couple>> =
            addresses.iter().map(|a| (*a, Vec::new())).collect();

        for row in rows {
            let (Ok(address), Ok(anchor_time_ms)) =
                (u32::try_from(row.address), u32::try_from(row.anchor_time_ms))
            else {
                log::warn!("Skipping out-of-range fingerprint row {:?}", row);
                continue;
            };
            hits.entry(address).or_default().push(Couple {
                anchor_time_ms,
                song_id: song_id_from_db(row.song_id)?,
            });
        }

        Ok(hits)
    }

    async fn delete_song(&self, song_id: SongId) -> Result<u64> {
        Ok(songprint_db::delete_fingerprints_by_song(&self.pool, song_id.0 as i64).await?)
    }

    async fn clear(&self) -> Result<()> {
        Ok(songprint_db::delete_all_fingerprints(&self.pool).await?)
    }

    async fn count(&self) -> Result<u64> {
        Ok(songprint_db::count_fingerprints(&self.pool).await?.max(0) as u64)
    }
}

/// Song catalog in the `songs` relation
pub struct PostgresCatalog {
    pool: Pool,
}

impl PostgresCatalog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SongCatalog for PostgresCatalog {
    async fn register(&self, song: &NewSong) -> Result<Registration> {
        let new_song = songprint_db::NewSong {
            title: song.title.clone(),
            artist: song.artist.clone(),
            external_id: song.external_id.clone(),
            natural_key: song.natural_key(),
        };

        let ttl = REGISTRATION_CLAIM_TTL.as_secs_f64();
        match songprint_db::register_song(&self.pool, &new_song, ttl).await {
            Ok(registered) => Ok(Registration {
                song_id: song_id_from_db(registered.id)?,
                resumed: registered.resumed,
            }),
            Err(err) => {
                let field = err.unique_constraint().map(|constraint| {
                    if constraint == songprint_db::EXTERNAL_ID_CONSTRAINT {
                        KeyField::ExternalId
                    } else {
                        KeyField::NaturalKey
                    }
                });
                match field {
                    Some(KeyField::ExternalId) => Err(LibraryError::DuplicateKey {
                        field: KeyField::ExternalId,
                        value: new_song.external_id.unwrap_or_default(),
                    }),
                    Some(KeyField::NaturalKey) => Err(LibraryError::DuplicateKey {
                        field: KeyField::NaturalKey,
                        value: new_song.natural_key,
                    }),
                    None => Err(err.into()),
                }
            }
        }
    }

    async fn mark_indexed(&self, song_id: SongId) -> Result<()> {
        songprint_db::mark_song_indexed(&self.pool, song_id.0 as i64).await?;
        Ok(())
    }

    async fn release(&self, song_id: SongId) -> Result<()> {
        songprint_db::release_song_claim(&self.pool, song_id.0 as i64).await?;
        Ok(())
    }

    async fn lookup(&self, by: &SongLookup) -> Result<Option<Song>> {
        let row = match by {
            SongLookup::Id(id) => songprint_db::get_song_by_id(&self.pool, id.0 as i64).await?,
            SongLookup::ExternalId(external_id) => {
                songprint_db::get_song_by_external_id(&self.pool, external_id).await?
            }
            SongLookup::NaturalKey(key) => {
                songprint_db::get_song_by_natural_key(&self.pool, key).await?
            }
            SongLookup::TitleContains(fragment) => {
                songprint_db::get_song_by_title_fragment(&self.pool, fragment).await?
            }
        };
        row.map(song_from_db).transpose()
    }

    async fn delete(&self, song_id: SongId) -> Result<bool> {
        Ok(songprint_db::delete_song(&self.pool, song_id.0 as i64).await?)
    }

    async fn list(&self) -> Result<Vec<Song>> {
        songprint_db::get_all_songs(&self.pool)
            .await?
            .into_iter()
            .map(song_from_db)
            .collect()
    }

    async fn count(&self) -> Result<u64> {
        Ok(songprint_db::count_songs(&self.pool).await?.max(0) as u64)
    }

    async fn clear(&self) -> Result<()> {
        let removed = songprint_db::delete_all_songs(&self.pool).await?;
        log::info!("Removed {} catalog rows", removed);
        Ok(())
    }
}
