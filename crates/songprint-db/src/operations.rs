use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::error::{DbError, DbResult, QueryContext};
use crate::models::*;

/// Constraint guarding one catalog row per normalized title + artist
pub const NATURAL_KEY_CONSTRAINT: &str = "songs_natural_key_key";
/// Constraint guarding one catalog row per external catalog ID
pub const EXTERNAL_ID_CONSTRAINT: &str = "songs_external_id_key";

/// Rows per INSERT statement inside a fingerprint batch transaction
const INSERT_CHUNK: usize = 10_000;

const SONG_COLUMNS: &str = "id, title, artist, external_id, natural_key, indexed, created_at";

fn row_to_song(r: &Row) -> Song {
    Song {
        id: r.get(0),
        title: r.get(1),
        artist: r.get(2),
        external_id: r.get(3),
        natural_key: r.get(4),
        indexed: r.get(5),
        created_at: r.get(6),
    }
}

/// Insert a catalog row, or take over an unindexed row with the same
/// natural key.
///
/// Either way the row leaves this call claimed by the caller until
/// [`mark_song_indexed`] or [`release_song_claim`]. A row that is indexed,
/// whose external ID disagrees with `song`, or whose claim is younger than
/// `claim_ttl_secs` is reported as a violation of [`NATURAL_KEY_CONSTRAINT`].
pub async fn register_song(pool: &Pool, song: &NewSong, claim_ttl_secs: f64) -> DbResult<RegisteredSong> {
    let mut client = pool.get().await?;
    let tx = client
        .transaction()
        .await
        .context("Failed to start registration transaction")?;

    let existing = tx
        .query_opt(
            "SELECT id, external_id, indexed,
                    COALESCE(claimed_at > now() - make_interval(secs => $2), FALSE)
             FROM songs WHERE natural_key = $1 FOR UPDATE",
            &[&song.natural_key, &claim_ttl_secs],
        )
        .await
        .context("Failed to check natural key")?;

    if let Some(row) = existing {
        let id: i64 = row.get(0);
        let external_id: Option<String> = row.get(1);
        let indexed: bool = row.get(2);
        let claimed: bool = row.get(3);

        let compatible = song.external_id.is_none() || song.external_id == external_id;
        if indexed || claimed || !compatible {
            return Err(DbError::UniqueViolation {
                constraint: NATURAL_KEY_CONSTRAINT.to_string(),
            });
        }

        tx.execute("UPDATE songs SET claimed_at = now() WHERE id = $1", &[&id])
            .await
            .context("Failed to claim song")?;
        tx.commit()
            .await
            .context("Failed to commit song registration")?;
        log::debug!("Resuming unindexed song {} ({})", id, song.natural_key);
        return Ok(RegisteredSong { id, resumed: true });
    }

    let row = tx
        .query_one(
            "INSERT INTO songs (title, artist, external_id, natural_key, claimed_at)
             VALUES ($1, $2, $3, $4, now())
             RETURNING id",
            &[
                &song.title,
                &song.artist,
                &song.external_id,
                &song.natural_key,
            ],
        )
        .await
        .context("Failed to insert song")?;

    tx.commit()
        .await
        .context("Failed to commit song registration")?;

    Ok(RegisteredSong {
        id: row.get(0),
        resumed: false,
    })
}

/// Flag a song whose fingerprints have been committed and drop its claim
pub async fn mark_song_indexed(pool: &Pool, id: i64) -> DbResult<bool> {
    let client = pool.get().await?;

    let updated = client
        .execute(
            "UPDATE songs SET indexed = TRUE, claimed_at = NULL WHERE id = $1",
            &[&id],
        )
        .await
        .context("Failed to mark song indexed")?;

    Ok(updated == 1)
}

/// Drop the claim on a song so a later registration can resume it
pub async fn release_song_claim(pool: &Pool, id: i64) -> DbResult<bool> {
    let client = pool.get().await?;

    let updated = client
        .execute("UPDATE songs SET claimed_at = NULL WHERE id = $1", &[&id])
        .await
        .context("Failed to release song claim")?;

    Ok(updated == 1)
}

/// Get song by ID
pub async fn get_song_by_id(pool: &Pool, id: i64) -> DbResult<Option<Song>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            &format!("SELECT {} FROM songs WHERE id = $1", SONG_COLUMNS),
            &[&id],
        )
        .await
        .context("Failed to get song by id")?;

    Ok(row.as_ref().map(row_to_song))
}

/// Get song by external catalog ID
pub async fn get_song_by_external_id(pool: &Pool, external_id: &str) -> DbResult<Option<Song>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            &format!("SELECT {} FROM songs WHERE external_id = $1", SONG_COLUMNS),
            &[&external_id],
        )
        .await
        .context("Failed to get song by external id")?;

    Ok(row.as_ref().map(row_to_song))
}

/// Get song by natural key
pub async fn get_song_by_natural_key(pool: &Pool, natural_key: &str) -> DbResult<Option<Song>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            &format!("SELECT {} FROM songs WHERE natural_key = $1", SONG_COLUMNS),
            &[&natural_key],
        )
        .await
        .context("Failed to get song by natural key")?;

    Ok(row.as_ref().map(row_to_song))
}

/// Get the first song (by title, then id) whose title contains `fragment`,
/// ignoring case. `strpos` keeps LIKE wildcards in the fragment literal.
pub async fn get_song_by_title_fragment(pool: &Pool, fragment: &str) -> DbResult<Option<Song>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            &format!(
                "SELECT {} FROM songs
                 WHERE strpos(lower(title), lower($1)) > 0
                 ORDER BY title, id
                 LIMIT 1",
                SONG_COLUMNS
            ),
            &[&fragment],
        )
        .await
        .context("Failed to get song by title")?;

    Ok(row.as_ref().map(row_to_song))
}

/// Get all songs ordered by title
pub async fn get_all_songs(pool: &Pool) -> DbResult<Vec<Song>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            &format!("SELECT {} FROM songs ORDER BY title, id", SONG_COLUMNS),
            &[],
        )
        .await
        .context("Failed to get all songs")?;

    Ok(rows.iter().map(row_to_song).collect())
}

/// Count catalog rows
pub async fn count_songs(pool: &Pool) -> DbResult<i64> {
    let client = pool.get().await?;

    let row = client
        .query_one("SELECT COUNT(*) FROM songs", &[])
        .await
        .context("Failed to count songs")?;

    Ok(row.get(0))
}

/// Delete a catalog row. Fingerprints are left to the caller.
pub async fn delete_song(pool: &Pool, id: i64) -> DbResult<bool> {
    let client = pool.get().await?;

    let deleted = client
        .execute("DELETE FROM songs WHERE id = $1", &[&id])
        .await
        .context("Failed to delete song")?;

    Ok(deleted == 1)
}

/// Delete every catalog row. The identity sequence is not reset.
pub async fn delete_all_songs(pool: &Pool) -> DbResult<u64> {
    let client = pool.get().await?;

    client
        .execute("DELETE FROM songs", &[])
        .await
        .context("Failed to delete all songs")
}

/// Upsert fingerprints in one transaction using JSONB batches.
///
/// Returns the number of rows that were new; identical triples are skipped.
pub async fn insert_fingerprints_batch(pool: &Pool, fingerprints: &[Fingerprint]) -> DbResult<u64> {
    if fingerprints.is_empty() {
        return Ok(0);
    }

    let mut client = pool.get().await?;
    let tx = client
        .transaction()
        .await
        .context("Failed to start fingerprint transaction")?;

    let mut inserted = 0;
    for chunk in fingerprints.chunks(INSERT_CHUNK) {
        // Build the JSONB array
        let json_array = serde_json::to_value(chunk)?;

        inserted += tx
            .execute(
                "INSERT INTO fingerprints (address, anchor_time_ms, song_id)
                 SELECT
                     (fp->>'address')::BIGINT,
                     (fp->>'anchor_time_ms')::BIGINT,
                     (fp->>'song_id')::BIGINT
                 FROM jsonb_array_elements($1::jsonb) AS fp
                 ON CONFLICT DO NOTHING",
                &[&json_array],
            )
            .await
            .context("Failed to batch insert fingerprints")?;
    }

    tx.commit()
        .await
        .context("Failed to commit fingerprint batch")?;

    Ok(inserted)
}

/// Get every fingerprint stored under any of `addresses` in one round trip
pub async fn get_fingerprints_by_addresses(
    pool: &Pool,
    addresses: &[i64],
) -> DbResult<Vec<Fingerprint>> {
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT address, anchor_time_ms, song_id
             FROM fingerprints
             WHERE address = ANY($1)",
            &[&addresses],
        )
        .await
        .context("Failed to get fingerprints by address")?;

    Ok(rows
        .iter()
        .map(|r| Fingerprint {
            address: r.get(0),
            anchor_time_ms: r.get(1),
            song_id: r.get(2),
        })
        .collect())
}

/// Delete all fingerprints of one song
pub async fn delete_fingerprints_by_song(pool: &Pool, song_id: i64) -> DbResult<u64> {
    let client = pool.get().await?;

    client
        .execute("DELETE FROM fingerprints WHERE song_id = $1", &[&song_id])
        .await
        .context("Failed to delete song fingerprints")
}

/// Delete every fingerprint
pub async fn delete_all_fingerprints(pool: &Pool) -> DbResult<()> {
    let client = pool.get().await?;

    client
        .execute("TRUNCATE fingerprints", &[])
        .await
        .context("Failed to delete all fingerprints")?;

    Ok(())
}

/// Count stored fingerprints
pub async fn count_fingerprints(pool: &Pool) -> DbResult<i64> {
    let client = pool.get().await?;

    let row = client
        .query_one("SELECT COUNT(*) FROM fingerprints", &[])
        .await
        .context("Failed to count fingerprints")?;

    Ok(row.get(0))
}
