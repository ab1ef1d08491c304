//! Song registration: catalog row first, then the fingerprint batch

use std::sync::Arc;

use crate::error::{LibraryError, Result};
use crate::model::{natural_key_is_unambiguous, Address, Couple, Fingerprint, NewSong, SongId};
use crate::storage_backend::{FingerprintStore, SongCatalog};

#[cfg(test)]
mod tests;

/// Result of a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub song_id: SongId,
    /// Fingerprints submitted to the store
    pub fingerprints: usize,
    /// True when an earlier interrupted registration was completed
    pub resumed: bool,
}

pub struct Registrar {
    catalog: Arc<dyn SongCatalog>,
    store: Arc<dyn FingerprintStore>,
}

impl Registrar {
    pub fn new(catalog: Arc<dyn SongCatalog>, store: Arc<dyn FingerprintStore>) -> Self {
        Self { catalog, store }
    }

    /// Register one song with its fingerprints.
    ///
    /// The catalog row is created unindexed and claimed, the fingerprints are
    /// written in one batch, and only then is the row marked indexed. While
    /// the claim is held a concurrent registration of the same song fails
    /// with `DuplicateKey`. A failed batch releases the claim and is reported
    /// as `PartialWriteFailure`; registering the same song again finishes it.
    pub async fn register(&self, song: &NewSong, fingerprints: &[Fingerprint]) -> Result<RegisterOutcome> {
        validate(song, fingerprints)?;

        let registration = self.catalog.register(song).await?;
        let song_id = registration.song_id;
        if registration.resumed {
            log::info!(
                "Resuming interrupted registration of '{}' by '{}' (song {})",
                song.title,
                song.artist,
                song_id
            );
        }

        let entries: Vec<(Address, Couple)> = fingerprints
            .iter()
            .map(|fp| {
                (
                    fp.address,
                    Couple {
                        anchor_time_ms: fp.anchor_time_ms,
                        song_id,
                    },
                )
            })
            .collect();

        if let Err(e) = self.store.put(&entries).await {
            log::warn!("Fingerprint batch for song {} failed: {}", song_id, e);
            if let Err(release_err) = self.catalog.release(song_id).await {
                log::warn!(
                    "Could not release song {}; it becomes resumable once its claim expires: {}",
                    song_id,
                    release_err
                );
            }
            return Err(LibraryError::PartialWriteFailure {
                song_id,
                reason: e.to_string(),
            });
        }

        self.catalog.mark_indexed(song_id).await?;

        log::debug!(
            "Registered song {} with {} fingerprints",
            song_id,
            entries.len()
        );
        Ok(RegisterOutcome {
            song_id,
            fingerprints: entries.len(),
            resumed: registration.resumed,
        })
    }
}

fn validate(song: &NewSong, fingerprints: &[Fingerprint]) -> Result<()> {
    if song.title.trim().is_empty() {
        return Err(LibraryError::InvalidInput("title is blank".to_string()));
    }
    if song.artist.trim().is_empty() {
        return Err(LibraryError::InvalidInput("artist is blank".to_string()));
    }
    if !natural_key_is_unambiguous(&song.title) {
        return Err(LibraryError::InvalidInput(format!(
            "title '{}' contains the natural key separator",
            song.title
        )));
    }
    if fingerprints.is_empty() {
        return Err(LibraryError::InvalidInput(format!(
            "no fingerprints for '{}'",
            song.title
        )));
    }
    Ok(())
}
