//! Process-local backends

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::{FingerprintStore, SongCatalog, REGISTRATION_CLAIM_TTL};
use crate::error::{KeyField, LibraryError, Result};
use crate::model::{Address, Couple, NewSong, Registration, Song, SongId, SongLookup};

fn poisoned<T>(_: PoisonError<T>) -> LibraryError {
    LibraryError::StorageUnavailable("in-memory lock poisoned".to_string())
}

/// Fingerprint index held in a hash map behind one lock
#[derive(Default)]
pub struct MemoryStore {
    index: RwLock<HashMap<Address, HashSet<Couple>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for MemoryStore {
    async fn put(&self, entries: &[(Address, Couple)]) -> Result<()> {
        // One write guard for the whole batch
        let mut index = self.index.write().map_err(poisoned)?;
        for (address, couple) in entries {
            index.entry(*address).or_default().insert(*couple);
        }
        Ok(())
    }

    async fn batch_get(&self, addresses: &[Address]) -> Result<HashMap<Address, Vec<Couple>>> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(addresses
            .iter()
            .map(|address| {
                let couples = index
                    .get(address)
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default();
                (*address, couples)
            })
            .collect())
    }

    async fn delete_song(&self, song_id: SongId) -> Result<u64> {
        let mut index = self.index.write().map_err(poisoned)?;
        let mut removed = 0u64;
        index.retain(|_, couples| {
            let before = couples.len();
            couples.retain(|c| c.song_id != song_id);
            removed += (before - couples.len()) as u64;
            !couples.is_empty()
        });
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.index.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(index.values().map(|couples| couples.len() as u64).sum())
    }
}

#[derive(Default)]
struct CatalogState {
    songs: BTreeMap<SongId, Song>,
    by_natural_key: HashMap<String, SongId>,
    by_external_id: HashMap<String, SongId>,
    /// Last identity handed out; never decremented
    last_id: u32,
    /// Unindexed rows a registration is currently writing
    claims: HashMap<SongId, Instant>,
}

impl CatalogState {
    fn claimed(&self, id: SongId, ttl: Duration) -> bool {
        self.claims
            .get(&id)
            .is_some_and(|since| since.elapsed() < ttl)
    }
}

/// Song catalog held in memory. Uniqueness checks and inserts happen under
/// one write guard.
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
    claim_ttl: Duration,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::with_claim_ttl(REGISTRATION_CLAIM_TTL)
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog whose registration claims go stale after `claim_ttl`
    pub fn with_claim_ttl(claim_ttl: Duration) -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            claim_ttl,
        }
    }
}

#[async_trait]
impl SongCatalog for MemoryCatalog {
    async fn register(&self, song: &NewSong) -> Result<Registration> {
        let natural_key = song.natural_key();
        let mut state = self.state.write().map_err(poisoned)?;

        if let Some(&id) = state.by_natural_key.get(&natural_key) {
            let existing = state
                .songs
                .get(&id)
                .ok_or_else(|| LibraryError::StorageUnavailable(format!("catalog index lost song {}", id)))?;
            let compatible = song.external_id.is_none() || song.external_id == existing.external_id;
            let resumable = !existing.indexed && compatible && !state.claimed(id, self.claim_ttl);
            if resumable {
                state.claims.insert(id, Instant::now());
                log::debug!("Resuming unindexed song {} ({})", id, natural_key);
                return Ok(Registration {
                    song_id: id,
                    resumed: true,
                });
            }
            return Err(LibraryError::DuplicateKey {
                field: KeyField::NaturalKey,
                value: natural_key,
            });
        }

        if let Some(external_id) = &song.external_id {
            if state.by_external_id.contains_key(external_id) {
                return Err(LibraryError::DuplicateKey {
                    field: KeyField::ExternalId,
                    value: external_id.clone(),
                });
            }
        }

        let next = state.last_id.checked_add(1).ok_or_else(|| {
            LibraryError::StorageUnavailable("song identity space exhausted".to_string())
        })?;
        state.last_id = next;
        let id = SongId(next);

        state.claims.insert(id, Instant::now());
        state.by_natural_key.insert(natural_key.clone(), id);
        if let Some(external_id) = &song.external_id {
            state.by_external_id.insert(external_id.clone(), id);
        }
        state.songs.insert(
            id,
            Song {
                id,
                title: song.title.clone(),
                artist: song.artist.clone(),
                external_id: song.external_id.clone(),
                natural_key,
                indexed: false,
                created_at: chrono::Utc::now(),
            },
        );

        Ok(Registration {
            song_id: id,
            resumed: false,
        })
    }

    async fn mark_indexed(&self, song_id: SongId) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if let Some(song) = state.songs.get_mut(&song_id) {
            song.indexed = true;
        }
        state.claims.remove(&song_id);
        Ok(())
    }

    async fn release(&self, song_id: SongId) -> Result<()> {
        self.state.write().map_err(poisoned)?.claims.remove(&song_id);
        Ok(())
    }

    async fn lookup(&self, by: &SongLookup) -> Result<Option<Song>> {
        let state = self.state.read().map_err(poisoned)?;
        let found = match by {
            SongLookup::Id(id) => state.songs.get(id),
            SongLookup::ExternalId(external_id) => state
                .by_external_id
                .get(external_id)
                .and_then(|id| state.songs.get(id)),
            SongLookup::NaturalKey(key) => state
                .by_natural_key
                .get(key)
                .and_then(|id| state.songs.get(id)),
            SongLookup::TitleContains(fragment) => {
                let needle = fragment.to_lowercase();
                state
                    .songs
                    .values()
                    .filter(|song| song.title.to_lowercase().contains(&needle))
                    .min_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)))
            }
        };
        Ok(found.cloned())
    }

    async fn delete(&self, song_id: SongId) -> Result<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        let Some(song) = state.songs.remove(&song_id) else {
            return Ok(false);
        };
        state.claims.remove(&song_id);
        state.by_natural_key.remove(&song.natural_key);
        if let Some(external_id) = &song.external_id {
            state.by_external_id.remove(external_id);
        }
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<Song>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut songs: Vec<Song> = state.songs.values().cloned().collect();
        songs.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(songs)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.read().map_err(poisoned)?.songs.len() as u64)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.songs.clear();
        state.by_natural_key.clear();
        state.by_external_id.clear();
        state.claims.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn couple(anchor_time_ms: u32, song_id: u32) -> Couple {
        Couple {
            anchor_time_ms,
            song_id: SongId(song_id),
        }
    }

    fn sorted(couples: Vec<Couple>) -> Vec<(u32, u32)> {
        let mut pairs: Vec<(u32, u32)> = couples
            .into_iter()
            .map(|c| (c.anchor_time_ms, c.song_id.0))
            .collect();
        pairs.sort();
        pairs
    }

    #[tokio::test]
    async fn test_batch_get_returns_empty_for_unknown_addresses() {
        let store = MemoryStore::new();
        store.put(&[(10, couple(500, 1))]).await.unwrap();

        let hits = store.batch_get(&[10, 99]).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(sorted(hits[&10].clone()), vec![(500, 1)]);
        assert!(hits[&99].is_empty());
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryStore::new();
        let entries = vec![(10, couple(500, 1)), (10, couple(900, 2)), (20, couple(600, 1))];

        store.put(&entries).await.unwrap();
        let first = store.batch_get(&[10, 20]).await.unwrap();

        for _ in 0..3 {
            store.put(&entries).await.unwrap();
        }
        let again = store.batch_get(&[10, 20]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(sorted(first[&10].clone()), sorted(again[&10].clone()));
        assert_eq!(sorted(first[&20].clone()), sorted(again[&20].clone()));
    }

    #[tokio::test]
    async fn test_address_holds_many_songs_and_times() {
        let store = MemoryStore::new();
        store
            .put(&[(7, couple(100, 1)), (7, couple(250, 1)), (7, couple(100, 2))])
            .await
            .unwrap();

        let hits = store.batch_get(&[7]).await.unwrap();
        assert_eq!(sorted(hits[&7].clone()), vec![(100, 1), (100, 2), (250, 1)]);
    }

    #[tokio::test]
    async fn test_delete_song_purges_only_that_song() {
        let store = MemoryStore::new();
        store
            .put(&[(7, couple(100, 1)), (8, couple(200, 1)), (7, couple(100, 2))])
            .await
            .unwrap();

        assert_eq!(store.delete_song(SongId(1)).await.unwrap(), 2);
        let hits = store.batch_get(&[7, 8]).await.unwrap();
        assert_eq!(sorted(hits[&7].clone()), vec![(100, 2)]);
        assert!(hits[&8].is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let catalog = MemoryCatalog::new();
        let first = catalog
            .register(&NewSong::new("Take Five", "Dave Brubeck", Some("yt:vmDDOFXSgAs".into())))
            .await
            .unwrap();
        catalog.mark_indexed(first.song_id).await.unwrap();

        let err = catalog
            .register(&NewSong::new("take  five", "DAVE BRUBECK", None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LibraryError::DuplicateKey { field: KeyField::NaturalKey, .. }
        ));

        let err = catalog
            .register(&NewSong::new("Blue Rondo", "Dave Brubeck", Some("yt:vmDDOFXSgAs".into())))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LibraryError::DuplicateKey { field: KeyField::ExternalId, .. }
        ));

        assert_eq!(catalog.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_register_resumes_unindexed_row() {
        let catalog = MemoryCatalog::new();
        let first = catalog
            .register(&NewSong::new("Strange Fruit", "Billie Holiday", None))
            .await
            .unwrap();

        // Still claimed by the first registration
        let err = catalog
            .register(&NewSong::new("Strange Fruit", "Billie Holiday", None))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        catalog.release(first.song_id).await.unwrap();
        let again = catalog
            .register(&NewSong::new("Strange Fruit", "Billie Holiday", None))
            .await
            .unwrap();
        assert_eq!(again.song_id, first.song_id);
        assert!(again.resumed);
        catalog.release(again.song_id).await.unwrap();

        // A conflicting external id is not a resume
        let err = catalog
            .register(&NewSong::new("Strange Fruit", "Billie Holiday", Some("yt:other".into())))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_stale_claim_can_be_taken_over() {
        let catalog = MemoryCatalog::with_claim_ttl(Duration::ZERO);
        let first = catalog
            .register(&NewSong::new("Lover Man", "Billie Holiday", None))
            .await
            .unwrap();

        let again = catalog
            .register(&NewSong::new("lover man", "billie holiday", None))
            .await
            .unwrap();
        assert_eq!(again.song_id, first.song_id);
        assert!(again.resumed);
    }

    #[tokio::test]
    async fn test_identities_are_never_reused() {
        let catalog = MemoryCatalog::new();
        let a = catalog.register(&NewSong::new("A", "X", None)).await.unwrap();
        assert!(catalog.delete(a.song_id).await.unwrap());
        catalog.clear().await.unwrap();

        let b = catalog.register(&NewSong::new("A", "X", None)).await.unwrap();
        assert!(b.song_id > a.song_id);
        assert!(!b.resumed);
    }

    #[tokio::test]
    async fn test_lookup_modes() {
        let catalog = MemoryCatalog::new();
        let summertime = catalog
            .register(&NewSong::new("Summertime", "Ella Fitzgerald", Some("yt:1".into())))
            .await
            .unwrap()
            .song_id;
        catalog
            .register(&NewSong::new("Summer Samba", "Astrud Gilberto", None))
            .await
            .unwrap();

        let by_id = catalog.lookup(&SongLookup::Id(summertime)).await.unwrap().unwrap();
        assert_eq!(by_id.title, "Summertime");

        let by_ext = catalog
            .lookup(&SongLookup::ExternalId("yt:1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_ext.id, summertime);

        let by_key = catalog
            .lookup(&SongLookup::by_title_and_artist("SUMMERTIME", "ella fitzgerald"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_key.id, summertime);

        // "Summer Samba" sorts before "Summertime"
        let by_title = catalog
            .lookup(&SongLookup::TitleContains("summer".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_title.title, "Summer Samba");

        assert!(catalog
            .lookup(&SongLookup::TitleContains("%".into()))
            .await
            .unwrap()
            .is_none());
        assert!(catalog.lookup(&SongLookup::Id(SongId(999))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_hides_song_from_every_lookup() {
        let catalog = MemoryCatalog::new();
        let id = catalog
            .register(&NewSong::new("Autumn Leaves", "Cannonball Adderley", Some("yt:al".into())))
            .await
            .unwrap()
            .song_id;

        assert!(catalog.delete(id).await.unwrap());
        assert!(!catalog.delete(id).await.unwrap());

        for by in [
            SongLookup::Id(id),
            SongLookup::ExternalId("yt:al".into()),
            SongLookup::by_title_and_artist("Autumn Leaves", "Cannonball Adderley"),
            SongLookup::TitleContains("autumn".into()),
        ] {
            assert!(catalog.lookup(&by).await.unwrap().is_none(), "{:?}", by);
        }
        assert!(catalog.list().await.unwrap().is_empty());
    }
}
