use super::*;
use crate::error::KeyField;
use crate::model::SongLookup;
use crate::storage_backend::{MemoryCatalog, MemoryStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Memory store whose next `put` can be made to fail
struct FlakyStore {
    inner: MemoryStore,
    fail_next_put: AtomicBool,
}

impl FlakyStore {
    fn failing() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_next_put: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl FingerprintStore for FlakyStore {
    async fn put(&self, entries: &[(Address, Couple)]) -> Result<()> {
        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            return Err(LibraryError::StorageUnavailable("connection reset".to_string()));
        }
        self.inner.put(entries).await
    }

    async fn batch_get(&self, addresses: &[Address]) -> Result<HashMap<Address, Vec<Couple>>> {
        self.inner.batch_get(addresses).await
    }

    async fn delete_song(&self, song_id: SongId) -> Result<u64> {
        self.inner.delete_song(song_id).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }
}

/// Memory store whose `put` takes a while, so registrations overlap
struct SlowStore {
    inner: MemoryStore,
}

#[async_trait]
impl FingerprintStore for SlowStore {
    async fn put(&self, entries: &[(Address, Couple)]) -> Result<()> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.inner.put(entries).await
    }

    async fn batch_get(&self, addresses: &[Address]) -> Result<HashMap<Address, Vec<Couple>>> {
        self.inner.batch_get(addresses).await
    }

    async fn delete_song(&self, song_id: SongId) -> Result<u64> {
        self.inner.delete_song(song_id).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }
}

fn memory_registrar() -> (Registrar, Arc<MemoryCatalog>, Arc<MemoryStore>) {
    let catalog = Arc::new(MemoryCatalog::new());
    let store = Arc::new(MemoryStore::new());
    let registrar = Registrar::new(catalog.clone(), store.clone());
    (registrar, catalog, store)
}

fn fingerprints() -> Vec<Fingerprint> {
    Fingerprint::from_pairs(&[(10, 500), (20, 600), (30, 700)])
}

#[tokio::test]
async fn test_register_indexes_song() {
    let (registrar, catalog, store) = memory_registrar();
    let song = NewSong::new("Blue in Green", "Miles Davis", Some("KOB-03".to_string()));

    let outcome = registrar.register(&song, &fingerprints()).await.unwrap();
    assert_eq!(outcome.fingerprints, 3);
    assert!(!outcome.resumed);

    let stored = catalog
        .lookup(&SongLookup::Id(outcome.song_id))
        .await
        .unwrap()
        .unwrap();
    assert!(stored.indexed);
    assert_eq!(stored.external_id.as_deref(), Some("KOB-03"));
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_duplicate_leaves_state_unchanged() {
    let (registrar, catalog, store) = memory_registrar();
    let song = NewSong::new("So What", "Miles Davis", None);
    registrar.register(&song, &fingerprints()).await.unwrap();

    let again = NewSong::new("so  what", "MILES DAVIS", None);
    let err = registrar
        .register(&again, &Fingerprint::from_pairs(&[(99, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LibraryError::DuplicateKey {
            field: KeyField::NaturalKey,
            ..
        }
    ));
    assert_eq!(catalog.count().await.unwrap(), 1);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_duplicate_external_id() {
    let (registrar, _, _) = memory_registrar();
    let first = NewSong::new("Freddie Freeloader", "Miles Davis", Some("KOB-02".to_string()));
    let second = NewSong::new("All Blues", "Miles Davis", Some("KOB-02".to_string()));

    registrar.register(&first, &fingerprints()).await.unwrap();
    let err = registrar.register(&second, &fingerprints()).await.unwrap_err();
    assert!(matches!(
        err,
        LibraryError::DuplicateKey {
            field: KeyField::ExternalId,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_batch_can_be_resumed() {
    let catalog = Arc::new(MemoryCatalog::new());
    let store = Arc::new(FlakyStore::failing());
    let registrar = Registrar::new(catalog.clone(), store.clone());
    let song = NewSong::new("Flamenco Sketches", "Miles Davis", None);

    let err = registrar.register(&song, &fingerprints()).await.unwrap_err();
    let LibraryError::PartialWriteFailure { song_id, .. } = err else {
        panic!("expected PartialWriteFailure, got {err:?}");
    };

    let pending = catalog
        .lookup(&SongLookup::Id(song_id))
        .await
        .unwrap()
        .unwrap();
    assert!(!pending.indexed);
    assert_eq!(store.count().await.unwrap(), 0);

    let outcome = registrar.register(&song, &fingerprints()).await.unwrap();
    assert_eq!(outcome.song_id, song_id);
    assert!(outcome.resumed);
    assert_eq!(catalog.count().await.unwrap(), 1);
    assert_eq!(store.count().await.unwrap(), 3);
    assert!(
        catalog
            .lookup(&SongLookup::Id(song_id))
            .await
            .unwrap()
            .unwrap()
            .indexed
    );
}

#[tokio::test]
async fn test_invalid_input_writes_nothing() {
    let (registrar, catalog, store) = memory_registrar();

    for (title, artist, fps) in [
        ("", "Miles Davis", fingerprints()),
        ("Milestones", "   ", fingerprints()),
        ("Milestones", "Miles Davis", Vec::new()),
        ("Milestones---Miles", "Davis", fingerprints()),
        ("Milestones -", "Miles Davis", fingerprints()),
    ] {
        let err = registrar
            .register(&NewSong::new(title, artist, None), &fps)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::InvalidInput(_)));
    }

    assert_eq!(catalog.count().await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_registrations_of_same_song() {
    let catalog = Arc::new(MemoryCatalog::new());
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
    });
    let registrar = Registrar::new(catalog.clone(), store.clone());

    let first = NewSong::new("Naima", "John Coltrane", None);
    let first_fps = Fingerprint::from_pairs(&[(1, 100), (2, 200)]);
    let second = NewSong::new("naima", "JOHN COLTRANE", None);
    let second_fps = Fingerprint::from_pairs(&[(7, 900), (8, 950), (9, 990)]);

    let (a, b) = tokio::join!(
        registrar.register(&first, &first_fps),
        registrar.register(&second, &second_fps)
    );

    let (winner, loser) = match (a, b) {
        (Ok(outcome), Err(err)) | (Err(err), Ok(outcome)) => (outcome, err),
        (a, b) => panic!("expected exactly one registration to succeed, got {a:?} and {b:?}"),
    };
    assert!(!winner.resumed);
    assert!(matches!(
        loser,
        LibraryError::DuplicateKey {
            field: KeyField::NaturalKey,
            ..
        }
    ));
    assert_eq!(catalog.count().await.unwrap(), 1);
    assert_eq!(store.count().await.unwrap(), winner.fingerprints as u64);
    assert!(
        catalog
            .lookup(&SongLookup::Id(winner.song_id))
            .await
            .unwrap()
            .unwrap()
            .indexed
    );
}

#[tokio::test]
async fn test_failed_batch_releases_claim() {
    let catalog = Arc::new(MemoryCatalog::new());
    let store = Arc::new(FlakyStore::failing());
    let registrar = Registrar::new(catalog.clone(), store);
    let song = NewSong::new("Alabama", "John Coltrane", None);

    registrar.register(&song, &fingerprints()).await.unwrap_err();

    // Released rows are resumable straight away, without waiting for expiry
    let registration = catalog.register(&song).await.unwrap();
    assert!(registration.resumed);
}
