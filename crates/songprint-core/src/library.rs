//! Caller-facing song library
//!
//! Bundles a catalog, a fingerprint store, a matcher and a registrar that
//! all share the same backend handles.

use serde::{Deserialize, Serialize};
use songprint_fp::FpJsonFile;
use std::sync::Arc;

use crate::config::MatcherConfig;
use crate::error::{LibraryError, Result};
use crate::matching::Matcher;
use crate::model::{Fingerprint, NewSong, Song, SongId, SongLookup};
use crate::registrar::{RegisterOutcome, Registrar};
use crate::storage_backend::{
    self, FingerprintStore, MemoryCatalog, MemoryStore, PostgresCatalog, PostgresStore,
    SongCatalog,
};
use crate::storage_config::{BackendKind, SongprintConfig};

/// A ranked candidate joined with its catalog metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongMatch {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub score: u32,
    pub overlap: u64,
    pub alignment_offset_ms: i64,
    pub confidence: f64,
}

pub struct Library {
    catalog: Arc<dyn SongCatalog>,
    store: Arc<dyn FingerprintStore>,
    matcher: Matcher,
    registrar: Registrar,
}

impl Library {
    pub fn new(
        catalog: Arc<dyn SongCatalog>,
        store: Arc<dyn FingerprintStore>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            matcher: Matcher::new(store.clone(), config),
            registrar: Registrar::new(catalog.clone(), store.clone()),
            catalog,
            store,
        }
    }

    /// Library backed by process-local maps
    pub fn in_memory(config: MatcherConfig) -> Self {
        Self::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryStore::new()),
            config,
        )
    }

    /// Build the library selected by `config.storage.backend`
    pub async fn open(config: &SongprintConfig) -> Result<Self> {
        config
            .matching
            .validate()
            .map_err(|e| LibraryError::Config(format!("{e:#}")))?;

        match config.storage.backend {
            BackendKind::Memory => {
                log::info!("Using in-memory storage");
                Ok(Self::in_memory(config.matching.clone()))
            }
            BackendKind::Postgresql => {
                if let Some(conn) = config.connection_string() {
                    log::info!("Using PostgreSQL storage at {}", conn);
                }
                let pool = storage_backend::connect(&config.storage.postgresql).await?;
                Ok(Self::new(
                    Arc::new(PostgresCatalog::new(pool.clone())),
                    Arc::new(PostgresStore::new(pool)),
                    config.matching.clone(),
                ))
            }
        }
    }

    pub fn matcher_config(&self) -> &MatcherConfig {
        self.matcher.config()
    }

    pub async fn register(&self, song: &NewSong, fingerprints: &[Fingerprint]) -> Result<RegisterOutcome> {
        self.registrar.register(song, fingerprints).await
    }

    /// Register the song described by a loaded fingerprint file
    pub async fn register_fp_file(&self, file: &FpJsonFile) -> Result<RegisterOutcome> {
        let song = NewSong::from(&file.metadata);
        let fingerprints = Fingerprint::from_pairs(&file.get_all_fingerprints());
        self.register(&song, &fingerprints).await
    }

    /// Rank catalog songs against a query fingerprint set.
    ///
    /// Candidates whose catalog row has been deleted are dropped and the
    /// next ranked candidates take their places, up to `top_k`.
    pub async fn match_fingerprints(&self, query: &[Fingerprint]) -> Result<Vec<SongMatch>> {
        let top_k = self.matcher.config().top_k;
        let candidates = self.matcher.find_ranked(query).await?;

        let mut matches = Vec::with_capacity(candidates.len().min(top_k));
        for candidate in candidates {
            if matches.len() == top_k {
                break;
            }
            let Some(song) = self.catalog.lookup(&SongLookup::Id(candidate.song_id)).await? else {
                log::debug!("Dropping orphaned candidate song {}", candidate.song_id);
                continue;
            };
            matches.push(SongMatch {
                song_id: candidate.song_id,
                title: song.title,
                artist: song.artist,
                external_id: song.external_id,
                score: candidate.score,
                overlap: candidate.overlap,
                alignment_offset_ms: candidate.alignment_offset_ms,
                confidence: candidate.confidence,
            });
        }

        Ok(matches)
    }

    pub async fn lookup(&self, by: &SongLookup) -> Result<Option<Song>> {
        self.catalog.lookup(by).await
    }

    /// Delete the catalog row, then purge the song's fingerprints.
    ///
    /// Returns false when the song did not exist.
    pub async fn delete_song(&self, song_id: SongId) -> Result<bool> {
        if !self.catalog.delete(song_id).await? {
            return Ok(false);
        }
        let purged = self.store.delete_song(song_id).await?;
        log::info!("Deleted song {} ({} fingerprints)", song_id, purged);
        Ok(true)
    }

    /// Delete every song and fingerprint
    pub async fn clear(&self) -> Result<()> {
        self.catalog.clear().await?;
        self.store.clear().await?;
        log::info!("Library cleared");
        Ok(())
    }

    /// Catalog rows, including songs whose registration is incomplete
    pub async fn count(&self) -> Result<u64> {
        self.catalog.count().await
    }

    pub async fn fingerprint_count(&self) -> Result<u64> {
        self.store.count().await
    }

    pub async fn list_songs(&self) -> Result<Vec<Song>> {
        self.catalog.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Couple;
    use approx::assert_relative_eq;

    fn song_a() -> (NewSong, Vec<Fingerprint>) {
        (
            NewSong::new("Naima", "John Coltrane", Some("ATL-1311-6".to_string())),
            Fingerprint::from_pairs(&[(10, 500), (20, 600)]),
        )
    }

    fn song_b() -> (NewSong, Vec<Fingerprint>) {
        (
            NewSong::new("Giant Steps", "John Coltrane", None),
            Fingerprint::from_pairs(&[(10, 900)]),
        )
    }

    async fn two_song_library() -> (Library, SongId, SongId) {
        let library = Library::in_memory(MatcherConfig::default());
        let (a, a_fps) = song_a();
        let (b, b_fps) = song_b();
        let a_id = library.register(&a, &a_fps).await.unwrap().song_id;
        let b_id = library.register(&b, &b_fps).await.unwrap().song_id;
        (library, a_id, b_id)
    }

    #[tokio::test]
    async fn test_match_hydrates_metadata() {
        let (library, a_id, b_id) = two_song_library().await;
        let results = library
            .match_fingerprints(&Fingerprint::from_pairs(&[(10, 0), (20, 100)]))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].song_id, a_id);
        assert_eq!(results[0].title, "Naima");
        assert_eq!(results[0].external_id.as_deref(), Some("ATL-1311-6"));
        assert_eq!(results[0].score, 2);
        assert_relative_eq!(results[0].confidence, 1.0);
        assert_eq!(results[1].song_id, b_id);
        assert_relative_eq!(results[1].confidence, 0.5);
    }

    #[tokio::test]
    async fn test_own_fingerprints_match_uniquely() {
        let (library, a_id, _) = two_song_library().await;
        let (_, a_fps) = song_a();
        let results = library.match_fingerprints(&a_fps).await.unwrap();

        assert_eq!(results[0].song_id, a_id);
        assert_eq!(results[0].alignment_offset_ms, 0);
        assert!(results.iter().skip(1).all(|m| m.score < results[0].score));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_store() {
        let (library, a_id, b_id) = two_song_library().await;
        assert_eq!(library.fingerprint_count().await.unwrap(), 3);

        assert!(library.delete_song(a_id).await.unwrap());
        assert!(!library.delete_song(a_id).await.unwrap());

        assert_eq!(library.count().await.unwrap(), 1);
        assert_eq!(library.fingerprint_count().await.unwrap(), 1);
        assert!(library.lookup(&SongLookup::Id(a_id)).await.unwrap().is_none());
        assert!(library
            .lookup(&SongLookup::ExternalId("ATL-1311-6".to_string()))
            .await
            .unwrap()
            .is_none());

        let results = library
            .match_fingerprints(&Fingerprint::from_pairs(&[(10, 0), (20, 100)]))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].song_id, b_id);
    }

    #[tokio::test]
    async fn test_orphaned_fingerprints_are_not_reported() {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(MemoryStore::new());
        let library = Library::new(catalog.clone(), store.clone(), MatcherConfig::default());
        let (a, a_fps) = song_a();
        let a_id = library.register(&a, &a_fps).await.unwrap().song_id;

        // Catalog row gone, purge never ran
        catalog.delete(a_id).await.unwrap();
        store
            .put(&[(
                30,
                Couple {
                    anchor_time_ms: 1,
                    song_id: a_id,
                },
            )])
            .await
            .unwrap();

        let results = library.match_fingerprints(&a_fps).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_orphans_do_not_shrink_top_k() {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(MemoryStore::new());
        let config = MatcherConfig {
            top_k: 2,
            ..Default::default()
        };
        let library = Library::new(catalog.clone(), store, config);

        let query = Fingerprint::from_pairs(&[(1, 0), (2, 10), (3, 20)]);
        let best = library
            .register(&NewSong::new("Impressions", "John Coltrane", None), &query)
            .await
            .unwrap()
            .song_id;
        let second = library
            .register(
                &NewSong::new("India", "John Coltrane", None),
                &Fingerprint::from_pairs(&[(1, 0), (2, 10)]),
            )
            .await
            .unwrap()
            .song_id;
        let third = library
            .register(
                &NewSong::new("Chasin' the Trane", "John Coltrane", None),
                &Fingerprint::from_pairs(&[(1, 0)]),
            )
            .await
            .unwrap()
            .song_id;

        // Catalog row gone, fingerprints still indexed
        catalog.delete(best).await.unwrap();

        let results = library.match_fingerprints(&query).await.unwrap();
        let ids: Vec<SongId> = results.iter().map(|m| m.song_id).collect();
        assert_eq!(ids, vec![second, third]);
    }

    #[tokio::test]
    async fn test_clear_and_identity_reuse() {
        let (library, a_id, b_id) = two_song_library().await;
        library.clear().await.unwrap();

        assert_eq!(library.count().await.unwrap(), 0);
        assert_eq!(library.fingerprint_count().await.unwrap(), 0);
        assert!(library.list_songs().await.unwrap().is_empty());

        let (a, a_fps) = song_a();
        let again = library.register(&a, &a_fps).await.unwrap();
        assert!(again.song_id > a_id && again.song_id > b_id);
    }

    #[tokio::test]
    async fn test_register_fp_file() {
        let library = Library::in_memory(MatcherConfig::default());
        let mut file = FpJsonFile::new(
            "Equinox".to_string(),
            "John Coltrane".to_string(),
            None,
            "equinox.wav".to_string(),
            30_000,
        );
        file.add_fingerprints(&[(1, 100), (2, 200), (3, 300)]);

        let outcome = library.register_fp_file(&file).await.unwrap();
        assert_eq!(outcome.fingerprints, 3);

        let found = library
            .lookup(&SongLookup::by_title_and_artist("EQUINOX", "john  coltrane"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, outcome.song_id);
        assert!(found.indexed);
    }

    #[tokio::test]
    async fn test_open_memory_backend() {
        let library = Library::open(&SongprintConfig::default_memory()).await.unwrap();
        assert_eq!(library.count().await.unwrap(), 0);
        assert_eq!(library.matcher_config().bin_width_ms, 5);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_matching() {
        let mut config = SongprintConfig::default_memory();
        config.matching.top_k = 0;
        assert!(matches!(
            Library::open(&config).await,
            Err(LibraryError::Config(_))
        ));
    }
}
