//! Matching algorithm and query results
//!
//! Every query fingerprint that shares an address with a stored couple votes
//! for `db_anchor_time - query_anchor_time` in that song's delta histogram.
//! A genuine match piles its votes into one bin (the clip's offset inside
//! the recording); accidental address collisions scatter across bins.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::config::MatcherConfig;
use crate::error::{LibraryError, Result};
use crate::model::{Address, AnchorTime, Couple, Fingerprint, SongId};
use crate::storage_backend::FingerprintStore;


/// A ranked match candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub song_id: SongId,
    /// Votes in the song's fullest delta bin
    pub score: u32,
    /// Query/couple pairs sharing an address, over all bins
    pub overlap: u64,
    /// Start of the fullest bin: where the clip begins inside the song (ms)
    pub alignment_offset_ms: i64,
    /// `score / query size`, capped at 1.0
    pub confidence: f64,
}

/// Per-song delta histogram
#[derive(Debug, Default)]
struct SongTally {
    bins: HashMap<i64, u32>,
    overlap: u64,
}

impl SongTally {
    fn merge(&mut self, other: SongTally) {
        for (bin, count) in other.bins {
            *self.bins.entry(bin).or_insert(0) += count;
        }
        self.overlap += other.overlap;
    }

    /// Fullest bin as (bin, count); equal counts resolve to the lower bin
    fn mode(&self) -> Option<(i64, u32)> {
        self.bins
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&bin, &count)| (bin, count))
    }
}

fn merge_tallies(
    mut left: HashMap<SongId, SongTally>,
    right: HashMap<SongId, SongTally>,
) -> HashMap<SongId, SongTally> {
    for (song_id, tally) in right {
        left.entry(song_id).or_default().merge(tally);
    }
    left
}

/// Score a query against the couples fetched for its addresses and keep the
/// best `top_k`.
///
/// Pure and deterministic; `Matcher` wraps it with the store round trips.
pub fn score_candidates(
    query: &[Fingerprint],
    hits: &HashMap<Address, Vec<Couple>>,
    config: &MatcherConfig,
) -> Vec<Candidate> {
    let mut candidates = rank_candidates(query, hits, config);
    candidates.truncate(config.top_k);
    candidates
}

/// Every candidate passing `min_score`, in rank order
pub fn rank_candidates(
    query: &[Fingerprint],
    hits: &HashMap<Address, Vec<Couple>>,
    config: &MatcherConfig,
) -> Vec<Candidate> {
    if query.is_empty() {
        return Vec::new();
    }

    let mut query_times: HashMap<Address, Vec<AnchorTime>> = HashMap::new();
    for fp in query {
        query_times
            .entry(fp.address)
            .or_default()
            .push(fp.anchor_time_ms);
    }

    let bin_width = i64::from(config.bin_width_ms.max(1));
    let cap = config.max_couples_per_address;

    let tallies = hits
        .par_iter()
        .filter(|(address, couples)| {
            if cap > 0 && couples.len() > cap {
                log::debug!(
                    "Skipping address {:#010x}: {} couples exceeds cap {}",
                    address,
                    couples.len(),
                    cap
                );
                return false;
            }
            true
        })
        .fold(HashMap::<SongId, SongTally>::new, |mut acc, (address, couples)| {
            if let Some(times) = query_times.get(address) {
                for couple in couples {
                    let tally = acc.entry(couple.song_id).or_default();
                    for &query_time in times {
                        let delta = i64::from(couple.anchor_time_ms) - i64::from(query_time);
                        *tally.bins.entry(delta.div_euclid(bin_width)).or_insert(0) += 1;
                        tally.overlap += 1;
                    }
                }
            }
            acc
        })
        .reduce(HashMap::new, merge_tallies);

    let query_size = query.len() as f64;
    let mut candidates: Vec<Candidate> = tallies
        .into_iter()
        .filter_map(|(song_id, tally)| {
            let (bin, score) = tally.mode()?;
            if score < config.min_score {
                return None;
            }
            Some(Candidate {
                song_id,
                score,
                overlap: tally.overlap,
                alignment_offset_ms: bin * bin_width,
                confidence: (score as f64 / query_size).min(1.0),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.overlap.cmp(&a.overlap))
            .then(a.song_id.cmp(&b.song_id))
    });

    log::trace!(
        "Scored {} query fingerprints over {} addresses: {} candidates",
        query.len(),
        hits.len(),
        candidates.len()
    );

    candidates
}

/// Matcher for fingerprints
pub struct Matcher {
    store: Arc<dyn FingerprintStore>,
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(store: Arc<dyn FingerprintStore>, config: MatcherConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Rank stored songs against `query`.
    ///
    /// Returns an empty list when nothing matches. Store failures and an
    /// expired deadline surface as `StorageUnavailable`.
    pub async fn find_matches(&self, query: &[Fingerprint]) -> Result<Vec<Candidate>> {
        let mut candidates = self.find_ranked(query).await?;
        candidates.truncate(self.config.top_k);
        Ok(candidates)
    }

    /// Like `find_matches` without the `top_k` cut, for callers that
    /// discard some candidates before presenting the rest
    pub async fn find_ranked(&self, query: &[Fingerprint]) -> Result<Vec<Candidate>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let deadline = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(deadline, self.run(query)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "Match of {} fingerprints exceeded {} ms",
                    query.len(),
                    self.config.timeout_ms
                );
                Err(LibraryError::StorageUnavailable(format!(
                    "match deadline of {} ms exceeded",
                    self.config.timeout_ms
                )))
            }
        }
    }

    async fn run(&self, query: &[Fingerprint]) -> Result<Vec<Candidate>> {
        let addresses: Vec<Address> = query
            .iter()
            .map(|fp| fp.address)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let hits = self.fetch_couples(&addresses).await?;
        let total: usize = hits.values().map(Vec::len).sum();
        log::debug!(
            "Query: {} fingerprints, {} distinct addresses, {} stored couples",
            query.len(),
            addresses.len(),
            total
        );
        if total == 0 {
            return Ok(Vec::new());
        }

        let query = query.to_vec();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || rank_candidates(&query, &hits, &config))
            .await
            .map_err(|e| LibraryError::StorageUnavailable(format!("scoring task failed: {e}")))
    }

    /// Fan the lookups out in chunks and union the partial maps
    async fn fetch_couples(&self, addresses: &[Address]) -> Result<HashMap<Address, Vec<Couple>>> {
        let mut tasks = JoinSet::new();
        for chunk in addresses.chunks(self.config.lookup_chunk_size.max(1)) {
            let store = Arc::clone(&self.store);
            let chunk = chunk.to_vec();
            tasks.spawn(async move { store.batch_get(&chunk).await });
        }

        let mut hits = HashMap::with_capacity(addresses.len());
        while let Some(joined) = tasks.join_next().await {
            let partial = joined
                .map_err(|e| LibraryError::StorageUnavailable(format!("lookup task failed: {e}")))??;
            hits.extend(partial);
        }

        Ok(hits)
    }
}
