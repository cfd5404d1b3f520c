//! Time-boxed, per-URL cache in front of a [`ListFetcher`].
//!
//! Entries are never evicted. A refresh that fails keeps serving the last
//! good copy; a URL that never fetched successfully resolves to an empty set.

use super::traits::ListFetcher;
use super::types::DomainSet;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CacheEntry {
    domains: Arc<DomainSet>,
    fetched_at: Instant,
}

pub struct SourceCache {
    fetcher: Arc<dyn ListFetcher>,
    ttl: Duration,
    entries: RwLock<FxHashMap<String, CacheEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSourceStats {
    pub url: String,
    pub domains: usize,
    pub age_ms: u64,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_cached_sources: usize,
    pub cache_ttl_ms: u64,
    pub sources: Vec<CacheSourceStats>,
}

impl SourceCache {
    pub fn new(fetcher: Arc<dyn ListFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the domain set for `url`, going to the network only when the
    /// cached copy is missing or older than the TTL.
    pub async fn get(&self, url: &str) -> Arc<DomainSet> {
        let cached = self.lookup(url);

        if let Some(entry) = &cached {
            if entry.fetched_at.elapsed() < self.ttl {
                debug!("Cache hit for {}", url);
                return entry.domains.clone();
            }
        }

        match self.fetcher.fetch(url).await {
            Ok(domains) => {
                let domains = Arc::new(domains);
                info!("Cached {} domains from {}", domains.len(), url);
                self.entries
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(
                        url.to_string(),
                        CacheEntry {
                            domains: domains.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                domains
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!("Refresh of {} failed ({}), using stale cache", url, e);
                    entry.domains
                }
                None => {
                    error!("Fetch of {} failed with nothing cached: {}", url, e);
                    Arc::new(DomainSet::default())
                }
            },
        }
    }

    fn lookup(&self, url: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut sources: Vec<CacheSourceStats> = entries
            .iter()
            .map(|(url, entry)| {
                let age = entry.fetched_at.elapsed();
                CacheSourceStats {
                    url: url.clone(),
                    domains: entry.domains.len(),
                    age_ms: age.as_millis() as u64,
                    expired: age >= self.ttl,
                }
            })
            .collect();
        sources.sort_by(|a, b| a.url.cmp(&b.url));

        CacheStats {
            total_cached_sources: sources.len(),
            cache_ttl_ms: self.ttl.as_millis() as u64,
            sources,
        }
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("Source cache cleared");
    }
}
