use super::traits::ListFetcher;
use super::types::{unix_now, UpsertOutcome};
use crate::config::{Config, SourceConfig, SourceKey, SourcesConfig};
use crate::error::StoreError;
use crate::store::ReputationStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Outcome of pulling one remote source into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub source: String,
    pub total_domains: usize,
    pub new_domains: usize,
    pub updated_domains: usize,
    pub errors: Vec<String>,
}

impl SyncResult {
    fn empty(source: &str) -> Self {
        Self {
            source: source.to_string(),
            total_domains: 0,
            new_domains: 0,
            updated_domains: 0,
            errors: Vec::new(),
        }
    }
}

/// Batch job that mirrors the remote lists into the reputation store.
///
/// Always goes to the network; the request path uses `SourceCache` instead.
pub struct SyncOrchestrator {
    fetcher: Arc<dyn ListFetcher>,
    store: Arc<dyn ReputationStore>,
    sources: SourcesConfig,
    batch_size: usize,
    stale_after_days: u64,
}

impl SyncOrchestrator {
    pub fn new(
        fetcher: Arc<dyn ListFetcher>,
        store: Arc<dyn ReputationStore>,
        config: &Config,
    ) -> Self {
        Self {
            fetcher,
            store,
            sources: config.sources.clone(),
            batch_size: config.sync.batch_size.max(1),
            stale_after_days: config.sync.stale_after_days,
        }
    }

    pub async fn sync_source(&self, key: SourceKey) -> SyncResult {
        let source = self.sources.get(key);
        let mut result = SyncResult::empty(&source.name);

        info!("Syncing '{}' from {}", source.name, source.url);
        let domains = match self.fetcher.fetch(&source.url).await {
            Ok(domains) => domains,
            Err(e) => {
                error!("Error syncing from {}: {}", source.name, e);
                result.errors.push(format!("Source sync failed: {}", e));
                return result;
            }
        };

        result.total_domains = domains.len();
        if domains.is_empty() {
            result
                .errors
                .push("No valid domains found in source".to_string());
            return result;
        }

        let mut ordered: Vec<String> = domains.iter().cloned().collect();
        ordered.sort_unstable();

        let now = unix_now();
        let batch_count = ordered.len().div_ceil(self.batch_size);
        info!("Processing {} batches of domains...", batch_count);

        for (idx, batch) in ordered.chunks(self.batch_size).enumerate() {
            self.process_batch(key, source, batch, now, &mut result)
                .await;
            if (idx + 1) % 10 == 0 {
                info!("Processed {}/{} batches", idx + 1, batch_count);
            }
        }

        if key.is_allowlist() {
            // The allowlist is mirrored as a snapshot: upstream removals apply
            // on the next sync, not after the staleness window.
            match self.store.retire_remote_allow(&domains).await {
                Ok(count) => info!("Retired {} domains dropped from {}", count, source.name),
                Err(e) => result
                    .errors
                    .push(format!("Failed to retire dropped allowlist domains: {}", e)),
            }
        }

        info!(
            "Sync completed for {}: total={} new={} updated={} errors={}",
            source.name,
            result.total_domains,
            result.new_domains,
            result.updated_domains,
            result.errors.len()
        );
        result
    }

    async fn process_batch(
        &self,
        key: SourceKey,
        source: &SourceConfig,
        batch: &[String],
        now: i64,
        result: &mut SyncResult,
    ) {
        for domain in batch {
            match self.upsert(key, source, domain, now).await {
                Ok(UpsertOutcome::Inserted) => result.new_domains += 1,
                Ok(UpsertOutcome::Updated) => result.updated_domains += 1,
                Err(e) => result
                    .errors
                    .push(format!("Failed to process domain {}: {}", domain, e)),
            }
        }
    }

    async fn upsert(
        &self,
        key: SourceKey,
        source: &SourceConfig,
        domain: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        if key.is_allowlist() {
            // Kept apart from both the disposable table and the admin-curated
            // global allowlist.
            self.store
                .upsert_remote_allow(domain, &source.name, now)
                .await
        } else {
            self.store
                .upsert_provider(domain, source.risk_level, &source.name, now)
                .await
        }
    }

    /// Syncs every source one after another, then deactivates providers no
    /// source has reported within the staleness window.
    pub async fn sync_all_sources(&self) -> Vec<SyncResult> {
        info!("Starting full domain sync from all sources...");
        let started = Instant::now();

        let mut results = Vec::with_capacity(SourceKey::ALL.len());
        for key in SourceKey::ALL {
            results.push(self.sync_source(key).await);
        }

        let window = i64::try_from(self.stale_after_days)
            .unwrap_or(i64::MAX)
            .saturating_mul(SECONDS_PER_DAY);
        let cutoff = unix_now().saturating_sub(window);
        match self.store.deactivate_stale(cutoff).await {
            Ok(count) => info!("Marked {} stale providers inactive", count),
            Err(e) => warn!("Error marking old domains as inactive: {}", e),
        }

        let (total, new, updated, errors) =
            results.iter().fold((0, 0, 0, 0), |acc, r| {
                (
                    acc.0 + r.total_domains,
                    acc.1 + r.new_domains,
                    acc.2 + r.updated_domains,
                    acc.3 + r.errors.len(),
                )
            });
        info!(
            "SYNC SUMMARY: {:.2}s, processed={} new={} updated={} errors={}",
            started.elapsed().as_secs_f64(),
            total,
            new,
            updated,
            errors
        );

        results
    }
}
