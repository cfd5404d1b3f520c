#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use truemailer::config::{Config, SourceConfig};
use truemailer::engine::{
    AddOutcome, DisposableLookup, DomainEntry, DomainResolver, DomainSet, EntrySelector,
    ListFetcher, ListKind, ProviderStats, RiskLevel, SourceCache, UpsertOutcome, UserListEntry,
};
use truemailer::error::{FetchError, StoreError};
use truemailer::store::{MemoryStore, ReputationStore};

pub const PRIMARY_URL: &str = "mock://primary";
pub const SECONDARY_URL: &str = "mock://secondary";
pub const ALLOW_URL: &str = "mock://allow";

pub const PRIMARY_NAME: &str = "primary-list";
pub const SECONDARY_NAME: &str = "secondary-list";
pub const ALLOW_NAME: &str = "allow-list";

/// In-process list server: URLs without a registered list fail with 503.
#[derive(Default)]
pub struct MockFetcher {
    lists: Mutex<HashMap<String, DomainSet>>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, domains: &[&str]) {
        let set = domains.iter().map(|d| d.to_string()).collect();
        self.lists.lock().unwrap().insert(url.to_string(), set);
    }

    pub fn fail(&self, url: &str) {
        self.lists.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<DomainSet, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lists
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Http {
                url: url.to_string(),
                status: 503,
            })
    }
}

/// Default config pointed at the mock sources.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.sources.mailchecker = SourceConfig {
        url: PRIMARY_URL.to_string(),
        name: PRIMARY_NAME.to_string(),
        risk_level: RiskLevel::High,
    };
    config.sources.disposable_blocklist = SourceConfig {
        url: SECONDARY_URL.to_string(),
        name: SECONDARY_NAME.to_string(),
        risk_level: RiskLevel::Medium,
    };
    config.sources.disposable_allowlist = SourceConfig {
        url: ALLOW_URL.to_string(),
        name: ALLOW_NAME.to_string(),
        risk_level: RiskLevel::Low,
    };
    config
}

pub fn resolver(
    store: Arc<dyn ReputationStore>,
    fetcher: Arc<MockFetcher>,
) -> (Arc<DomainResolver>, Arc<SourceCache>) {
    let cache = Arc::new(SourceCache::new(fetcher, Duration::from_secs(300)));
    let resolver = Arc::new(DomainResolver::new(
        store,
        cache.clone(),
        test_config().sources,
    ));
    (resolver, cache)
}

/// Delegates to an in-memory store but fails every operation, or only
/// provider upserts for one domain.
pub struct FaultyStore {
    inner: MemoryStore,
    fail_all: bool,
    fail_domain: Option<String>,
}

impl FaultyStore {
    pub fn broken() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_all: true,
            fail_domain: None,
        }
    }

    pub fn failing_on(domain: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_all: false,
            fail_domain: Some(domain.to_string()),
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_all {
            return Err(StoreError::Poisoned);
        }
        Ok(())
    }
}

#[async_trait]
impl ReputationStore for FaultyStore {
    async fn is_user_listed(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.is_user_listed(kind, user_id, domain).await
    }

    async fn add_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
        reason: Option<&str>,
        now: i64,
    ) -> Result<AddOutcome, StoreError> {
        self.check()?;
        self.inner.add_user_entry(kind, user_id, domain, reason, now).await
    }

    async fn list_user_entries(
        &self,
        kind: ListKind,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserListEntry>, StoreError> {
        self.check()?;
        self.inner.list_user_entries(kind, user_id, limit, offset).await
    }

    async fn remove_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        selector: &EntrySelector,
    ) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.remove_user_entry(kind, user_id, selector).await
    }

    async fn is_globally_allowed(&self, domain: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.is_globally_allowed(domain).await
    }

    async fn upsert_global_allow(
        &self,
        domain: &str,
        reason: Option<&str>,
        added_by: Option<&str>,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        self.check()?;
        self.inner.upsert_global_allow(domain, reason, added_by, now).await
    }

    async fn remove_global_allow(&self, domain: &str) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.remove_global_allow(domain).await
    }

    async fn is_domain_disposable(&self, domain: &str) -> Result<DisposableLookup, StoreError> {
        self.check()?;
        self.inner.is_domain_disposable(domain).await
    }

    async fn find_provider(&self, domain: &str) -> Result<Option<DomainEntry>, StoreError> {
        self.check()?;
        self.inner.find_provider(domain).await
    }

    async fn upsert_provider(
        &self,
        domain: &str,
        risk_level: RiskLevel,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        self.check()?;
        if self.fail_domain.as_deref() == Some(domain) {
            return Err(StoreError::Conflict {
                domain: domain.to_string(),
            });
        }
        self.inner.upsert_provider(domain, risk_level, source, now).await
    }

    async fn is_remote_allowed(&self, domain: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.is_remote_allowed(domain).await
    }

    async fn upsert_remote_allow(
        &self,
        domain: &str,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        self.check()?;
        self.inner.upsert_remote_allow(domain, source, now).await
    }

    async fn retire_remote_allow(&self, current: &DomainSet) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.retire_remote_allow(current).await
    }

    async fn deactivate_stale(&self, cutoff: i64) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.deactivate_stale(cutoff).await
    }

    async fn provider_stats(&self) -> Result<ProviderStats, StoreError> {
        self.check()?;
        self.inner.provider_stats().await
    }
}
