//! SQLite-backed reputation store.
//!
//! Delegates to the shared [`DbClient`], so data survives restarts and is
//! visible to the sync job and the resolver alike.

use super::ReputationStore;
use crate::db::DbClient;
use crate::engine::{
    AddOutcome, DisposableLookup, DomainEntry, DomainSet, EntrySelector, ListKind, ProviderStats,
    RiskLevel, UpsertOutcome, UserListEntry,
};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

pub struct SqliteStore {
    db: Arc<DbClient>,
}

impl SqliteStore {
    pub fn new(db: Arc<DbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReputationStore for SqliteStore {
    async fn is_user_listed(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
    ) -> Result<bool, StoreError> {
        self.db.is_user_listed(kind, user_id, domain)
    }

    async fn add_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
        reason: Option<&str>,
        now: i64,
    ) -> Result<AddOutcome, StoreError> {
        self.db
            .add_user_entry(kind, user_id, &domain.trim().to_lowercase(), reason, now)
    }

    async fn list_user_entries(
        &self,
        kind: ListKind,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserListEntry>, StoreError> {
        self.db.list_user_entries(kind, user_id, limit, offset)
    }

    async fn remove_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        selector: &EntrySelector,
    ) -> Result<u64, StoreError> {
        match selector {
            EntrySelector::Domain(domain) => self.db.remove_user_entry(
                kind,
                user_id,
                &EntrySelector::Domain(domain.trim().to_lowercase()),
            ),
            EntrySelector::Id(_) => self.db.remove_user_entry(kind, user_id, selector),
        }
    }

    async fn is_globally_allowed(&self, domain: &str) -> Result<bool, StoreError> {
        self.db.is_globally_allowed(domain)
    }

    async fn upsert_global_allow(
        &self,
        domain: &str,
        reason: Option<&str>,
        added_by: Option<&str>,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        self.db
            .upsert_global_allow(&domain.trim().to_lowercase(), reason, added_by, now)
    }

    async fn remove_global_allow(&self, domain: &str) -> Result<u64, StoreError> {
        self.db.remove_global_allow(&domain.trim().to_lowercase())
    }

    async fn is_domain_disposable(&self, domain: &str) -> Result<DisposableLookup, StoreError> {
        self.db.is_domain_disposable(domain)
    }

    async fn find_provider(&self, domain: &str) -> Result<Option<DomainEntry>, StoreError> {
        self.db.find_provider(domain)
    }

    async fn upsert_provider(
        &self,
        domain: &str,
        risk_level: RiskLevel,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        self.db.upsert_provider(domain, risk_level, source, now)
    }

    async fn is_remote_allowed(&self, domain: &str) -> Result<bool, StoreError> {
        self.db.is_remote_allowed(domain)
    }

    async fn upsert_remote_allow(
        &self,
        domain: &str,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        self.db.upsert_remote_allow(domain, source, now)
    }

    async fn retire_remote_allow(&self, current: &DomainSet) -> Result<u64, StoreError> {
        self.db.retire_remote_allow(current)
    }

    async fn deactivate_stale(&self, cutoff: i64) -> Result<u64, StoreError> {
        self.db.deactivate_stale(cutoff)
    }

    async fn provider_stats(&self) -> Result<ProviderStats, StoreError> {
        self.db.provider_stats()
    }
}
