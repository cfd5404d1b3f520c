//! Persistent reputation data: per-user allow/block lists, the global
//! allowlist and the global disposable-providers table.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

use crate::engine::{
    AddOutcome, DisposableLookup, DomainEntry, DomainSet, EntrySelector, ListKind, ProviderStats,
    RiskLevel, UpsertOutcome, UserListEntry,
};
use crate::error::StoreError;
use async_trait::async_trait;

/// Well-known disposable providers present before the first sync.
pub const SEED_PROVIDERS: [&str; 10] = [
    "10minutemail.com",
    "tempmail.org",
    "guerrillamail.com",
    "mailinator.com",
    "temp-mail.org",
    "throwaway.email",
    "yopmail.com",
    "maildrop.cc",
    "sharklasers.com",
    "guerrillamailblock.com",
];

pub const SEED_SOURCE: &str = "initial_seed";

/// Storage seam for everything the resolver and the sync job persist.
///
/// Domains are expected lowercase; implementations normalize user input on
/// the list mutators. Timestamps are Unix seconds supplied by the caller.
#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Whether `user_id` has an active entry for `domain` on the given list.
    async fn is_user_listed(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
    ) -> Result<bool, StoreError>;

    /// Adds a domain to a user list, reactivating a soft-deleted row instead
    /// of duplicating it. An already active entry yields
    /// [`StoreError::Conflict`].
    async fn add_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
        reason: Option<&str>,
        now: i64,
    ) -> Result<AddOutcome, StoreError>;

    /// Newest first, inactive rows included.
    async fn list_user_entries(
        &self,
        kind: ListKind,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserListEntry>, StoreError>;

    /// Soft-deletes matching active entries; returns how many were switched off.
    async fn remove_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        selector: &EntrySelector,
    ) -> Result<u64, StoreError>;

    async fn is_globally_allowed(&self, domain: &str) -> Result<bool, StoreError>;

    /// Inserts or reactivates a global allowlist row.
    async fn upsert_global_allow(
        &self,
        domain: &str,
        reason: Option<&str>,
        added_by: Option<&str>,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn remove_global_allow(&self, domain: &str) -> Result<u64, StoreError>;

    /// Looks the domain up among active disposable providers.
    async fn is_domain_disposable(&self, domain: &str) -> Result<DisposableLookup, StoreError>;

    async fn find_provider(&self, domain: &str) -> Result<Option<DomainEntry>, StoreError>;

    /// Inserts a provider, or refreshes an existing one: `last_seen_at` moves
    /// forward, the row is reactivated, risk is merged with `max` and the
    /// source name is appended to the provenance.
    async fn upsert_provider(
        &self,
        domain: &str,
        risk_level: RiskLevel,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Whether the last synced copy of the remote allowlist has `domain`.
    async fn is_remote_allowed(&self, domain: &str) -> Result<bool, StoreError>;

    /// Records `domain` as present in the remote allowlist, refreshing
    /// `last_seen_at` and reactivating it if it had been retired.
    async fn upsert_remote_allow(
        &self,
        domain: &str,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Deactivates remote allowlist rows missing from the latest snapshot.
    async fn retire_remote_allow(&self, current: &DomainSet) -> Result<u64, StoreError>;

    /// Deactivates every provider and remote allowlist row last seen before
    /// `cutoff`.
    async fn deactivate_stale(&self, cutoff: i64) -> Result<u64, StoreError>;

    async fn provider_stats(&self) -> Result<ProviderStats, StoreError>;
}
