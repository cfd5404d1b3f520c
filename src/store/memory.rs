//! In-memory reputation store.
//!
//! Used when no SQLite database is configured, and as the default backend in
//! tests. State is lost on restart.

use super::{ReputationStore, SEED_PROVIDERS, SEED_SOURCE};
use crate::engine::{
    merge_source, AddOutcome, DisposableLookup, DomainEntry, DomainSet, EntrySelector,
    GlobalAllowEntry, ListKind, ProviderStats, RiskLevel, UpsertOutcome, UserListEntry,
};
use crate::error::StoreError;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Tables {
    providers: FxHashMap<String, DomainEntry>,
    global_allow: FxHashMap<String, GlobalAllowEntry>,
    remote_allow: FxHashMap<String, RemoteAllow>,
    user_allow: Vec<UserListEntry>,
    user_block: Vec<UserListEntry>,
    next_id: i64,
}

struct RemoteAllow {
    is_active: bool,
    last_seen_at: i64,
}

impl Tables {
    fn user_list(&self, kind: ListKind) -> &Vec<UserListEntry> {
        match kind {
            ListKind::Allow => &self.user_allow,
            ListKind::Block => &self.user_block,
        }
    }

    fn user_list_mut(&mut self, kind: ListKind) -> &mut Vec<UserListEntry> {
        match kind {
            ListKind::Allow => &mut self.user_allow,
            ListKind::Block => &mut self.user_block,
        }
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with the well-known disposable providers.
    pub fn seeded(now: i64) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.write() {
            for domain in SEED_PROVIDERS {
                tables.providers.insert(
                    domain.to_string(),
                    DomainEntry {
                        domain: domain.to_string(),
                        is_active: true,
                        risk_level: RiskLevel::High,
                        detected_at: now,
                        last_seen_at: now,
                        source: Some(SEED_SOURCE.to_string()),
                    },
                );
            }
        }
        store
    }
}

#[async_trait]
impl ReputationStore for MemoryStore {
    async fn is_user_listed(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
    ) -> Result<bool, StoreError> {
        let tables = self.tables.read()?;
        Ok(tables
            .user_list(kind)
            .iter()
            .any(|e| e.is_active && e.user_id == user_id && e.domain == domain))
    }

    async fn add_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
        reason: Option<&str>,
        now: i64,
    ) -> Result<AddOutcome, StoreError> {
        let domain = domain.trim().to_lowercase();
        let mut tables = self.tables.write()?;

        let list = tables.user_list_mut(kind);
        if list
            .iter()
            .any(|e| e.is_active && e.user_id == user_id && e.domain == domain)
        {
            return Err(StoreError::Conflict { domain });
        }

        if let Some(entry) = list
            .iter_mut()
            .rev()
            .find(|e| e.user_id == user_id && e.domain == domain)
        {
            entry.is_active = true;
            entry.created_at = now;
            if let Some(reason) = reason {
                entry.reason = Some(reason.to_string());
            }
            return Ok(AddOutcome::Reactivated(entry.clone()));
        }

        let entry = UserListEntry {
            id: tables.next_id(),
            user_id: user_id.to_string(),
            domain,
            reason: reason.map(str::to_string),
            is_active: true,
            created_at: now,
        };
        tables.user_list_mut(kind).push(entry.clone());
        Ok(AddOutcome::Created(entry))
    }

    async fn list_user_entries(
        &self,
        kind: ListKind,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserListEntry>, StoreError> {
        let tables = self.tables.read()?;
        let mut entries: Vec<UserListEntry> = tables
            .user_list(kind)
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    async fn remove_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        selector: &EntrySelector,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write()?;
        let mut changed = 0;
        for entry in tables.user_list_mut(kind).iter_mut() {
            let selected = match selector {
                EntrySelector::Id(id) => entry.id == *id,
                EntrySelector::Domain(domain) => entry.domain == domain.trim().to_lowercase(),
            };
            if selected && entry.is_active && entry.user_id == user_id {
                entry.is_active = false;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn is_globally_allowed(&self, domain: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read()?;
        Ok(tables
            .global_allow
            .get(domain)
            .is_some_and(|e| e.is_active))
    }

    async fn upsert_global_allow(
        &self,
        domain: &str,
        reason: Option<&str>,
        added_by: Option<&str>,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        let domain = domain.trim().to_lowercase();
        let mut tables = self.tables.write()?;

        if let Some(entry) = tables.global_allow.get_mut(&domain) {
            entry.is_active = true;
            if let Some(reason) = reason {
                entry.reason = Some(reason.to_string());
            }
            if let Some(added_by) = added_by {
                entry.added_by = Some(added_by.to_string());
            }
            return Ok(UpsertOutcome::Updated);
        }

        let id = tables.next_id();
        tables.global_allow.insert(
            domain.clone(),
            GlobalAllowEntry {
                id,
                domain,
                reason: reason.map(str::to_string),
                added_by: added_by.map(str::to_string),
                is_active: true,
                created_at: now,
            },
        );
        Ok(UpsertOutcome::Inserted)
    }

    async fn remove_global_allow(&self, domain: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write()?;
        match tables.global_allow.get_mut(&domain.trim().to_lowercase()) {
            Some(entry) if entry.is_active => {
                entry.is_active = false;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn is_domain_disposable(&self, domain: &str) -> Result<DisposableLookup, StoreError> {
        let tables = self.tables.read()?;
        Ok(match tables.providers.get(domain) {
            Some(entry) if entry.is_active => DisposableLookup {
                is_disposable: true,
                risk_level: Some(entry.risk_level),
                source: entry.source.clone(),
            },
            _ => DisposableLookup::default(),
        })
    }

    async fn find_provider(&self, domain: &str) -> Result<Option<DomainEntry>, StoreError> {
        let tables = self.tables.read()?;
        Ok(tables.providers.get(domain).cloned())
    }

    async fn upsert_provider(
        &self,
        domain: &str,
        risk_level: RiskLevel,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut tables = self.tables.write()?;

        if let Some(entry) = tables.providers.get_mut(domain) {
            entry.last_seen_at = entry.last_seen_at.max(now);
            entry.is_active = true;
            entry.risk_level = entry.risk_level.max(risk_level);
            entry.source = Some(merge_source(entry.source.as_deref(), source));
            return Ok(UpsertOutcome::Updated);
        }

        tables.providers.insert(
            domain.to_string(),
            DomainEntry {
                domain: domain.to_string(),
                is_active: true,
                risk_level,
                detected_at: now,
                last_seen_at: now,
                source: Some(source.to_string()),
            },
        );
        Ok(UpsertOutcome::Inserted)
    }

    async fn is_remote_allowed(&self, domain: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read()?;
        Ok(tables
            .remote_allow
            .get(domain)
            .is_some_and(|e| e.is_active))
    }

    async fn upsert_remote_allow(
        &self,
        domain: &str,
        _source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut tables = self.tables.write()?;

        if let Some(entry) = tables.remote_allow.get_mut(domain) {
            entry.is_active = true;
            entry.last_seen_at = entry.last_seen_at.max(now);
            return Ok(UpsertOutcome::Updated);
        }

        tables.remote_allow.insert(
            domain.to_string(),
            RemoteAllow {
                is_active: true,
                last_seen_at: now,
            },
        );
        Ok(UpsertOutcome::Inserted)
    }

    async fn retire_remote_allow(&self, current: &DomainSet) -> Result<u64, StoreError> {
        let mut tables = self.tables.write()?;
        let mut retired = 0;
        for (domain, entry) in tables.remote_allow.iter_mut() {
            if entry.is_active && !current.contains(domain) {
                entry.is_active = false;
                retired += 1;
            }
        }
        Ok(retired)
    }

    async fn deactivate_stale(&self, cutoff: i64) -> Result<u64, StoreError> {
        let mut tables = self.tables.write()?;
        let mut changed = 0;
        for entry in tables.providers.values_mut() {
            if entry.is_active && entry.last_seen_at < cutoff {
                entry.is_active = false;
                changed += 1;
            }
        }
        for entry in tables.remote_allow.values_mut() {
            if entry.is_active && entry.last_seen_at < cutoff {
                entry.is_active = false;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn provider_stats(&self) -> Result<ProviderStats, StoreError> {
        let tables = self.tables.read()?;
        let mut stats = ProviderStats::default();
        for entry in tables.providers.values() {
            stats.total += 1;
            if entry.is_active {
                stats.active += 1;
            }
            match entry.risk_level {
                RiskLevel::Low => stats.low_risk += 1,
                RiskLevel::Medium => stats.medium_risk += 1,
                RiskLevel::High => stats.high_risk += 1,
                RiskLevel::Critical => stats.critical_risk += 1,
            }
        }
        Ok(stats)
    }
}
