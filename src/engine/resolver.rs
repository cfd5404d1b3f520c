//! Domain classification across every reputation source.
//!
//! Sources are consulted in a fixed priority order and the first match wins:
//!
//! 1. the caller's own allowlist,
//! 2. the caller's own blocklist,
//! 3. the global allowlist,
//! 4. the remote allowlist (its last synced copy when the list is unreachable),
//! 5. the remote disposable lists (primary, then secondary),
//! 6. the locally persisted disposable providers,
//! 7. otherwise the domain is clean.
//!
//! Confidence drops the further a match is from explicit user intent.
//! Failures in any one source are logged and treated as "no match", so a
//! resolution always completes.

use super::cache::SourceCache;
use super::fetcher::normalize_domain;
use super::types::{AllowReason, BlockReason, ListKind, RiskLevel, VerdictResult};
use crate::config::SourcesConfig;
use crate::error::StoreError;
use crate::store::ReputationStore;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DomainResolver {
    store: Arc<dyn ReputationStore>,
    cache: Arc<SourceCache>,
    sources: SourcesConfig,
}

impl DomainResolver {
    pub fn new(
        store: Arc<dyn ReputationStore>,
        cache: Arc<SourceCache>,
        sources: SourcesConfig,
    ) -> Self {
        Self {
            store,
            cache,
            sources,
        }
    }

    pub async fn resolve(&self, domain: &str, user_id: Option<&str>) -> VerdictResult {
        let domain = normalize_domain(domain);
        let verdict = self.evaluate(&domain, user_id.filter(|id| !id.is_empty())).await;
        debug!(
            "Resolved {} -> blocked={} source='{}' confidence={}",
            domain, verdict.is_blocked, verdict.source, verdict.confidence
        );
        verdict
    }

    async fn evaluate(&self, domain: &str, user_id: Option<&str>) -> VerdictResult {
        if let Some(user_id) = user_id {
            let allowed = self
                .store
                .is_user_listed(ListKind::Allow, user_id, domain);
            if Self::matched("user allowlist", allowed).await {
                return VerdictResult::allowed(
                    AllowReason::UserAllowlist,
                    "User Custom Allowlist",
                    1.0,
                );
            }

            let blocked = self
                .store
                .is_user_listed(ListKind::Block, user_id, domain);
            if Self::matched("user blocklist", blocked).await {
                return VerdictResult::blocked(
                    BlockReason::UserBlocklist,
                    RiskLevel::High,
                    "User Custom Blocklist",
                    1.0,
                );
            }
        }

        if Self::matched("global allowlist", self.store.is_globally_allowed(domain)).await {
            return VerdictResult::allowed(AllowReason::GlobalAllowlist, "Global Allowlist", 0.95);
        }

        let remote_allow = &self.sources.disposable_allowlist;
        let live = self.cache.get(&remote_allow.url).await;
        let remote_allowed = if live.is_empty() {
            // Remote list unreachable: fall back to the last synced copy.
            Self::matched("synced allowlist", self.store.is_remote_allowed(domain)).await
        } else {
            live.contains(domain)
        };
        if remote_allowed {
            let mut verdict =
                VerdictResult::allowed(AllowReason::GithubAllowlist, &remote_allow.name, 0.9);
            verdict.risk_level = remote_allow.risk_level;
            return verdict;
        }

        let primary = &self.sources.mailchecker;
        let secondary = &self.sources.disposable_blocklist;
        let (primary_set, secondary_set) =
            tokio::join!(self.cache.get(&primary.url), self.cache.get(&secondary.url));

        if primary_set.contains(domain) {
            return VerdictResult::blocked(
                BlockReason::GithubDisposable,
                RiskLevel::High,
                &primary.name,
                0.95,
            );
        }
        if secondary_set.contains(domain) {
            return VerdictResult::blocked(
                BlockReason::GithubDisposable,
                RiskLevel::High,
                &secondary.name,
                0.9,
            );
        }

        match self.store.is_domain_disposable(domain).await {
            Ok(lookup) if lookup.is_disposable => {
                return VerdictResult::blocked(
                    BlockReason::GlobalBlocklist,
                    lookup.risk_level.unwrap_or(RiskLevel::High),
                    lookup.source.unwrap_or_else(|| "Local Database".to_string()),
                    0.8,
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Disposable provider lookup failed for {}: {}", domain, e),
        }

        VerdictResult::clean()
    }

    /// Awaits a store membership check, treating a failure as "not listed".
    async fn matched(what: &str, check: impl Future<Output = Result<bool, StoreError>>) -> bool {
        match check.await {
            Ok(found) => found,
            Err(e) => {
                warn!("{} lookup failed, skipping: {}", what, e);
                false
            }
        }
    }
}
