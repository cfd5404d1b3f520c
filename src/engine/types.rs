use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Parsed contents of one remote list.
pub type DomainSet = FxHashSet<String>;

/// Risk attached to a domain. Ordered so that merging two levels is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    UserBlocklist,
    GlobalBlocklist,
    GithubDisposable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    UserAllowlist,
    GlobalAllowlist,
    GithubAllowlist,
}

/// Classification of a single domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictResult {
    pub is_blocked: bool,
    pub is_disposable: bool,
    pub block_reason: Option<BlockReason>,
    pub allow_reason: Option<AllowReason>,
    pub risk_level: RiskLevel,
    pub source: String,
    pub confidence: f64,
}

impl VerdictResult {
    pub fn allowed(reason: AllowReason, source: impl Into<String>, confidence: f64) -> Self {
        Self {
            is_blocked: false,
            is_disposable: false,
            block_reason: None,
            allow_reason: Some(reason),
            risk_level: RiskLevel::Low,
            source: source.into(),
            confidence,
        }
    }

    pub fn blocked(
        reason: BlockReason,
        risk_level: RiskLevel,
        source: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            is_blocked: true,
            is_disposable: true,
            block_reason: Some(reason),
            allow_reason: None,
            risk_level,
            source: source.into(),
            confidence,
        }
    }

    /// No source knows the domain.
    pub fn clean() -> Self {
        Self {
            is_blocked: false,
            is_disposable: false,
            block_reason: None,
            allow_reason: None,
            risk_level: RiskLevel::Low,
            source: "Clean Domain".to_string(),
            confidence: 0.7,
        }
    }
}

/// Row of the global disposable-providers table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainEntry {
    pub domain: String,
    pub is_active: bool,
    pub risk_level: RiskLevel,
    pub detected_at: i64,
    pub last_seen_at: i64,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisposableLookup {
    pub is_disposable: bool,
    pub risk_level: Option<RiskLevel>,
    pub source: Option<String>,
}

/// Which per-user list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Allow,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserListEntry {
    pub id: i64,
    pub user_id: String,
    pub domain: String,
    pub reason: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalAllowEntry {
    pub id: i64,
    pub domain: String,
    pub reason: Option<String>,
    pub added_by: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
}

/// Result of adding a domain to a user list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Created(UserListEntry),
    /// A soft-deleted row for the same domain was switched back on.
    Reactivated(UserListEntry),
}

impl AddOutcome {
    pub fn entry(&self) -> &UserListEntry {
        match self {
            AddOutcome::Created(entry) | AddOutcome::Reactivated(entry) => entry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Targets a user list entry for soft deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySelector {
    Id(i64),
    Domain(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    pub total: u64,
    pub active: u64,
    pub low_risk: u64,
    pub medium_risk: u64,
    pub high_risk: u64,
    pub critical_risk: u64,
}

/// Appends `incoming` to a comma-joined provenance string, skipping names
/// that are already present.
pub fn merge_source(existing: Option<&str>, incoming: &str) -> String {
    let mut names: Vec<&str> = existing
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    let incoming = incoming.trim();
    if !incoming.is_empty() && !names.contains(&incoming) {
        names.push(incoming);
    }
    names.join(", ")
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_merge_never_downgrades() {
        assert_eq!(RiskLevel::High.max(RiskLevel::Low), RiskLevel::High);
        assert_eq!(RiskLevel::Medium.max(RiskLevel::High), RiskLevel::High);
        assert_eq!(RiskLevel::Critical.max(RiskLevel::High), RiskLevel::Critical);
        assert_eq!("medium".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_merge_source() {
        assert_eq!(merge_source(None, "a"), "a");
        assert_eq!(merge_source(Some(""), "a"), "a");
        assert_eq!(merge_source(Some("a"), "b"), "a, b");
        assert_eq!(merge_source(Some("a, b"), "a"), "a, b");
        assert_eq!(merge_source(Some("initial_seed"), "x/y"), "initial_seed, x/y");
    }

    #[test]
    fn test_verdict_serializes_reasons_in_snake_case() {
        let verdict = VerdictResult::blocked(BlockReason::GithubDisposable, RiskLevel::High, "x", 0.9);
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["block_reason"], "github_disposable");
        assert_eq!(json["allow_reason"], serde_json::Value::Null);
        assert_eq!(json["risk_level"], "high");
    }
}
