use crate::engine::RiskLevel;
use crate::error::UnknownSourceKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// "sqlite" or "memory".
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_sync_enable")]
    pub enable: bool,
    #[serde(default = "default_sync_interval")]
    pub interval_hours: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u64,
    /// Bearer token required by the sync trigger endpoint, if set.
    #[serde(default, skip_serializing)]
    pub cron_secret: Option<String>,
}

/// One remote newline-delimited domain list.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub url: String,
    pub name: String,
    /// Risk stored for domains a disposable list reports; for the allowlist,
    /// the risk attached to its allow verdicts.
    #[serde(default = "default_source_risk")]
    pub risk_level: RiskLevel,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    /// Primary disposable list, consulted first.
    #[serde(default = "default_mailchecker")]
    pub mailchecker: SourceConfig,
    /// Secondary disposable list.
    #[serde(default = "default_disposable_blocklist")]
    pub disposable_blocklist: SourceConfig,
    /// Community allowlist of domains that look disposable but are not.
    #[serde(default = "default_disposable_allowlist")]
    pub disposable_allowlist: SourceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enable")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
}

/// Stable identifier of a configured remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKey {
    Mailchecker,
    DisposableBlocklist,
    DisposableAllowlist,
}

impl SourceKey {
    /// Sync order: disposable lists first, allowlist last.
    pub const ALL: [SourceKey; 3] = [
        SourceKey::Mailchecker,
        SourceKey::DisposableBlocklist,
        SourceKey::DisposableAllowlist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKey::Mailchecker => "mailchecker",
            SourceKey::DisposableBlocklist => "disposable_blocklist",
            SourceKey::DisposableAllowlist => "disposable_allowlist",
        }
    }

    pub fn is_allowlist(&self) -> bool {
        matches!(self, SourceKey::DisposableAllowlist)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKey {
    type Err = UnknownSourceKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownSourceKey(s.to_string()))
    }
}

impl SourcesConfig {
    pub fn get(&self, key: SourceKey) -> &SourceConfig {
        match key {
            SourceKey::Mailchecker => &self.mailchecker,
            SourceKey::DisposableBlocklist => &self.disposable_blocklist,
            SourceKey::DisposableAllowlist => &self.disposable_allowlist,
        }
    }
}

// Defaults
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_storage_backend() -> String {
    "sqlite".to_string()
}
fn default_sqlite_path() -> String {
    "truemailer.db".to_string()
}
fn default_cache_ttl() -> u64 {
    300 // 5 minutes
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_connect_timeout_ms() -> u64 {
    3_000
}
fn default_user_agent() -> String {
    "TrueMailer/1.0".to_string()
}
fn default_sync_enable() -> bool {
    true
}
fn default_sync_interval() -> u64 {
    24
}
fn default_batch_size() -> usize {
    100
}
fn default_stale_after_days() -> u64 {
    7
}
fn default_source_risk() -> RiskLevel {
    RiskLevel::High
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_stats_enable() -> bool {
    true
}
fn default_log_interval() -> u64 {
    300
}
fn default_mailchecker() -> SourceConfig {
    SourceConfig {
        url: "https://raw.githubusercontent.com/FGRibreau/mailchecker/master/list.txt".to_string(),
        name: "FGRibreau/mailchecker".to_string(),
        risk_level: RiskLevel::High,
    }
}
fn default_disposable_blocklist() -> SourceConfig {
    SourceConfig {
        url: "https://raw.githubusercontent.com/disposable-email-domains/disposable-email-domains/main/disposable_email_blocklist.conf".to_string(),
        name: "disposable-email-domains/blocklist".to_string(),
        risk_level: RiskLevel::High,
    }
}
fn default_disposable_allowlist() -> SourceConfig {
    SourceConfig {
        url: "https://raw.githubusercontent.com/disposable-email-domains/disposable-email-domains/main/allowlist.conf".to_string(),
        name: "disposable-email-domains/allowlist".to_string(),
        risk_level: RiskLevel::Low,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            sync: SyncConfig::default(),
            sources: SourcesConfig::default(),
            logging: LoggingConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enable: default_sync_enable(),
            interval_hours: default_sync_interval(),
            batch_size: default_batch_size(),
            stale_after_days: default_stale_after_days(),
            cron_secret: None,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            mailchecker: default_mailchecker(),
            disposable_blocklist: default_disposable_blocklist(),
            disposable_allowlist: default_disposable_allowlist(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: default_stats_enable(),
            log_interval_seconds: default_log_interval(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            port = 9000

            [sync]
            batch_size = 50

            [sources.mailchecker]
            url = "http://localhost/list.txt"
            name = "local"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.stale_after_days, 7);
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.sources.mailchecker.name, "local");
        assert_eq!(config.sources.mailchecker.risk_level, RiskLevel::High);
        assert_eq!(
            config.sources.disposable_allowlist.risk_level,
            RiskLevel::Low
        );
    }

    #[test]
    fn test_source_key_parsing() {
        assert_eq!(
            "disposable_blocklist".parse::<SourceKey>(),
            Ok(SourceKey::DisposableBlocklist)
        );
        assert_eq!(
            "nope".parse::<SourceKey>(),
            Err(UnknownSourceKey("nope".to_string()))
        );
        for key in SourceKey::ALL {
            assert_eq!(key.as_str().parse::<SourceKey>(), Ok(key));
        }
    }
}
