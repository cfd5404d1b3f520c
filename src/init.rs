//! Initialization helpers for the application startup.

use crate::config::Config;
use crate::db::DbClient;
use crate::engine::unix_now;
use crate::store::{MemoryStore, ReputationStore, SqliteStore};
use std::sync::Arc;
use tracing::{error, info};

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = config.logging.level.clone();

        // Connection-level chatter from the HTTP stack, unless asked for
        if !filter.contains("hyper") {
            filter.push_str(",hyper=off");
        }
        if !filter.contains("reqwest") {
            filter.push_str(",reqwest=warn");
        }

        tracing_subscriber::EnvFilter::new(filter)
    });

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Builds the reputation store selected by `[storage] backend`.
///
/// A SQLite database that cannot be opened or initialized falls back to a
/// seeded in-memory store so the service can still answer requests.
pub fn init_store(config: &Config) -> Arc<dyn ReputationStore> {
    let now = unix_now();

    if config.storage.backend.eq_ignore_ascii_case("memory") {
        info!("Using in-memory reputation store.");
        return Arc::new(MemoryStore::seeded(now));
    }

    let path = config.storage.sqlite_path.clone();
    info!("Opening SQLite reputation store at {}", path);
    let client = match DbClient::new(path) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to open SQLite database: {}", e);
            return Arc::new(MemoryStore::seeded(now));
        }
    };

    if let Err(e) = client.initialize(now) {
        error!("Failed to initialize SQLite database: {}", e);
        return Arc::new(MemoryStore::seeded(now));
    }

    Arc::new(SqliteStore::new(Arc::new(client)))
}
