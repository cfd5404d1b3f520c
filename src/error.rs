//! Error taxonomy for the reputation engine.
//!
//! Remote-list failures ([`FetchError`]) and persistence failures
//! ([`StoreError`]) are recovered close to where they happen; neither is
//! allowed to turn an email validation into a server error.

use thiserror::Error;

/// Failure to retrieve a remote domain list.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed reading body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of the persistent reputation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The domain already has an active entry on the targeted list.
    #[error("domain '{domain}' is already on the list")]
    Conflict { domain: String },

    #[error("store lock poisoned")]
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown source key '{0}'")]
pub struct UnknownSourceKey(pub String);
