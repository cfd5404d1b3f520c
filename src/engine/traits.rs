use super::types::DomainSet;
use crate::error::FetchError;

/// Retrieves a newline-delimited remote domain list.
#[async_trait::async_trait]
pub trait ListFetcher: Send + Sync {
    /// Returns the set of syntactically valid domains found at `url`.
    async fn fetch(&self, url: &str) -> Result<DomainSet, FetchError>;
}
