mod cache;
mod fetcher;
mod resolver;
mod sync;
mod traits;
mod types;

pub use cache::{CacheSourceStats, CacheStats, SourceCache, DEFAULT_TTL};
pub use fetcher::{is_valid_domain, normalize_domain, parse_line, parse_list, HttpListFetcher};
pub use resolver::DomainResolver;
pub use sync::{SyncOrchestrator, SyncResult};
pub use traits::ListFetcher;
pub use types::{
    merge_source, unix_now, AddOutcome, AllowReason, BlockReason, DisposableLookup, DomainEntry,
    DomainSet, EntrySelector, GlobalAllowEntry, ListKind, ProviderStats, RiskLevel,
    UpsertOutcome, UserListEntry, VerdictResult,
};
