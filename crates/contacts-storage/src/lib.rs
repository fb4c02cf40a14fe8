//! Storage collaborators for the contact directory: the TTL cache store, the
//! record store contract with in-memory and Postgres backends, and the shared
//! outbound HTTP fetcher.

pub mod cache;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod records;

pub use cache::{get_typed, set_typed, CacheError, CacheStore, Cached, MemoryCache, TtlPolicy};
pub use http::{FetchError, HttpClientConfig, HttpFetcher, SimpleTokenBucket, TokenBucketConfig};
pub use memory::MemoryContactStore;
pub use postgres::{PgCacheStore, PgContactStore};
pub use records::{ContactStore, StoreError};

pub const CRATE_NAME: &str = "contacts-storage";
