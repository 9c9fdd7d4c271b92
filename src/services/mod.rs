// Service exports
pub mod cache;
pub mod memory;
pub mod postgres;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager, CachedPreferenceStore};
pub use memory::{MemoryStore, ShownEntry};
pub use postgres::PostgresStore;
pub use store::{
    CandidateQuery, Clock, ExclusionStore, FixedClock, PreferenceStore, ProfileStore, QueryOrder, ShownAudit,
    StoreError, SystemClock,
};
