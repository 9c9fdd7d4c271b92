//! Collaborator interfaces consumed by the match engine.
//!
//! The engine only ever reads profiles, preferences and exclusions; the
//! single write is the fire-and-forget shown-profiles audit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::core::predicate::Predicate;
use crate::models::{GeoPoint, MatchMode, PreferenceCriteria, Profile};

/// Errors raised by collaborator stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Cache error: {0}")]
    CacheError(#[from] crate::services::cache::CacheError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Ordering a store applies before truncating a fetch
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOrder {
    /// Most recently active first
    RecentlyActive,
    /// Most recently joined first
    NewestFirst,
    /// Closest to the point first
    Nearest(GeoPoint),
    /// Deterministic shuffle keyed by the seed string
    Seeded(String),
}

/// Bounded fetch over the candidate pool. Ties are always broken by id.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub predicate: Predicate,
    pub order: QueryOrder,
    pub limit: usize,
}

impl CandidateQuery {
    pub fn new(predicate: Predicate, order: QueryOrder, limit: usize) -> Self {
        Self {
            predicate,
            order,
            limit,
        }
    }
}

/// Queryable pool of profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError>;

    /// Count-only query
    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError>;

    async fn fetch(&self, query: &CandidateQuery) -> Result<Vec<Profile>, StoreError>;
}

/// Saved partner preferences, one record per seeker
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_preferences(&self, seeker_id: &str) -> Result<Option<PreferenceCriteria>, StoreError>;
}

/// Ids the seeker has liked or blocked
#[async_trait]
pub trait ExclusionStore: Send + Sync {
    async fn excluded_ids(&self, seeker_id: &str) -> Result<BTreeSet<String>, StoreError>;
}

/// Append-only record of profiles shown to a seeker
#[async_trait]
pub trait ShownAudit: Send + Sync {
    async fn record_shown(
        &self,
        seeker_id: &str,
        mode: MatchMode,
        profile_ids: &[String],
    ) -> Result<(), StoreError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
