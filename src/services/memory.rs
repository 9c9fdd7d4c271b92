use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::core::distance::haversine_km;
use crate::core::predicate::Predicate;
use crate::core::variation::rolling_hash;
use crate::models::{MatchMode, PreferenceCriteria, Profile};
use crate::services::store::{
    CandidateQuery, ExclusionStore, PreferenceStore, ProfileStore, QueryOrder, ShownAudit, StoreError,
};

/// Entry of the shown-profiles audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownEntry {
    pub seeker_id: String,
    pub mode: MatchMode,
    pub profile_ids: Vec<String>,
}

/// In-process implementation of every collaborator interface.
///
/// Evaluates predicates with [`Predicate::matches`], so it is the reference
/// for what the SQL translation must return.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<String, Profile>>,
    preferences: RwLock<HashMap<String, PreferenceCriteria>>,
    exclusions: RwLock<HashMap<String, BTreeSet<String>>>,
    shown: RwLock<Vec<ShownEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.profiles.write().await.insert(profile.id.clone(), profile);
    }

    pub async fn insert_profiles(&self, profiles: impl IntoIterator<Item = Profile>) {
        let mut guard = self.profiles.write().await;
        for profile in profiles {
            guard.insert(profile.id.clone(), profile);
        }
    }

    pub async fn set_preferences(&self, preferences: PreferenceCriteria) {
        self.preferences
            .write()
            .await
            .insert(preferences.seeker_id.clone(), preferences);
    }

    /// Record that `seeker_id` liked or blocked `target_id`
    pub async fn exclude(&self, seeker_id: &str, target_id: &str) {
        self.exclusions
            .write()
            .await
            .entry(seeker_id.to_string())
            .or_default()
            .insert(target_id.to_string());
    }

    pub async fn shown_log(&self) -> Vec<ShownEntry> {
        self.shown.read().await.clone()
    }

    fn order(query_order: &QueryOrder, a: &Profile, b: &Profile) -> Ordering {
        let primary = match query_order {
            QueryOrder::RecentlyActive => b.last_active_at.cmp(&a.last_active_at),
            QueryOrder::NewestFirst => b.created_at.cmp(&a.created_at),
            QueryOrder::Nearest(center) => {
                let da = a.location.map(|p| haversine_km(*center, p)).unwrap_or(f64::MAX);
                let db = b.location.map(|p| haversine_km(*center, p)).unwrap_or(f64::MAX);
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            }
            QueryOrder::Seeded(seed) => {
                let ha = rolling_hash(&format!("{}:{}", seed, a.id));
                let hb = rolling_hash(&format!("{}:{}", seed, b.id));
                ha.cmp(&hb)
            }
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(id).cloned())
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        let guard = self.profiles.read().await;
        Ok(guard.values().filter(|p| predicate.matches(p)).count() as u64)
    }

    async fn fetch(&self, query: &CandidateQuery) -> Result<Vec<Profile>, StoreError> {
        let guard = self.profiles.read().await;
        let mut matched: Vec<Profile> = guard
            .values()
            .filter(|p| query.predicate.matches(p))
            .cloned()
            .collect();
        drop(guard);

        matched.sort_by(|a, b| Self::order(&query.order, a, b));
        matched.truncate(query.limit);
        Ok(matched)
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get_preferences(&self, seeker_id: &str) -> Result<Option<PreferenceCriteria>, StoreError> {
        Ok(self.preferences.read().await.get(seeker_id).cloned())
    }
}

#[async_trait]
impl ExclusionStore for MemoryStore {
    async fn excluded_ids(&self, seeker_id: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .exclusions
            .read()
            .await
            .get(seeker_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ShownAudit for MemoryStore {
    async fn record_shown(
        &self,
        seeker_id: &str,
        mode: MatchMode,
        profile_ids: &[String],
    ) -> Result<(), StoreError> {
        self.shown.write().await.push(ShownEntry {
            seeker_id: seeker_id.to_string(),
            mode,
            profile_ids: profile_ids.to_vec(),
        });
        Ok(())
    }
}
