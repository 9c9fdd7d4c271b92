// Integration tests for Vivah Match

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

use vivah_match::core::predicate::Predicate;
use vivah_match::core::{MatchEngine, MatchError};
use vivah_match::models::{
    Gender, GeoPoint, MatchMode, MatchRequest, PreferenceCriteria, Profile, SourcingStrategy, SubscriptionTier,
};
use vivah_match::services::{
    CandidateQuery, FixedClock, MemoryStore, ProfileStore, QueryOrder, ShownAudit, StoreError,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 6, 30, 0).unwrap()
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(now()))
}

fn create_test_profile(id: &str, gender: Gender) -> Profile {
    Profile {
        id: id.to_string(),
        display_name: format!("User {}", id),
        gender,
        birth_date: NaiveDate::from_ymd_opt(1997, 4, 12).unwrap(),
        height_cm: 160,
        religion: Some("Hindu".to_string()),
        caste: None,
        mother_tongue: Some("Hindi".to_string()),
        marital_status: Some("Never Married".to_string()),
        education: Some("MBA".to_string()),
        employment: Some("Private".to_string()),
        income: None,
        manglik: None,
        state: Some("Delhi".to_string()),
        city: Some("New Delhi".to_string()),
        location: Some(GeoPoint::new(28.0, 77.0)),
        photo_url: None,
        subscription: SubscriptionTier::Free,
        is_active: true,
        is_complete: true,
        is_deleted: false,
        last_active_at: Some(now() - Duration::hours(2)),
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn candidates(count: usize) -> Vec<Profile> {
    (0..count)
        .map(|i| create_test_profile(&format!("c{:03}", i), Gender::Female))
        .collect()
}

async fn seeded_store(count: usize, preferences: Option<PreferenceCriteria>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(create_test_profile("seeker", Gender::Male)).await;
    store.insert_profiles(candidates(count)).await;
    if let Some(preferences) = preferences {
        store.set_preferences(preferences).await;
    }
    store
}

fn ids(response: &vivah_match::MatchResponse) -> Vec<String> {
    response.matches.iter().map(|m| m.id.clone()).collect()
}

#[tokio::test]
async fn test_identical_requests_are_idempotent() {
    let store = seeded_store(30, Some(PreferenceCriteria::open("seeker"))).await;
    let engine = MatchEngine::from_store(store.clone(), clock());
    let request = MatchRequest::new("seeker", MatchMode::Best)
        .page(1, 10)
        .with_seed("session-42");

    let first = engine.discover(&request).await.unwrap();
    let second = engine.discover(&request).await.unwrap();

    // A second engine over the same data stands in for another process
    let other = MatchEngine::from_store(store, clock());
    let third = other.discover(&request).await.unwrap();

    assert_eq!(first.matches.len(), 10);
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(ids(&first), ids(&third));
    assert_eq!(first.session_seed.as_deref(), Some("session-42"));
}

#[tokio::test]
async fn test_distinct_seeds_vary_order() {
    let store = seeded_store(30, None).await;
    let engine = MatchEngine::from_store(store, clock());

    let a = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Discovery).page(1, 30).with_seed("seed-aaaa-1"))
        .await
        .unwrap();
    let b = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Discovery).page(1, 30).with_seed("seed-bbbb-2"))
        .await
        .unwrap();

    assert_ne!(ids(&a), ids(&b));

    let set_a: BTreeSet<_> = ids(&a).into_iter().collect();
    let set_b: BTreeSet<_> = ids(&b).into_iter().collect();
    assert_eq!(set_a, set_b);
}

#[tokio::test]
async fn test_missing_preferences_only_blocks_preference_modes() {
    let store = seeded_store(5, None).await;
    let engine = MatchEngine::from_store(store, clock());

    let best = engine.discover(&MatchRequest::new("seeker", MatchMode::Best)).await;
    assert!(matches!(best, Err(MatchError::MissingPreferences(_))));

    let today = engine.discover(&MatchRequest::new("seeker", MatchMode::Today)).await;
    assert!(matches!(today, Err(MatchError::MissingPreferences(_))));

    let discovery = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Discovery))
        .await
        .unwrap();
    assert_eq!(discovery.matches.len(), 5);
    assert!(discovery.matches.iter().all(|m| m.gender == Gender::Female));
}

#[tokio::test]
async fn test_nearby_expands_radius_and_sorts_by_distance() {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(create_test_profile("seeker", Gender::Male)).await;

    // ~30 km, ~90 km and ~180 km north of the seeker
    let mut far = create_test_profile("far", Gender::Female);
    far.location = Some(GeoPoint::new(29.62, 77.0));
    let mut mid = create_test_profile("mid", Gender::Female);
    mid.location = Some(GeoPoint::new(28.81, 77.0));
    let mut near = create_test_profile("near", Gender::Female);
    near.location = Some(GeoPoint::new(28.27, 77.0));
    store.insert_profiles(vec![far, mid, near]).await;

    let engine = MatchEngine::from_store(store, clock());
    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Nearby).page(1, 10).with_radius(50.0))
        .await
        .unwrap();

    // 50 -> 100 -> 200 -> 400 km, capped at three expansions
    assert_eq!(response.match_info.match_level, 3);
    assert_eq!(response.match_info.radius_km, Some(400.0));
    assert!(response.match_info.criteria_relaxed);
    assert_eq!(ids(&response), vec!["near", "mid", "far"]);

    let distances: Vec<f64> = response.matches.iter().map(|m| m.distance.unwrap()).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(response.matches[0].distance_text.as_deref(), Some("30 km away"));
}

#[tokio::test]
async fn test_nearby_stops_once_target_met() {
    let store = seeded_store(12, None).await;
    let engine = MatchEngine::from_store(store, clock());

    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Nearby).page(1, 10))
        .await
        .unwrap();

    assert_eq!(response.match_info.match_level, 0);
    assert_eq!(response.match_info.radius_km, Some(50.0));
    assert!(!response.match_info.criteria_relaxed);
    assert_eq!(response.matches.len(), 10);
    assert_eq!(response.pagination.total, 12);
}

#[tokio::test]
async fn test_nearby_requires_location() {
    let store = Arc::new(MemoryStore::new());
    let mut seeker = create_test_profile("seeker", Gender::Male);
    seeker.location = None;
    store.insert_profile(seeker).await;

    let engine = MatchEngine::from_store(store, clock());
    let result = engine.discover(&MatchRequest::new("seeker", MatchMode::Nearby)).await;
    assert!(matches!(result, Err(MatchError::MissingLocation(_))));
}

#[tokio::test]
async fn test_height_relaxation_scenario() {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(create_test_profile("seeker", Gender::Male)).await;

    let mut short = create_test_profile("short", Gender::Female);
    short.height_cm = 147;
    let mut tall = create_test_profile("tall", Gender::Female);
    tall.height_cm = 172;
    let mut too_tall = create_test_profile("too-tall", Gender::Female);
    too_tall.height_cm = 180;
    store.insert_profiles(vec![short, tall, too_tall]).await;

    store
        .set_preferences(PreferenceCriteria {
            min_height_cm: Some(150),
            max_height_cm: Some(170),
            education: vec!["MBA".to_string()],
            employment: vec!["Private".to_string()],
            mother_tongue: vec!["Hindi".to_string()],
            ..PreferenceCriteria::open("seeker")
        })
        .await;

    let engine = MatchEngine::from_store(store, clock());
    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Best).page(1, 2).with_seed("session-77"))
        .await
        .unwrap();

    assert!(response.match_info.criteria_relaxed);
    assert_eq!(response.match_info.match_level, 4);
    assert_eq!(
        response.match_info.relaxed_criteria,
        vec!["drop_education", "drop_employment", "drop_mother_tongue", "widen_height_5"]
    );
    assert_eq!(response.pagination.total, 2);

    let found: BTreeSet<_> = ids(&response).into_iter().collect();
    assert_eq!(found, ["short", "tall"].iter().map(|s| s.to_string()).collect());

    // Scores are against the original 150-170 preference
    assert!(response.matches.iter().all(|m| m.score < 100));
    assert!(response.matches.iter().all(|m| !m.matched_factors.contains(&"height".to_string())));
}

#[tokio::test]
async fn test_pools_are_deduplicated_and_tiered() {
    let store = seeded_store(20, Some(PreferenceCriteria::open("seeker"))).await;
    let mut gold = create_test_profile("gold", Gender::Female);
    gold.subscription = SubscriptionTier::Premium;
    let mut fresh = create_test_profile("fresh", Gender::Female);
    fresh.created_at = now() - Duration::days(2);
    store.insert_profiles(vec![gold, fresh]).await;

    let engine = MatchEngine::from_store(store, clock());
    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Best).page(1, 10).with_seed("session-dedupe"))
        .await
        .unwrap();

    let unique: HashSet<_> = ids(&response).into_iter().collect();
    assert_eq!(unique.len(), response.matches.len());

    assert_eq!(response.matches[0].id, "gold");
    assert_eq!(response.matches[0].tier, SourcingStrategy::Premium);
    assert_eq!(response.matches[0].tag.as_deref(), Some("Premium"));
    assert_eq!(response.matches[1].id, "fresh");
    assert_eq!(response.matches[1].tier, SourcingStrategy::New);
}

#[tokio::test]
async fn test_new_mode_widens_join_window() {
    let store = seeded_store(0, None).await;
    let mut recent = Vec::new();
    for (i, days) in [3i64, 20, 45, 80].iter().enumerate() {
        let mut p = create_test_profile(&format!("n{}", i), Gender::Female);
        p.created_at = now() - Duration::days(*days);
        recent.push(p);
    }
    store.insert_profiles(recent).await;

    let engine = MatchEngine::from_store(store, clock());
    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::New).page(1, 3))
        .await
        .unwrap();

    assert_eq!(response.match_info.relaxed_criteria, vec!["joined_within_30_days", "joined_within_60_days"]);
    assert_eq!(ids(&response), vec!["n0", "n1", "n2"]);
    assert_eq!(response.pagination.total, 3);
}

#[tokio::test]
async fn test_today_is_stable_within_a_day() {
    let store = seeded_store(25, Some(PreferenceCriteria::open("seeker"))).await;
    let engine = MatchEngine::from_store(store, clock());

    let morning = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Today).page(1, 10).with_seed("tab-one-123"))
        .await
        .unwrap();
    let evening = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Today).page(1, 10).with_seed("tab-two-456"))
        .await
        .unwrap();

    assert_eq!(ids(&morning), ids(&evening));
    assert_eq!(morning.session_seed.as_deref(), Some("2026-10-17"));
}

#[tokio::test]
async fn test_exclusions_are_never_returned() {
    let store = seeded_store(5, None).await;
    store.exclude("seeker", "c000").await;
    store.exclude("seeker", "c001").await;

    let engine = MatchEngine::from_store(store, clock());
    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Discovery))
        .await
        .unwrap();

    let found = ids(&response);
    assert_eq!(found.len(), 3);
    assert!(!found.contains(&"c000".to_string()));
    assert!(!found.contains(&"seeker".to_string()));
}

/// Every 4th candidate is premium, every 5th joined this week, and
/// activity times spread so each ordering differs
fn mixed_pool(count: usize) -> Vec<Profile> {
    (0..count)
        .map(|i| {
            let mut p = create_test_profile(&format!("c{:03}", i), Gender::Female);
            if i % 4 == 0 {
                p.subscription = SubscriptionTier::Premium;
            }
            if i % 5 == 0 {
                p.created_at = now() - Duration::days(3);
            }
            p.last_active_at = Some(now() - Duration::hours((i % 7) as i64));
            p
        })
        .collect()
}

/// Request pages until one past the last, checking each page on the way
async fn walk_pages(engine: &MatchEngine, mode: MatchMode, limit: u32, seed: &str) -> (Vec<Vec<String>>, u64) {
    let first = engine
        .discover(&MatchRequest::new("seeker", mode).page(1, limit).with_seed(seed))
        .await
        .unwrap();
    let total = first.pagination.total;
    let pages = first.pagination.pages;

    let mut walked = vec![ids(&first)];
    for page in 2..=pages + 1 {
        let response = engine
            .discover(&MatchRequest::new("seeker", mode).page(page, limit).with_seed(seed))
            .await
            .unwrap();
        assert_eq!(response.pagination.total, total, "{} page {} changed the total", mode, page);
        if page > pages {
            assert!(response.matches.is_empty(), "{} page {} is past the last page", mode, page);
        } else {
            walked.push(ids(&response));
        }
    }
    (walked, total)
}

fn assert_pages_partition(mode: MatchMode, walked: &[Vec<String>], total: u64, limit: usize) {
    let mut seen = HashSet::new();
    for (index, page) in walked.iter().enumerate() {
        let expected = if index + 1 < walked.len() {
            limit
        } else {
            total as usize - index * limit
        };
        assert_eq!(page.len(), expected, "{} page {} size", mode, index + 1);
        for id in page {
            assert!(seen.insert(id.clone()), "{} showed {} twice", mode, id);
        }
    }
    assert_eq!(seen.len() as u64, total, "{} pages do not cover the total", mode);
}

#[tokio::test]
async fn test_pages_partition_the_listing() {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(create_test_profile("seeker", Gender::Male)).await;
    store.insert_profiles(mixed_pool(40)).await;
    store.set_preferences(PreferenceCriteria::open("seeker")).await;
    let engine = MatchEngine::from_store(store, clock());

    for mode in [MatchMode::Best, MatchMode::Today, MatchMode::Discovery] {
        for limit in [7u32, 10] {
            let (walked, total) = walk_pages(&engine, mode, limit, "session-abc1").await;
            assert_eq!(total, 40);
            assert_pages_partition(mode, &walked, total, limit as usize);
        }
    }
}

#[tokio::test]
async fn test_fill_tops_up_the_last_page_only() {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(create_test_profile("seeker", Gender::Male)).await;
    for i in 0..12 {
        store.insert_profile(create_test_profile(&format!("h{:02}", i), Gender::Female)).await;
    }
    for i in 0..30 {
        let mut p = create_test_profile(&format!("m{:02}", i), Gender::Female);
        p.religion = Some("Muslim".to_string());
        store.insert_profile(p).await;
    }
    store
        .set_preferences(PreferenceCriteria {
            religion: vec!["Hindu".to_string()],
            ..PreferenceCriteria::open("seeker")
        })
        .await;
    let engine = MatchEngine::from_store(store, clock());

    let (walked, total) = walk_pages(&engine, MatchMode::Best, 10, "session-fill").await;
    assert_eq!(total, 20);
    assert_eq!(walked.len(), 2);
    assert_pages_partition(MatchMode::Best, &walked, total, 10);
    assert!(walked[0].iter().all(|id| id.starts_with('h')));

    let last = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Best).page(2, 10).with_seed("session-fill"))
        .await
        .unwrap();
    assert_eq!(last.match_info.match_level, 0);
    let hindu = last.matches.iter().filter(|m| m.id.starts_with('h')).count();
    assert_eq!(hindu, 2);
    for candidate in last.matches.iter().filter(|m| m.id.starts_with('m')) {
        assert_eq!(candidate.tier, SourcingStrategy::Fill);
        assert_eq!(candidate.tag.as_deref(), Some("You may also like"));
    }
}

#[tokio::test]
async fn test_nearby_pages_follow_distance() {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(create_test_profile("seeker", Gender::Male)).await;
    let spread: Vec<Profile> = (0..9)
        .map(|i| {
            let mut p = create_test_profile(&format!("d{}", i), Gender::Female);
            p.location = Some(GeoPoint::new(28.0 + 0.02 * i as f64, 77.0));
            p
        })
        .collect();
    store.insert_profiles(spread).await;
    let engine = MatchEngine::from_store(store, clock());

    let (walked, total) = walk_pages(&engine, MatchMode::Nearby, 4, "unused").await;
    assert_eq!(total, 9);
    assert_pages_partition(MatchMode::Nearby, &walked, total, 4);
    let flat: Vec<String> = walked.concat();
    let expected: Vec<String> = (0..9).map(|i| format!("d{}", i)).collect();
    assert_eq!(flat, expected);
}

#[tokio::test]
async fn test_stored_zero_radius_falls_back_to_default() {
    let store = seeded_store(
        4,
        Some(PreferenceCriteria {
            radius_km: Some(0.0),
            ..PreferenceCriteria::open("seeker")
        }),
    )
    .await;
    let engine = MatchEngine::from_store(store, clock());

    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Nearby).page(1, 10))
        .await
        .unwrap();

    assert_eq!(response.match_info.radius_km, Some(400.0));
    assert_eq!(response.matches.len(), 4);
}

/// Fails every fetch except those matching `allow`
struct FlakyStore {
    inner: Arc<MemoryStore>,
    allow: fn(&CandidateQuery) -> bool,
}

#[async_trait]
impl ProfileStore for FlakyStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        self.inner.get_profile(id).await
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        self.inner.count(predicate).await
    }

    async fn fetch(&self, query: &CandidateQuery) -> Result<Vec<Profile>, StoreError> {
        if (self.allow)(query) {
            self.inner.fetch(query).await
        } else {
            Err(StoreError::Unavailable("replica down".to_string()))
        }
    }
}

#[tokio::test]
async fn test_failed_strategy_degrades_to_empty_pool() {
    let store = seeded_store(10, Some(PreferenceCriteria::open("seeker"))).await;
    let flaky = Arc::new(FlakyStore {
        inner: store.clone(),
        allow: |query| matches!(query.order, QueryOrder::Seeded(_)),
    });

    let engine = MatchEngine::new(flaky, store.clone(), store, clock());
    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Best).page(1, 5).with_seed("session-flaky"))
        .await
        .unwrap();

    assert_eq!(response.matches.len(), 5);
    assert!(response
        .matches
        .iter()
        .all(|m| matches!(m.tier, SourcingStrategy::Recommended | SourcingStrategy::Fill)));
}

#[tokio::test]
async fn test_all_strategies_failing_fails_request() {
    let store = seeded_store(10, Some(PreferenceCriteria::open("seeker"))).await;
    let flaky = Arc::new(FlakyStore {
        inner: store.clone(),
        allow: |_| false,
    });

    let engine = MatchEngine::new(flaky, store.clone(), store, clock());
    let result = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Best).with_seed("session-down"))
        .await;

    assert!(matches!(result, Err(MatchError::DataLayerUnavailable(_))));
}

struct ChannelAudit(mpsc::UnboundedSender<(String, MatchMode, Vec<String>)>);

#[async_trait]
impl ShownAudit for ChannelAudit {
    async fn record_shown(&self, seeker_id: &str, mode: MatchMode, profile_ids: &[String]) -> Result<(), StoreError> {
        self.0
            .send((seeker_id.to_string(), mode, profile_ids.to_vec()))
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[tokio::test]
async fn test_shown_audit_receives_page() {
    let store = seeded_store(8, None).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = MatchEngine::from_store(store, clock()).with_audit(Arc::new(ChannelAudit(tx)));

    let response = engine
        .discover(&MatchRequest::new("seeker", MatchMode::Discovery).page(1, 5))
        .await
        .unwrap();

    let (seeker_id, mode, shown) = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seeker_id, "seeker");
    assert_eq!(mode, MatchMode::Discovery);
    assert_eq!(shown, ids(&response));
}

#[tokio::test]
async fn test_other_gender_seeker_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(create_test_profile("seeker", Gender::Other)).await;

    let engine = MatchEngine::from_store(store, clock());
    let result = engine.discover(&MatchRequest::new("seeker", MatchMode::Discovery)).await;
    assert!(matches!(result, Err(MatchError::UnsupportedGender(Gender::Other))));
}
