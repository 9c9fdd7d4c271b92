//! Result composer: orders the scored page and shapes it for the client.

use std::cmp::Ordering;

use crate::core::distance::distance_text;
use crate::core::modes::RankBlend;
use crate::core::scoring::Compatibility;
use crate::models::{Profile, ScoredCandidate, SourcingStrategy};

/// A scored candidate still carrying ranking internals
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub profile: Profile,
    pub strategy: SourcingStrategy,
    pub age: u8,
    pub compatibility: Compatibility,
    pub perturbation: u32,
    pub rank: f64,
    pub distance_km: Option<f64>,
}

impl RankedCandidate {
    /// Drop internal fields and attach presentation metadata
    pub fn into_scored(self, relaxed: bool) -> ScoredCandidate {
        let tag = tag_for(self.strategy, relaxed);
        let profile = self.profile;
        ScoredCandidate {
            is_premium: profile.is_premium(),
            id: profile.id,
            display_name: profile.display_name,
            gender: profile.gender,
            age: self.age,
            height_cm: profile.height_cm,
            religion: profile.religion,
            caste: profile.caste,
            mother_tongue: profile.mother_tongue,
            marital_status: profile.marital_status,
            education: profile.education,
            employment: profile.employment,
            city: profile.city,
            state: profile.state,
            photo_url: profile.photo_url,
            score: self.compatibility.score,
            matched_factors: self.compatibility.matched_factors,
            tier: self.strategy,
            tag: Some(tag.to_string()),
            distance: self.distance_km.map(|d| (d * 10.0).round() / 10.0),
            distance_text: self.distance_km.map(distance_text),
        }
    }
}

/// UI tag for a sourcing tier. Relaxed responses never claim the
/// recommended tier as an exact fit.
pub fn tag_for(strategy: SourcingStrategy, relaxed: bool) -> &'static str {
    match strategy {
        SourcingStrategy::Premium => "Premium",
        SourcingStrategy::New => "Just joined",
        SourcingStrategy::Exact => "Exact match",
        SourcingStrategy::Nearby => "Near you",
        SourcingStrategy::Recommended if relaxed => "Suggested",
        SourcingStrategy::Recommended => "Recommended",
        SourcingStrategy::Fill => "You may also like",
    }
}

/// Sort order for a mode: tier priority, then rank, then id
pub fn compare(blend: RankBlend, a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    if blend == RankBlend::DistanceAscending {
        let da = a.distance_km.unwrap_or(f64::MAX);
        let db = b.distance_km.unwrap_or(f64::MAX);
        return da
            .partial_cmp(&db)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.profile.id.cmp(&b.profile.id));
    }

    a.strategy
        .priority()
        .cmp(&b.strategy.priority())
        .then_with(|| b.rank.partial_cmp(&a.rank).unwrap_or(Ordering::Equal))
        .then_with(|| a.profile.id.cmp(&b.profile.id))
}

/// Order one assembled page and shape it for the client
pub fn compose_page(mut ranked: Vec<RankedCandidate>, blend: RankBlend, relaxed: bool) -> Vec<ScoredCandidate> {
    ranked.sort_by(|a, b| compare(blend, a, b));

    ranked
        .into_iter()
        .map(|candidate| candidate.into_scored(relaxed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn ranked(id: &str, strategy: SourcingStrategy, rank: f64, distance_km: Option<f64>) -> RankedCandidate {
        RankedCandidate {
            profile: Profile {
                id: id.to_string(),
                display_name: id.to_string(),
                gender: Gender::Female,
                birth_date: NaiveDate::from_ymd_opt(1997, 1, 1).unwrap(),
                height_cm: 160,
                religion: None,
                caste: None,
                mother_tongue: None,
                marital_status: None,
                education: None,
                employment: None,
                income: None,
                manglik: None,
                state: None,
                city: None,
                location: None,
                photo_url: None,
                subscription: Default::default(),
                is_active: true,
                is_complete: true,
                is_deleted: false,
                last_active_at: None,
                created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            },
            strategy,
            age: 29,
            compatibility: Compatibility {
                score: rank as u8,
                matched_factors: vec![],
            },
            perturbation: 42,
            rank,
            distance_km,
        }
    }

    #[test]
    fn test_tier_then_rank() {
        let blend = RankBlend::ScoreOnly;
        let pool = vec![
            ranked("fill-high", SourcingStrategy::Fill, 99.0, None),
            ranked("exact-low", SourcingStrategy::Exact, 10.0, None),
            ranked("premium", SourcingStrategy::Premium, 50.0, None),
            ranked("exact-high", SourcingStrategy::Exact, 80.0, None),
        ];

        let page = compose_page(pool, blend, false);
        let ids: Vec<_> = page.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["premium", "exact-high", "exact-low", "fill-high"]);
    }

    #[test]
    fn test_equal_rank_breaks_on_id() {
        let pool = vec![
            ranked("c2", SourcingStrategy::Recommended, 70.0, None),
            ranked("c0", SourcingStrategy::Recommended, 70.0, None),
            ranked("c1", SourcingStrategy::Recommended, 75.0, None),
        ];
        let page = compose_page(pool, RankBlend::ScoreOnly, true);
        let ids: Vec<_> = page.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c0", "c2"]);
        assert_eq!(page[0].tag.as_deref(), Some("Suggested"));
    }

    #[test]
    fn test_distance_mode_sorts_ascending() {
        let pool = vec![
            ranked("far", SourcingStrategy::Nearby, 90.0, Some(40.2)),
            ranked("close", SourcingStrategy::Nearby, 10.0, Some(0.4)),
            ranked("mid", SourcingStrategy::Nearby, 50.0, Some(12.6)),
        ];
        let page = compose_page(pool, RankBlend::DistanceAscending, false);
        let ids: Vec<_> = page.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["close", "mid", "far"]);
        assert_eq!(page[0].distance_text.as_deref(), Some("<1 km away"));
        assert_eq!(page[1].distance_text.as_deref(), Some("13 km away"));
    }

    #[test]
    fn test_relaxed_recommended_tag() {
        assert_eq!(tag_for(SourcingStrategy::Recommended, false), "Recommended");
        assert_eq!(tag_for(SourcingStrategy::Recommended, true), "Suggested");
    }
}
