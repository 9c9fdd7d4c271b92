use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::core::aggregator::{aggregate, topped_up_total, SourcingPlan};
use crate::core::composer::{compose_page, RankedCandidate};
use crate::core::distance::haversine_km;
use crate::core::error::{with_timeout, MatchError};
use crate::core::geo::{expand_radius, GeoExpansionPolicy};
use crate::core::modes::{ModeProfile, RankBlend, Relaxer, SeedPolicy, NEW_JOINER_WINDOW_DAYS};
use crate::core::predicate::{ConstraintBuilder, Predicate};
use crate::core::relaxation::relax;
use crate::core::scoring::score_compatibility;
use crate::core::variation::{new_token, validate_token, VariationSeed};
use crate::models::{
    MatchInfo, MatchMode, MatchRequest, MatchResponse, Pagination, PreferenceCriteria, ScoringWeights,
};
use crate::services::{Clock, ExclusionStore, PreferenceStore, ProfileStore, ShownAudit};

/// Tunables for the discovery pipeline
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Deadline for each individual count/fetch
    pub query_timeout: Duration,
    /// Deadline for the whole request
    pub request_deadline: Duration,
    pub default_radius_km: f64,
    pub geo: GeoExpansionPolicy,
    /// Join-recency window of the "new" sourcing strategy
    pub new_joiner_days: u32,
    /// Offset of the seekers' locale, used for calendar-day seeds and ages
    pub utc_offset: FixedOffset,
    pub max_limit: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(2),
            request_deadline: Duration::from_secs(5),
            default_radius_km: 50.0,
            geo: GeoExpansionPolicy::default(),
            new_joiner_days: 7,
            // IST
            utc_offset: FixedOffset::east_opt(330 * 60).unwrap_or_else(|| Utc.fix()),
            max_limit: 100,
        }
    }
}

/// Predicate a mode settled on before sourcing
#[derive(Debug)]
struct Settled {
    predicate: Predicate,
    level: u32,
    relaxed_criteria: Vec<String>,
    total: u64,
    radius_km: Option<f64>,
}

/// Requested or stored radius, falling back to the default when absent or
/// not a positive distance
fn starting_radius(requested: Option<f64>, default_km: f64) -> f64 {
    match requested {
        Some(radius_km) if radius_km.is_finite() && radius_km > 0.0 => radius_km,
        _ => default_km,
    }
}

/// Match discovery pipeline
///
/// # Pipeline Stages
/// 1. Building: load seeker, preferences and exclusions; build predicates
/// 2. Counting / Relaxing: walk the mode's ladder (or expand the radius)
/// 3. Sourcing: run the mode's strategies concurrently and merge
/// 4. Scoring: compatibility against the original preferences
/// 5. Ranking: blend score with the seeded perturbation
/// 6. Paginating: sort the page by tier and rank
#[derive(Clone)]
pub struct MatchEngine {
    profiles: Arc<dyn ProfileStore>,
    preferences: Arc<dyn PreferenceStore>,
    exclusions: Arc<dyn ExclusionStore>,
    audit: Option<Arc<dyn ShownAudit>>,
    clock: Arc<dyn Clock>,
    weights: ScoringWeights,
    settings: EngineSettings,
}

impl MatchEngine {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        preferences: Arc<dyn PreferenceStore>,
        exclusions: Arc<dyn ExclusionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            profiles,
            preferences,
            exclusions,
            audit: None,
            clock,
            weights: ScoringWeights::default(),
            settings: EngineSettings::default(),
        }
    }

    /// Engine over a single backend that implements every collaborator
    pub fn from_store<S>(store: Arc<S>, clock: Arc<dyn Clock>) -> Self
    where
        S: ProfileStore + PreferenceStore + ExclusionStore + ShownAudit + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), clock).with_audit(store)
    }

    pub fn with_audit(mut self, audit: Arc<dyn ShownAudit>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Produce one page of matches for `request`, under the request deadline
    pub async fn discover(&self, request: &MatchRequest) -> Result<MatchResponse, MatchError> {
        let deadline = self.settings.request_deadline;
        match tokio::time::timeout(deadline, self.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "Request for {} ({}) exceeded the {:?} deadline",
                    request.seeker_id,
                    request.mode,
                    deadline
                );
                Err(MatchError::DataLayerTimeout(deadline))
            }
        }
    }

    async fn run(&self, request: &MatchRequest) -> Result<MatchResponse, MatchError> {
        let mode = ModeProfile::for_mode(request.mode);
        let timeout = self.settings.query_timeout;
        let limit = request.limit.clamp(1, self.settings.max_limit);
        let page = request.page.max(1);
        let seeker_id = request.seeker_id.as_str();

        let now = self.clock.now();
        let today = now.with_timezone(&self.settings.utc_offset).date_naive();

        // Building
        let (seeker, preferences, excluded) = tokio::try_join!(
            with_timeout(timeout, self.profiles.get_profile(seeker_id)),
            with_timeout(timeout, self.preferences.get_preferences(seeker_id)),
            with_timeout(timeout, self.exclusions.excluded_ids(seeker_id)),
        )?;

        let seeker = seeker.ok_or_else(|| MatchError::SeekerNotFound(seeker_id.to_string()))?;
        let preferences = match preferences {
            Some(preferences) => preferences,
            None if mode.requires_preferences => {
                return Err(MatchError::MissingPreferences(seeker_id.to_string()));
            }
            None => {
                tracing::debug!("No preferences for {}, using open criteria", seeker_id);
                PreferenceCriteria::open(seeker_id)
            }
        };
        if mode.relaxer == Relaxer::Geo && seeker.location.is_none() {
            return Err(MatchError::MissingLocation(seeker_id.to_string()));
        }

        let builder = ConstraintBuilder::new(&seeker, &preferences, excluded, now, today)?;
        let strict = builder.strict();
        let minimal = builder.minimal();
        let (seed, session_seed) = self.resolve_seed(&mode, request, today);
        let radius_km = starting_radius(
            request.radius_km.or(preferences.radius_km),
            self.settings.default_radius_km,
        );

        // Counting / Relaxing. The target stays one page so that every page
        // of a listing settles on the same predicate.
        let target = limit as u64;
        let store = self.profiles.as_ref();
        let settled = match mode.relaxer {
            Relaxer::Ladder => {
                let relaxation = relax(store, strict.clone(), mode.ladder, target, timeout).await?;
                Settled {
                    relaxed_criteria: relaxation.step_names(),
                    level: relaxation.level,
                    total: relaxation.count,
                    predicate: relaxation.predicate,
                    radius_km: None,
                }
            }
            Relaxer::JoinWindow => {
                let base = builder.core().with_joined_within(NEW_JOINER_WINDOW_DAYS);
                let relaxation = relax(store, base, mode.ladder, target, timeout).await?;
                Settled {
                    relaxed_criteria: relaxation.step_names(),
                    level: relaxation.level,
                    total: relaxation.count,
                    predicate: relaxation.predicate,
                    radius_km: None,
                }
            }
            Relaxer::Geo => {
                let center = seeker
                    .location
                    .ok_or_else(|| MatchError::MissingLocation(seeker_id.to_string()))?;
                let expansion = expand_radius(
                    store,
                    &builder.core(),
                    center,
                    radius_km,
                    target,
                    self.settings.geo,
                    timeout,
                )
                .await?;
                let relaxed_criteria = if expansion.expansions > 0 {
                    vec![format!("radius_{}km", expansion.radius_km.round() as u64)]
                } else {
                    Vec::new()
                };
                Settled {
                    relaxed_criteria,
                    level: expansion.expansions,
                    total: expansion.count,
                    predicate: expansion.predicate,
                    radius_km: Some(expansion.radius_km),
                }
            }
        };

        tracing::info!(
            "Seeker {} mode {}: level {}, {} candidates under final criteria",
            seeker_id,
            request.mode,
            settled.level,
            settled.total
        );

        // Modes with more than one strategy fill past the final predicate
        let fills = mode.strategies.len() > 1;
        let total = if fills && (settled.total == 0 || settled.total % target != 0) {
            let floor_total = with_timeout(timeout, store.count(&minimal)).await?;
            topped_up_total(settled.total, floor_total, target)
        } else {
            settled.total
        };

        // Sourcing
        let plan = SourcingPlan {
            strict: &strict,
            relaxed: &settled.predicate,
            minimal: &minimal,
            seeker_location: seeker.location,
            nearby_radius_km: radius_km,
            new_joiner_days: self.settings.new_joiner_days,
            seed: seed.as_ref(),
            limit: limit as usize,
            page: page as usize,
            budget: usize::try_from(total).unwrap_or(usize::MAX),
        };
        let pool = aggregate(store, &plan, mode.strategies, fills, timeout).await?;

        // Scoring + Ranking
        let ranked: Vec<RankedCandidate> = pool
            .into_iter()
            .map(|sourced| {
                let compatibility =
                    score_compatibility(&seeker, &sourced.profile, &preferences, &self.weights, today);
                let perturbation = seed
                    .as_ref()
                    .map(|s| s.perturbation(&sourced.profile.id))
                    .unwrap_or(0);
                let rank = mode.blend.rank(compatibility.score, perturbation);
                let distance_km = match (mode.blend, seeker.location, sourced.profile.location) {
                    (RankBlend::DistanceAscending, Some(from), Some(to)) => Some(haversine_km(from, to)),
                    _ => None,
                };

                RankedCandidate {
                    age: sourced.profile.age_on(today),
                    profile: sourced.profile,
                    strategy: sourced.strategy,
                    compatibility,
                    perturbation,
                    rank,
                    distance_km,
                }
            })
            .collect();

        // Paginating
        let relaxed = !settled.relaxed_criteria.is_empty();
        let matches = compose_page(ranked, mode.blend, relaxed);

        self.record_shown(seeker_id, request.mode, matches.iter().map(|m| m.id.clone()).collect());

        Ok(MatchResponse {
            matches,
            pagination: Pagination::new(total, page, limit),
            match_info: MatchInfo {
                match_level: settled.level,
                criteria_relaxed: relaxed,
                relaxed_criteria: settled.relaxed_criteria,
                radius_km: settled.radius_km,
            },
            session_seed,
            notice: None,
        })
    }

    /// Derive the variation seed and the value echoed back to the client
    fn resolve_seed(
        &self,
        mode: &ModeProfile,
        request: &MatchRequest,
        today: NaiveDate,
    ) -> (Option<VariationSeed>, Option<String>) {
        match mode.seed {
            SeedPolicy::None => (None, request.session_seed.clone()),
            SeedPolicy::Daily => (
                Some(VariationSeed::daily(request.mode, &request.seeker_id, today)),
                Some(today.format("%Y-%m-%d").to_string()),
            ),
            SeedPolicy::Session => {
                let token = match request.session_seed.as_deref().map(validate_token) {
                    Some(Ok(token)) => token.to_string(),
                    Some(Err(e)) => {
                        tracing::warn!("Ignoring session seed for {}: {}", request.seeker_id, e);
                        new_token()
                    }
                    None => new_token(),
                };
                (
                    Some(VariationSeed::session(request.mode, &request.seeker_id, &token)),
                    Some(token),
                )
            }
        }
    }

    /// Fire-and-forget append to the shown-profiles audit
    fn record_shown(&self, seeker_id: &str, mode: MatchMode, ids: Vec<String>) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        if ids.is_empty() {
            return;
        }

        let seeker_id = seeker_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = audit.record_shown(&seeker_id, mode, &ids).await {
                tracing::warn!("Failed to record shown profiles for {}: {}", seeker_id, e);
            }
        });
    }
}
