use std::time::Duration;

use crate::core::error::{with_timeout, MatchError};
use crate::core::predicate::Predicate;
use crate::models::GeoPoint;
use crate::services::ProfileStore;

/// Radius growth policy for location-based discovery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoExpansionPolicy {
    pub growth_factor: f64,
    pub max_expansions: u32,
}

impl Default for GeoExpansionPolicy {
    fn default() -> Self {
        Self {
            growth_factor: 2.0,
            max_expansions: 3,
        }
    }
}

/// Outcome of radius expansion
#[derive(Debug, Clone)]
pub struct GeoExpansion {
    /// `base` constrained to the final radius
    pub predicate: Predicate,
    pub radius_km: f64,
    pub expansions: u32,
    pub count: u64,
}

/// Grow the search radius around `center` until `target` candidates fall
/// inside it or the expansion cap is reached.
pub async fn expand_radius(
    store: &dyn ProfileStore,
    base: &Predicate,
    center: GeoPoint,
    initial_radius_km: f64,
    target: u64,
    policy: GeoExpansionPolicy,
    timeout: Duration,
) -> Result<GeoExpansion, MatchError> {
    let mut radius_km = initial_radius_km;
    let mut predicate = base.clone().with_near(center, radius_km);
    let mut count = with_timeout(timeout, store.count(&predicate)).await?;
    let mut expansions = 0;

    while count < target && expansions < policy.max_expansions {
        radius_km *= policy.growth_factor;
        expansions += 1;
        predicate = base.clone().with_near(center, radius_km);
        count = with_timeout(timeout, store.count(&predicate)).await?;

        tracing::debug!(
            "Geo expansion {}: radius {:.1} km, {} candidates",
            expansions,
            radius_km,
            count
        );
    }

    Ok(GeoExpansion {
        predicate,
        radius_km,
        expansions,
        count,
    })
}
