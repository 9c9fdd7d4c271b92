//! Candidate aggregator: runs the sourcing strategies of a mode
//! concurrently, then merges their pools in priority order.

use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;

use crate::core::error::{with_timeout, MatchError};
use crate::core::predicate::Predicate;
use crate::core::variation::VariationSeed;
use crate::models::{GeoPoint, Profile, SourcingStrategy};
use crate::services::{CandidateQuery, ProfileStore, QueryOrder};

/// Everything the strategies need to derive their sub-queries
#[derive(Debug, Clone)]
pub struct SourcingPlan<'a> {
    /// Predicate built from the seeker's full preferences
    pub strict: &'a Predicate,
    /// Predicate the relaxation step settled on
    pub relaxed: &'a Predicate,
    /// Floor predicate
    pub minimal: &'a Predicate,
    pub seeker_location: Option<GeoPoint>,
    pub nearby_radius_km: f64,
    pub new_joiner_days: u32,
    pub seed: Option<&'a VariationSeed>,
    /// Page size; every block of the merged order holds this many items
    pub limit: usize,
    /// Requested page, 1-based
    pub page: usize,
    /// Length of the pageable sequence; blocks stop filling past it
    pub budget: usize,
}

impl SourcingPlan<'_> {
    /// Number of items up to the end of the requested page
    fn window(&self) -> usize {
        self.page * self.limit
    }

    /// Rows a pool must hold so that no block up to `page` runs dry early.
    /// A pool gives at most `cap` per block and skips at most `window` ids
    /// claimed by other pools.
    fn depth(&self, cap: usize) -> usize {
        self.page * cap + self.window()
    }
}

/// A candidate tagged with the strategy that claimed it
#[derive(Debug, Clone)]
pub struct Sourced {
    pub profile: Profile,
    pub strategy: SourcingStrategy,
}

/// Ordered rows one strategy returned
#[derive(Debug, Clone)]
pub struct Pool {
    pub strategy: SourcingStrategy,
    pub profiles: Vec<Profile>,
}

/// Share of each page a strategy may claim
pub fn share(strategy: SourcingStrategy) -> f64 {
    match strategy {
        SourcingStrategy::Premium => 0.2,
        SourcingStrategy::New => 0.2,
        SourcingStrategy::Exact => 0.4,
        SourcingStrategy::Nearby => 0.2,
        SourcingStrategy::Recommended => 1.0,
        SourcingStrategy::Fill => 1.0,
    }
}

pub fn cap(strategy: SourcingStrategy, limit: usize) -> usize {
    ((share(strategy) * limit as f64).ceil() as usize).max(1)
}

/// A mode sourcing from a single strategy gives it the whole page
fn cap_for(strategy: SourcingStrategy, limit: usize, solo: bool) -> usize {
    if solo {
        limit.max(1)
    } else {
        cap(strategy, limit)
    }
}

/// Pageable total of a mode that fills: the final predicate's count,
/// topped up with floor candidates to the end of its last page.
pub fn topped_up_total(relaxed_total: u64, floor_total: u64, limit: u64) -> u64 {
    let pages = relaxed_total.div_ceil(limit.max(1)).max(1);
    floor_total.min(pages * limit).max(relaxed_total)
}

fn seeded_or(seed: Option<&VariationSeed>, fallback: QueryOrder) -> QueryOrder {
    match seed {
        Some(seed) => QueryOrder::Seeded(seed.as_str().to_string()),
        None => fallback,
    }
}

/// Build the sub-query for one strategy. `None` means the strategy cannot
/// run for this seeker (e.g. nearby without a location).
pub fn query_for(strategy: SourcingStrategy, plan: &SourcingPlan<'_>, limit: usize) -> Option<CandidateQuery> {
    let (predicate, order) = match strategy {
        SourcingStrategy::Premium => (plan.relaxed.clone().premium(), QueryOrder::RecentlyActive),
        SourcingStrategy::New => {
            let predicate = if plan.relaxed.joined_within_days.is_some() {
                plan.relaxed.clone()
            } else {
                plan.relaxed.clone().with_joined_within(plan.new_joiner_days)
            };
            (predicate, QueryOrder::NewestFirst)
        }
        SourcingStrategy::Exact => (plan.strict.clone(), QueryOrder::RecentlyActive),
        SourcingStrategy::Nearby => {
            let location = plan.seeker_location?;
            let predicate = if plan.relaxed.near.is_some() {
                plan.relaxed.clone()
            } else {
                plan.relaxed.clone().with_near(location, plan.nearby_radius_km)
            };
            (predicate, QueryOrder::Nearest(location))
        }
        SourcingStrategy::Recommended => (
            plan.relaxed.clone(),
            seeded_or(plan.seed, QueryOrder::RecentlyActive),
        ),
        SourcingStrategy::Fill => (
            plan.minimal.clone(),
            seeded_or(plan.seed, QueryOrder::RecentlyActive),
        ),
    };

    Some(CandidateQuery::new(predicate, order, limit))
}

/// Result of walking the blocks up to the requested page
#[derive(Debug, Default)]
pub struct Assembled {
    /// The requested page, as `(pool index, row index)` pairs
    pub block: Vec<(usize, usize)>,
    /// Some block ended below its room because every pool ran dry
    pub short: bool,
}

/// Walk pages `1..=page`. Each page draws up to its cap from every pool in
/// priority order, skipping ids an earlier draw already placed, until the
/// page holds `limit` items or the budget is spent. A candidate's position
/// depends only on the pools, never on which page was asked for.
pub fn assemble(pools: &[Pool], limit: usize, page: usize, budget: usize, solo: bool) -> Assembled {
    let mut cursors = vec![0usize; pools.len()];
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut placed = 0;
    let mut assembled = Assembled::default();

    for _ in 0..page {
        let room = limit.min(budget.saturating_sub(placed));
        let mut block = Vec::with_capacity(room);

        for (index, pool) in pools.iter().enumerate() {
            let pool_cap = cap_for(pool.strategy, limit, solo);
            let mut taken = 0;
            while taken < pool_cap && block.len() < room {
                let Some(profile) = pool.profiles.get(cursors[index]) else {
                    break;
                };
                cursors[index] += 1;
                if claimed.insert(profile.id.as_str()) {
                    block.push((index, cursors[index] - 1));
                    taken += 1;
                }
            }
        }

        if block.len() < room {
            assembled.short = true;
        }
        placed += block.len();
        assembled.block = block;
    }

    assembled
}

fn take_block(pools: &[Pool], block: &[(usize, usize)]) -> Vec<Sourced> {
    block
        .iter()
        .map(|&(pool, row)| Sourced {
            profile: pools[pool].profiles[row].clone(),
            strategy: pools[pool].strategy,
        })
        .collect()
}

/// Run `strategies` concurrently and cut the requested page from their
/// merged order.
///
/// A failing strategy degrades to an empty pool. The request only fails
/// when every strategy that ran failed. When `backfill` is set and some
/// page came up short, a floor query joins as the last pool.
pub async fn aggregate(
    store: &dyn ProfileStore,
    plan: &SourcingPlan<'_>,
    strategies: &[SourcingStrategy],
    backfill: bool,
    timeout: Duration,
) -> Result<Vec<Sourced>, MatchError> {
    let mut ordered: Vec<SourcingStrategy> = strategies.to_vec();
    ordered.sort();
    ordered.dedup();

    let solo = ordered.len() == 1;
    let queries: Vec<_> = ordered
        .iter()
        .map(|strategy| {
            let depth = plan.depth(cap_for(*strategy, plan.limit, solo));
            (*strategy, query_for(*strategy, plan, depth))
        })
        .collect();

    let fetches = queries.iter().map(|(strategy, query)| async move {
        let result = match query {
            Some(query) => Some(with_timeout(timeout, store.fetch(query)).await),
            None => None,
        };
        (*strategy, result)
    });
    let results = join_all(fetches).await;

    let attempted = results.iter().filter(|(_, r)| r.is_some()).count();
    let mut pools = Vec::with_capacity(results.len() + 1);
    let mut first_error = None;
    for (strategy, result) in results {
        match result {
            None => {
                tracing::debug!("Strategy {} skipped", strategy.as_str());
            }
            Some(Ok(profiles)) => pools.push(Pool { strategy, profiles }),
            Some(Err(e)) => {
                tracing::warn!("Strategy {} failed, continuing without it: {}", strategy.as_str(), e);
                first_error.get_or_insert(e);
            }
        }
    }

    if attempted > 0 && pools.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    let mut assembled = assemble(&pools, plan.limit, plan.page, plan.budget, solo);

    if backfill && assembled.short {
        let query = CandidateQuery::new(
            plan.minimal.clone(),
            QueryOrder::RecentlyActive,
            plan.depth(plan.limit),
        );
        match with_timeout(timeout, store.fetch(&query)).await {
            Ok(profiles) => {
                pools.push(Pool {
                    strategy: SourcingStrategy::Fill,
                    profiles,
                });
                assembled = assemble(&pools, plan.limit, plan.page, plan.budget, solo);
                tracing::debug!("Backfill joined, page holds {} candidates", assembled.block.len());
            }
            Err(e) => tracing::warn!("Backfill failed, returning a short page: {}", e),
        }
    }

    tracing::debug!(
        "Page {} assembled from {} pools: {} candidates",
        plan.page,
        pools.len(),
        assembled.block.len()
    );

    Ok(take_block(&pools, &assembled.block))
}
