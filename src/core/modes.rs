//! Per-mode contract table.
//!
//! A mode selects a relaxation ladder, a list of sourcing strategies and a
//! rank blend. All five modes run through the same pipeline.

use crate::core::relaxation::RelaxationStep;
use crate::models::{MatchMode, SourcingStrategy};

use RelaxationStep::*;

const BEST_LADDER: &[RelaxationStep] = &[
    DropEducation,
    DropEmployment,
    DropMotherTongue,
    WidenHeight(5),
    WidenAge(3),
    DropCaste,
    DropManglik,
    DropIncome,
    DropState,
    DropMaritalStatus,
    DropReligion,
    DropHeight,
    DropAge,
];

const TODAY_LADDER: &[RelaxationStep] = &[
    WidenAge(2),
    WidenHeight(5),
    DropEducation,
    DropEmployment,
    DropMotherTongue,
    DropCaste,
    DropManglik,
    DropIncome,
    DropState,
    DropMaritalStatus,
    DropReligion,
    DropHeight,
    DropAge,
];

const DISCOVERY_LADDER: &[RelaxationStep] = &[
    DropEducation,
    DropEmployment,
    DropMotherTongue,
    DropCaste,
    DropManglik,
    DropIncome,
    DropState,
    WidenHeight(10),
    WidenAge(5),
    DropMaritalStatus,
    DropReligion,
    DropHeight,
    DropAge,
];

/// Join-recency window the `new` mode starts from, in days
pub const NEW_JOINER_WINDOW_DAYS: u32 = 15;

const NEW_LADDER: &[RelaxationStep] = &[JoinedWithin(30), JoinedWithin(60), JoinedWithin(90)];

/// How a mode orders candidates inside a tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RankBlend {
    /// Compatibility score only
    ScoreOnly,
    /// `score * score_weight + perturbation * perturbation_weight`
    Blended {
        score_weight: f64,
        perturbation_weight: f64,
    },
    /// Nearest first
    DistanceAscending,
}

impl RankBlend {
    pub fn rank(&self, score: u8, perturbation: u32) -> f64 {
        match *self {
            RankBlend::ScoreOnly | RankBlend::DistanceAscending => score as f64,
            RankBlend::Blended {
                score_weight,
                perturbation_weight,
            } => score as f64 * score_weight + perturbation as f64 * perturbation_weight,
        }
    }
}

/// Where the variation seed comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Once per client session token
    Session,
    /// Once per calendar day in the seeker's locale
    Daily,
    /// Mode does not perturb ordering
    None,
}

/// How the mode's working predicate is derived before sourcing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relaxer {
    /// General relaxation ladder over the strict predicate
    Ladder,
    /// Join-recency window widening over the core predicate
    JoinWindow,
    /// Radius expansion over the core predicate
    Geo,
}

#[derive(Debug, Clone, Copy)]
pub struct ModeProfile {
    pub mode: MatchMode,
    pub requires_preferences: bool,
    pub relaxer: Relaxer,
    pub ladder: &'static [RelaxationStep],
    pub strategies: &'static [SourcingStrategy],
    pub blend: RankBlend,
    pub seed: SeedPolicy,
}

impl ModeProfile {
    pub fn for_mode(mode: MatchMode) -> ModeProfile {
        match mode {
            MatchMode::Best => ModeProfile {
                mode,
                requires_preferences: true,
                relaxer: Relaxer::Ladder,
                ladder: BEST_LADDER,
                strategies: &[
                    SourcingStrategy::Premium,
                    SourcingStrategy::New,
                    SourcingStrategy::Exact,
                    SourcingStrategy::Nearby,
                    SourcingStrategy::Recommended,
                    SourcingStrategy::Fill,
                ],
                blend: RankBlend::Blended {
                    score_weight: 0.7,
                    perturbation_weight: 0.3,
                },
                seed: SeedPolicy::Session,
            },
            MatchMode::Today => ModeProfile {
                mode,
                requires_preferences: true,
                relaxer: Relaxer::Ladder,
                ladder: TODAY_LADDER,
                strategies: &[
                    SourcingStrategy::Premium,
                    SourcingStrategy::Exact,
                    SourcingStrategy::Recommended,
                    SourcingStrategy::Fill,
                ],
                blend: RankBlend::Blended {
                    score_weight: 0.6,
                    perturbation_weight: 0.4,
                },
                seed: SeedPolicy::Daily,
            },
            MatchMode::New => ModeProfile {
                mode,
                requires_preferences: false,
                relaxer: Relaxer::JoinWindow,
                ladder: NEW_LADDER,
                strategies: &[SourcingStrategy::New],
                blend: RankBlend::ScoreOnly,
                seed: SeedPolicy::None,
            },
            MatchMode::Nearby => ModeProfile {
                mode,
                requires_preferences: false,
                relaxer: Relaxer::Geo,
                ladder: &[],
                strategies: &[SourcingStrategy::Nearby],
                blend: RankBlend::DistanceAscending,
                seed: SeedPolicy::None,
            },
            MatchMode::Discovery => ModeProfile {
                mode,
                requires_preferences: false,
                relaxer: Relaxer::Ladder,
                ladder: DISCOVERY_LADDER,
                strategies: &[SourcingStrategy::Recommended, SourcingStrategy::Fill],
                blend: RankBlend::Blended {
                    score_weight: 0.6,
                    perturbation_weight: 0.4,
                },
                seed: SeedPolicy::Session,
            },
        }
    }
}
