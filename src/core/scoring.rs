use chrono::NaiveDate;

use crate::models::domain::{contains_ci, filter_values, is_any};
use crate::models::{PreferenceCriteria, Profile, ScoringWeights};

/// Outcome of a compatibility check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compatibility {
    /// 0-100
    pub score: u8,
    pub matched_factors: Vec<String>,
}

/// One weighted check. `None` means the check does not apply and is
/// removed from the denominator.
struct Check {
    factor: &'static str,
    weight: f64,
    outcome: Option<bool>,
}

/// Calculate a compatibility score (0-100) for a candidate against the
/// seeker's original preferences
///
/// Scoring formula:
/// score = 100 * Σ(weight of satisfied checks) / Σ(weight of applicable checks)
///
/// Always computed against the strict preferences, never against whatever
/// relaxed predicate found the candidate.
pub fn score_compatibility(
    seeker: &Profile,
    candidate: &Profile,
    preferences: &PreferenceCriteria,
    weights: &ScoringWeights,
    today: NaiveDate,
) -> Compatibility {
    let age = candidate.age_on(today);

    let checks = [
        Check {
            factor: "age",
            weight: weights.age,
            outcome: Some(
                preferences
                    .age_range()
                    .map_or(true, |(lo, hi)| age >= lo && age <= hi),
            ),
        },
        Check {
            factor: "height",
            weight: weights.height,
            outcome: Some(
                preferences
                    .height_range()
                    .map_or(true, |(lo, hi)| candidate.height_cm >= lo && candidate.height_cm <= hi),
            ),
        },
        Check {
            factor: "religion",
            weight: weights.religion,
            outcome: Some(exact_or_any(&preferences.religion, candidate.religion.as_deref())),
        },
        Check {
            factor: "caste",
            weight: weights.caste,
            outcome: caste_check(seeker, candidate, preferences),
        },
        Check {
            factor: "motherTongue",
            weight: weights.mother_tongue,
            outcome: Some(exact_or_any(&preferences.mother_tongue, candidate.mother_tongue.as_deref())),
        },
        Check {
            factor: "maritalStatus",
            weight: weights.marital_status,
            outcome: Some(exact_or_any(&preferences.marital_status, candidate.marital_status.as_deref())),
        },
        Check {
            factor: "education",
            weight: weights.education,
            outcome: Some(exact_or_any(&preferences.education, candidate.education.as_deref())),
        },
        Check {
            factor: "employment",
            weight: weights.employment,
            outcome: Some(exact_or_any(&preferences.employment, candidate.employment.as_deref())),
        },
        Check {
            factor: "manglik",
            weight: weights.manglik,
            outcome: Some(match preferences.manglik_filter() {
                None => true,
                Some(wanted) => candidate
                    .manglik
                    .as_deref()
                    .is_some_and(|m| m.trim().eq_ignore_ascii_case(wanted)),
            }),
        },
        Check {
            factor: "income",
            weight: weights.income,
            outcome: preferences
                .income
                .map(|band| candidate.income.is_some_and(|income| income.overlaps(&band))),
        },
    ];

    let mut earned = 0.0;
    let mut applicable = 0.0;
    let mut matched_factors = Vec::new();

    for check in checks.iter() {
        let Some(satisfied) = check.outcome else {
            continue;
        };
        applicable += check.weight;
        if satisfied {
            earned += check.weight;
            matched_factors.push(check.factor.to_string());
        }
    }

    let score = if applicable > 0.0 {
        (earned / applicable * 100.0).round().clamp(0.0, 100.0) as u8
    } else {
        0
    };

    Compatibility {
        score,
        matched_factors,
    }
}

#[inline]
fn exact_or_any(wanted: &[String], value: Option<&str>) -> bool {
    match filter_values(wanted) {
        None => true,
        Some(set) => contains_ci(&set, value),
    }
}

/// Caste only counts when the seeker asked for it and has one on file
#[inline]
fn caste_check(seeker: &Profile, candidate: &Profile, preferences: &PreferenceCriteria) -> Option<bool> {
    if preferences.any_caste {
        return None;
    }
    let own = seeker.caste.as_deref().filter(|c| !is_any(c))?;
    Some(
        candidate
            .caste
            .as_deref()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case(own.trim())),
    )
}
