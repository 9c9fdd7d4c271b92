//! Relaxation ladder: progressively widens a strict predicate until enough
//! candidates exist.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::{with_timeout, MatchError};
use crate::core::predicate::{NumericRange, Predicate};
use crate::services::ProfileStore;

/// One named, cumulative widening of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelaxationStep {
    DropEducation,
    DropEmployment,
    DropMotherTongue,
    WidenHeight(u16),
    WidenAge(u8),
    DropCaste,
    DropManglik,
    DropIncome,
    DropState,
    DropMaritalStatus,
    DropReligion,
    DropHeight,
    DropAge,
    JoinedWithin(u32),
}

impl RelaxationStep {
    /// Stable machine name reported to clients
    pub fn name(&self) -> String {
        match self {
            RelaxationStep::DropEducation => "drop_education".to_string(),
            RelaxationStep::DropEmployment => "drop_employment".to_string(),
            RelaxationStep::DropMotherTongue => "drop_mother_tongue".to_string(),
            RelaxationStep::WidenHeight(cm) => format!("widen_height_{}", cm),
            RelaxationStep::WidenAge(years) => format!("widen_age_{}", years),
            RelaxationStep::DropCaste => "drop_caste".to_string(),
            RelaxationStep::DropManglik => "drop_manglik".to_string(),
            RelaxationStep::DropIncome => "drop_income".to_string(),
            RelaxationStep::DropState => "drop_state".to_string(),
            RelaxationStep::DropMaritalStatus => "drop_marital_status".to_string(),
            RelaxationStep::DropReligion => "drop_religion".to_string(),
            RelaxationStep::DropHeight => "drop_height".to_string(),
            RelaxationStep::DropAge => "drop_age".to_string(),
            RelaxationStep::JoinedWithin(days) => format!("joined_within_{}_days", days),
        }
    }
}

/// Apply one step to a predicate, returning the widened copy.
///
/// Applying a step that is already recorded on the predicate is a no-op.
pub fn apply_step(predicate: &Predicate, step: RelaxationStep) -> Predicate {
    if predicate.applied.contains(&step) {
        return predicate.clone();
    }

    let mut next = predicate.clone();
    match step {
        RelaxationStep::DropEducation => next.education = None,
        RelaxationStep::DropEmployment => next.employment = None,
        RelaxationStep::DropMotherTongue => next.mother_tongue = None,
        RelaxationStep::WidenHeight(cm) => {
            next.height_cm = next
                .height_cm
                .map(|r| NumericRange::new(r.min.saturating_sub(cm), r.max.saturating_add(cm)));
        }
        RelaxationStep::WidenAge(years) => {
            next.age = next.age.map(|r| {
                // Never widen below the legal minimum the seeker started from
                let floor = r.min.min(18);
                NumericRange::new(r.min.saturating_sub(years).max(floor), r.max.saturating_add(years))
            });
        }
        RelaxationStep::DropCaste => next.caste = None,
        RelaxationStep::DropManglik => next.manglik = None,
        RelaxationStep::DropIncome => next.income = None,
        RelaxationStep::DropState => next.states = None,
        RelaxationStep::DropMaritalStatus => next.marital_status = None,
        RelaxationStep::DropReligion => next.religion = None,
        RelaxationStep::DropHeight => next.height_cm = None,
        RelaxationStep::DropAge => next.age = None,
        RelaxationStep::JoinedWithin(days) => {
            // Only ever widens an existing window
            next.joined_within_days = next.joined_within_days.map(|current| current.max(days));
        }
    }
    next.applied.push(step);
    next
}

/// Whether `after` constrains anything less than `before`
fn widens(before: &Predicate, after: &Predicate) -> bool {
    let mut widened = after.clone();
    widened.applied.clone_from(&before.applied);
    widened != *before
}

/// Outcome of walking a ladder
#[derive(Debug, Clone)]
pub struct Relaxation {
    pub predicate: Predicate,
    /// Number of effective steps; 0 means the strict predicate sufficed
    pub level: u32,
    /// Steps that actually widened the predicate
    pub applied: Vec<RelaxationStep>,
    /// Candidate count for `predicate`
    pub count: u64,
}

impl Relaxation {
    pub fn was_relaxed(&self) -> bool {
        !self.applied.is_empty()
    }

    pub fn step_names(&self) -> Vec<String> {
        self.applied.iter().map(RelaxationStep::name).collect()
    }
}

/// Walk `ladder` from `strict` until the count reaches `target`.
///
/// Counts are issued sequentially since each decision depends on the
/// previous one. When the ladder is exhausted the most relaxed predicate is
/// used regardless of its count.
pub async fn relax(
    store: &dyn ProfileStore,
    strict: Predicate,
    ladder: &[RelaxationStep],
    target: u64,
    timeout: Duration,
) -> Result<Relaxation, MatchError> {
    let mut predicate = strict;
    let mut count = with_timeout(timeout, store.count(&predicate)).await?;
    let mut applied = Vec::new();

    tracing::debug!("Relaxation level 0: {} candidates (target {})", count, target);

    for step in ladder {
        if count >= target {
            break;
        }

        let next = apply_step(&predicate, *step);
        if !widens(&predicate, &next) {
            // Nothing to drop for this seeker; the count cannot change
            predicate = next;
            continue;
        }

        predicate = next;
        applied.push(*step);
        count = with_timeout(timeout, store.count(&predicate)).await?;

        tracing::debug!(
            "Relaxation level {} ({}): {} candidates",
            applied.len(),
            step.name(),
            count
        );
    }

    Ok(Relaxation {
        predicate,
        level: applied.len() as u32,
        applied,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::predicate::ConstraintBuilder;
    use crate::core::modes::ModeProfile;
    use crate::models::{Gender, MatchMode, PreferenceCriteria, Profile};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::BTreeSet;

    fn seeker() -> Profile {
        Profile {
            id: "seeker".to_string(),
            display_name: "Seeker".to_string(),
            gender: Gender::Female,
            birth_date: NaiveDate::from_ymd_opt(1996, 3, 2).unwrap(),
            height_cm: 160,
            religion: Some("Hindu".to_string()),
            caste: Some("Agarwal".to_string()),
            mother_tongue: Some("Hindi".to_string()),
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
        }
    }

    fn strict_predicate() -> Predicate {
        let seeker = seeker();
        let prefs = PreferenceCriteria {
            seeker_id: "seeker".to_string(),
            min_age: Some(28),
            max_age: Some(34),
            min_height_cm: Some(150),
            max_height_cm: Some(170),
            religion: vec!["Hindu".to_string()],
            any_caste: false,
            mother_tongue: vec!["Hindi".to_string()],
            education: vec!["MBA".to_string()],
            employment: vec!["Private".to_string()],
            manglik: Some("No".to_string()),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        ConstraintBuilder::new(&seeker, &prefs, BTreeSet::new(), now, now.date_naive())
            .unwrap()
            .strict()
    }

    #[test]
    fn test_widen_height_by_five() {
        let strict = strict_predicate();
        let widened = apply_step(&strict, RelaxationStep::WidenHeight(5));
        let height = widened.height_cm.unwrap();
        assert_eq!((height.min, height.max), (145, 175));
    }

    #[test]
    fn test_apply_step_is_idempotent() {
        let strict = strict_predicate();
        let once = apply_step(&strict, RelaxationStep::WidenAge(3));
        let twice = apply_step(&once, RelaxationStep::WidenAge(3));
        assert_eq!(once, twice);

        let dropped = apply_step(&strict, RelaxationStep::DropCaste);
        assert_eq!(apply_step(&dropped, RelaxationStep::DropCaste), dropped);
    }

    #[test]
    fn test_ladders_widen_monotonically() {
        for mode in [MatchMode::Best, MatchMode::Today, MatchMode::Discovery] {
            let mut predicate = strict_predicate();
            for step in ModeProfile::for_mode(mode).ladder {
                let next = apply_step(&predicate, *step);
                let before: BTreeSet<_> = predicate.constraint_names().into_iter().collect();
                let after: BTreeSet<_> = next.constraint_names().into_iter().collect();
                assert!(after.is_subset(&before), "{:?} re-introduced a constraint", step);

                if let (Some(a), Some(b)) = (predicate.height_cm, next.height_cm) {
                    assert!(b.min <= a.min && b.max >= a.max);
                }
                if let (Some(a), Some(b)) = (predicate.age, next.age) {
                    assert!(b.min <= a.min && b.max >= a.max);
                }
                predicate = next;
            }
        }
    }

    #[test]
    fn test_ladders_end_at_floor() {
        for mode in [MatchMode::Best, MatchMode::Today, MatchMode::Discovery] {
            let mut predicate = strict_predicate();
            for step in ModeProfile::for_mode(mode).ladder {
                predicate = apply_step(&predicate, *step);
            }
            assert!(
                predicate.constraint_names().is_empty(),
                "{} ladder stops at {:?}",
                mode,
                predicate.constraint_names()
            );
            assert_eq!(predicate.gender, Gender::Male);
        }
    }

    #[test]
    fn test_join_window_only_widens() {
        let strict = strict_predicate().with_joined_within(15);
        let widened = apply_step(&strict, RelaxationStep::JoinedWithin(30));
        assert_eq!(widened.joined_within_days, Some(30));

        let no_window = apply_step(&strict_predicate(), RelaxationStep::JoinedWithin(30));
        assert_eq!(no_window.joined_within_days, None);
    }

    #[tokio::test]
    async fn test_relax_skips_steps_with_nothing_to_drop() {
        let store = crate::services::MemoryStore::new();
        let ladder = ModeProfile::for_mode(MatchMode::Best).ladder;
        let result = relax(&store, strict_predicate(), ladder, 1, Duration::from_secs(1))
            .await
            .unwrap();

        // No income, state or marital-status preference to drop
        assert_eq!(result.level, 10);
        assert!(!result.step_names().contains(&"drop_income".to_string()));
        assert!(result.predicate.constraint_names().is_empty());
        assert_eq!(result.count, 0);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(RelaxationStep::WidenHeight(5).name(), "widen_height_5");
        assert_eq!(RelaxationStep::JoinedWithin(30).name(), "joined_within_30_days");
    }
}
