//! Constraint builder: turns a seeker and their preferences into an
//! immutable [`Predicate`] over the candidate pool.
//!
//! The structural constraints (not-self, not excluded, active, complete,
//! not deleted) are not predicate fields. They are enforced by every
//! evaluation of a predicate and therefore can never be relaxed away.

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::distance::{calculate_bounding_box, haversine_km, is_within_bounding_box};
use crate::core::error::MatchError;
use crate::core::relaxation::RelaxationStep;
use crate::models::domain::{contains_ci, filter_values, is_any};
use crate::models::{Gender, GeoPoint, IncomeBand, PreferenceCriteria, Profile};

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> NumericRange<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoNear {
    pub center: GeoPoint,
    pub radius_km: f64,
}

/// Structured filter over candidate profiles
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub seeker_id: String,
    pub excluded: Arc<BTreeSet<String>>,
    pub gender: Gender,
    /// Request instant, used for join-recency windows
    pub now: DateTime<Utc>,
    /// Calendar date in the seeker's locale, used for age conversion
    pub today: NaiveDate,
    pub age: Option<NumericRange<u8>>,
    pub height_cm: Option<NumericRange<u16>>,
    pub religion: Option<Vec<String>>,
    pub caste: Option<String>,
    pub mother_tongue: Option<Vec<String>>,
    pub marital_status: Option<Vec<String>>,
    pub education: Option<Vec<String>>,
    pub employment: Option<Vec<String>>,
    pub income: Option<IncomeBand>,
    pub manglik: Option<String>,
    pub states: Option<Vec<String>>,
    pub near: Option<GeoNear>,
    pub joined_within_days: Option<u32>,
    pub premium_only: bool,
    /// Relaxation steps already applied, in order
    pub applied: Vec<RelaxationStep>,
}

impl Predicate {
    /// Inclusive birth-date bounds `(earliest, latest)` equivalent to the age range.
    ///
    /// A person is `n` years old on `today` when born in
    /// `(today - (n+1) years, today - n years]`.
    pub fn birth_date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.age.map(|age| birth_date_bounds(age, self.today))
    }

    pub fn joined_since(&self) -> Option<DateTime<Utc>> {
        self.joined_within_days
            .map(|days| self.now - chrono::Duration::days(days as i64))
    }

    /// Names of the dimensions this predicate constrains beyond the floor
    pub fn constraint_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.age.is_some() {
            names.push("age");
        }
        if self.height_cm.is_some() {
            names.push("height");
        }
        if self.religion.is_some() {
            names.push("religion");
        }
        if self.caste.is_some() {
            names.push("caste");
        }
        if self.mother_tongue.is_some() {
            names.push("motherTongue");
        }
        if self.marital_status.is_some() {
            names.push("maritalStatus");
        }
        if self.education.is_some() {
            names.push("education");
        }
        if self.employment.is_some() {
            names.push("employment");
        }
        if self.income.is_some() {
            names.push("income");
        }
        if self.manglik.is_some() {
            names.push("manglik");
        }
        if self.states.is_some() {
            names.push("state");
        }
        if self.near.is_some() {
            names.push("near");
        }
        if self.joined_within_days.is_some() {
            names.push("joined");
        }
        if self.premium_only {
            names.push("premium");
        }
        names
    }

    /// Floor check shared by every predicate
    #[inline]
    pub fn passes_floor(&self, profile: &Profile) -> bool {
        profile.is_visible()
            && profile.id != self.seeker_id
            && !self.excluded.contains(&profile.id)
            && profile.gender == self.gender
    }

    /// Evaluate the predicate against a single profile
    pub fn matches(&self, profile: &Profile) -> bool {
        if !self.passes_floor(profile) {
            return false;
        }

        if let Some((earliest, latest)) = self.birth_date_bounds() {
            if profile.birth_date < earliest || profile.birth_date > latest {
                return false;
            }
        }

        if let Some(height) = self.height_cm {
            if !height.contains(profile.height_cm) {
                return false;
            }
        }

        let sets = [
            (&self.religion, profile.religion.as_deref()),
            (&self.mother_tongue, profile.mother_tongue.as_deref()),
            (&self.marital_status, profile.marital_status.as_deref()),
            (&self.education, profile.education.as_deref()),
            (&self.employment, profile.employment.as_deref()),
            (&self.states, profile.state.as_deref()),
        ];
        for (filter, value) in sets {
            if let Some(set) = filter {
                if !contains_ci(set, value) {
                    return false;
                }
            }
        }

        if let Some(caste) = &self.caste {
            match profile.caste.as_deref() {
                Some(value) if value.trim().eq_ignore_ascii_case(caste) => {}
                _ => return false,
            }
        }

        if let Some(manglik) = &self.manglik {
            match profile.manglik.as_deref() {
                Some(value) if value.trim().eq_ignore_ascii_case(manglik) => {}
                _ => return false,
            }
        }

        if let Some(band) = &self.income {
            match &profile.income {
                Some(income) if income.overlaps(band) => {}
                _ => return false,
            }
        }

        if let Some(near) = &self.near {
            let bbox = calculate_bounding_box(near.center, near.radius_km);
            match profile.location {
                Some(point)
                    if is_within_bounding_box(point, &bbox)
                        && haversine_km(near.center, point) <= near.radius_km => {}
                _ => return false,
            }
        }

        if let Some(since) = self.joined_since() {
            if profile.created_at < since {
                return false;
            }
        }

        if self.premium_only && !profile.is_premium() {
            return false;
        }

        true
    }

    pub fn with_near(mut self, center: GeoPoint, radius_km: f64) -> Self {
        self.near = Some(GeoNear { center, radius_km });
        self
    }

    pub fn with_joined_within(mut self, days: u32) -> Self {
        self.joined_within_days = Some(days);
        self
    }

    pub fn premium(mut self) -> Self {
        self.premium_only = true;
        self
    }
}

fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

/// Convert an inclusive age range to inclusive birth-date bounds on `today`
pub fn birth_date_bounds(age: NumericRange<u8>, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let latest = years_before(today, age.min as u32);
    let earliest = years_before(today, age.max as u32 + 1)
        .checked_add_days(Days::new(1))
        .unwrap_or(NaiveDate::MIN);
    (earliest, latest)
}

/// Builds predicates for one seeker at one point in time
#[derive(Debug, Clone)]
pub struct ConstraintBuilder<'a> {
    seeker: &'a Profile,
    prefs: &'a PreferenceCriteria,
    excluded: Arc<BTreeSet<String>>,
    target_gender: Gender,
    now: DateTime<Utc>,
    today: NaiveDate,
}

impl<'a> ConstraintBuilder<'a> {
    pub fn new(
        seeker: &'a Profile,
        prefs: &'a PreferenceCriteria,
        excluded: BTreeSet<String>,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<Self, MatchError> {
        let target_gender = seeker
            .gender
            .opposite()
            .ok_or(MatchError::UnsupportedGender(seeker.gender))?;

        Ok(Self {
            seeker,
            prefs,
            excluded: Arc::new(excluded),
            target_gender,
            now,
            today,
        })
    }

    /// The floor: opposite gender plus the structural constraints
    pub fn minimal(&self) -> Predicate {
        Predicate {
            seeker_id: self.seeker.id.clone(),
            excluded: Arc::clone(&self.excluded),
            gender: self.target_gender,
            now: self.now,
            today: self.today,
            age: None,
            height_cm: None,
            religion: None,
            caste: None,
            mother_tongue: None,
            marital_status: None,
            education: None,
            employment: None,
            income: None,
            manglik: None,
            states: None,
            near: None,
            joined_within_days: None,
            premium_only: false,
            applied: Vec::new(),
        }
    }

    /// Age, religion and marital status only
    pub fn core(&self) -> Predicate {
        Predicate {
            age: self.prefs.age_range().map(|(lo, hi)| NumericRange::new(lo, hi)),
            religion: filter_values(&self.prefs.religion),
            marital_status: filter_values(&self.prefs.marital_status),
            ..self.minimal()
        }
    }

    /// Every preference the seeker saved
    pub fn strict(&self) -> Predicate {
        let caste = if self.prefs.any_caste {
            None
        } else {
            self.seeker
                .caste
                .as_deref()
                .filter(|c| !is_any(c))
                .map(|c| c.trim().to_string())
        };

        Predicate {
            height_cm: self
                .prefs
                .height_range()
                .map(|(lo, hi)| NumericRange::new(lo, hi)),
            caste,
            mother_tongue: filter_values(&self.prefs.mother_tongue),
            education: filter_values(&self.prefs.education),
            employment: filter_values(&self.prefs.employment),
            income: self.prefs.income,
            manglik: self.prefs.manglik_filter().map(str::to_string),
            states: filter_values(&self.prefs.states),
            ..self.core()
        }
    }
}
