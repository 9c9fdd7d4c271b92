use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared gender of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// The gender a seeker is matched against. `Other` has no counterpart.
    pub fn opposite(self) -> Option<Gender> {
        match self {
            Gender::Male => Some(Gender::Female),
            Gender::Female => Some(Gender::Male),
            Gender::Other => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Gender {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Gender::Male,
            "female" | "f" => Gender::Female,
            _ => Gender::Other,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Premium => "premium",
        }
    }

    pub fn parse(value: &str) -> SubscriptionTier {
        match value.trim().to_ascii_lowercase().as_str() {
            "premium" | "gold" | "platinum" => SubscriptionTier::Premium,
            _ => SubscriptionTier::Free,
        }
    }
}

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(point: GeoPoint) -> Self {
        geo::Point::new(point.longitude, point.latitude)
    }
}

/// Annual income band in lakhs, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeBand {
    pub min: u32,
    pub max: u32,
}

impl IncomeBand {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Two bands overlap when `a.min <= b.max && b.min <= a.max`
    #[inline]
    pub fn overlaps(&self, other: &IncomeBand) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

/// Profile record as owned by the profile-management service.
///
/// The engine reads seekers and candidates through the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub height_cm: u16,
    #[serde(default)]
    pub religion: Option<String>,
    #[serde(default)]
    pub caste: Option<String>,
    #[serde(default)]
    pub mother_tongue: Option<String>,
    #[serde(default)]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub education: Option<String>,
    #[serde(default)]
    pub employment: Option<String>,
    #[serde(default)]
    pub income: Option<IncomeBand>,
    #[serde(default)]
    pub manglik: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub subscription: SubscriptionTier,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_complete: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool { true }

impl Profile {
    /// Age in whole years on the given date
    pub fn age_on(&self, today: NaiveDate) -> u8 {
        age_on(self.birth_date, today)
    }

    pub fn is_premium(&self) -> bool {
        self.subscription == SubscriptionTier::Premium
    }

    /// Whether the profile may be surfaced to anyone at all
    pub fn is_visible(&self) -> bool {
        self.is_active && self.is_complete && !self.is_deleted
    }
}

/// Whole years elapsed between `birth_date` and `today`
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> u8 {
    let mut years = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    years.clamp(0, u8::MAX as i32) as u8
}

/// Partner preferences of a seeker
///
/// Empty lists, blank strings and the literal `Any` mean "do not filter
/// this dimension".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceCriteria {
    pub seeker_id: String,
    #[serde(default)]
    pub min_age: Option<u8>,
    #[serde(default)]
    pub max_age: Option<u8>,
    #[serde(default)]
    pub min_height_cm: Option<u16>,
    #[serde(default)]
    pub max_height_cm: Option<u16>,
    #[serde(default)]
    pub marital_status: Vec<String>,
    #[serde(default)]
    pub religion: Vec<String>,
    #[serde(default = "default_true")]
    pub any_caste: bool,
    #[serde(default)]
    pub mother_tongue: Vec<String>,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub employment: Vec<String>,
    #[serde(default)]
    pub income: Option<IncomeBand>,
    #[serde(default)]
    pub manglik: Option<String>,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub radius_km: Option<f64>,
}

impl PreferenceCriteria {
    /// A record that filters nothing, used by modes that tolerate a seeker
    /// without saved preferences.
    pub fn open(seeker_id: impl Into<String>) -> Self {
        Self {
            seeker_id: seeker_id.into(),
            any_caste: true,
            ..Default::default()
        }
    }

    /// Inclusive age range, normalised so that min <= max
    pub fn age_range(&self) -> Option<(u8, u8)> {
        normalise_range(self.min_age, self.max_age, 18, 99)
    }

    /// Inclusive height range in cm, normalised so that min <= max
    pub fn height_range(&self) -> Option<(u16, u16)> {
        normalise_range(self.min_height_cm, self.max_height_cm, 0, 300)
    }

    pub fn manglik_filter(&self) -> Option<&str> {
        self.manglik
            .as_deref()
            .filter(|value| !is_any(value))
            .map(str::trim)
    }
}

fn normalise_range<T: Copy + Ord>(
    min: Option<T>,
    max: Option<T>,
    floor: T,
    ceiling: T,
) -> Option<(T, T)> {
    match (min, max) {
        (None, None) => None,
        (Some(lo), None) => Some((lo, ceiling.max(lo))),
        (None, Some(hi)) => Some((floor.min(hi), hi)),
        (Some(a), Some(b)) => Some((a.min(b), a.max(b))),
    }
}

/// True for blank values and the `Any` sentinel
pub fn is_any(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("any")
        || trimmed.eq_ignore_ascii_case("doesn't matter")
}

/// Normalise a multi-select preference into a filter set.
///
/// Returns `None` when the dimension should not be filtered at all.
pub fn filter_values(values: &[String]) -> Option<Vec<String>> {
    if values.iter().any(|v| !v.trim().is_empty() && is_any(v)) {
        return None;
    }

    let mut set: Vec<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect();
    set.sort();
    set.dedup();

    if set.is_empty() {
        None
    } else {
        Some(set)
    }
}

/// Case-insensitive membership check against a filter set
#[inline]
pub fn contains_ci(set: &[String], value: Option<&str>) -> bool {
    match value {
        Some(value) => set.iter().any(|s| s.eq_ignore_ascii_case(value.trim())),
        None => false,
    }
}

/// Where a candidate in a response came from.
///
/// Declaration order is the merge priority: earlier variants claim a
/// candidate first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcingStrategy {
    Premium,
    New,
    Exact,
    Nearby,
    Recommended,
    Fill,
}

impl SourcingStrategy {
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourcingStrategy::Premium => "premium",
            SourcingStrategy::New => "new",
            SourcingStrategy::Exact => "exact",
            SourcingStrategy::Nearby => "nearby",
            SourcingStrategy::Recommended => "recommended",
            SourcingStrategy::Fill => "fill",
        }
    }
}

/// Discovery mode requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Best,
    Today,
    New,
    Nearby,
    Discovery,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Best => "best",
            MatchMode::Today => "today",
            MatchMode::New => "new",
            MatchMode::Nearby => "nearby",
            MatchMode::Discovery => "discovery",
        }
    }

    pub fn parse(value: &str) -> Option<MatchMode> {
        match value.trim().to_ascii_lowercase().as_str() {
            "best" | "my-matches" | "mymatches" => Some(MatchMode::Best),
            "today" => Some(MatchMode::Today),
            "new" => Some(MatchMode::New),
            "nearby" => Some(MatchMode::Nearby),
            "discovery" | "explore" => Some(MatchMode::Discovery),
            _ => None,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate as returned to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub id: String,
    pub display_name: String,
    pub gender: Gender,
    pub age: u8,
    pub height_cm: u16,
    pub religion: Option<String>,
    pub caste: Option<String>,
    pub mother_tongue: Option<String>,
    pub marital_status: Option<String>,
    pub education: Option<String>,
    pub employment: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub photo_url: Option<String>,
    pub is_premium: bool,
    pub score: u8,
    pub matched_factors: Vec<String>,
    pub tier: SourcingStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_text: Option<String>,
}

/// Compatibility weights, expressed as points out of 100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub age: f64,
    pub height: f64,
    pub religion: f64,
    pub caste: f64,
    pub mother_tongue: f64,
    pub marital_status: f64,
    pub education: f64,
    pub employment: f64,
    pub manglik: f64,
    pub income: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            age: 20.0,
            height: 10.0,
            religion: 15.0,
            caste: 10.0,
            mother_tongue: 10.0,
            marital_status: 10.0,
            education: 5.0,
            employment: 5.0,
            manglik: 5.0,
            income: 10.0,
        }
    }
}
