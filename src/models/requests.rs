use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::MatchMode;

/// Request to find matches (POST body)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FindMatchesRequest {
    pub mode: MatchMode,
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u32,
    #[serde(default, alias = "session_seed", rename = "sessionSeed")]
    pub session_seed: Option<String>,
    #[serde(default, alias = "radius_km", rename = "radiusKm")]
    #[validate(range(exclusive_min = 0.0, max = 2000.0))]
    pub radius_km: Option<f64>,
}

/// Query string for `GET /matches/{mode}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct MatchQuery {
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u32,
    #[serde(default, alias = "session_seed", rename = "sessionSeed")]
    pub session_seed: Option<String>,
    #[serde(default, alias = "radius_km", rename = "radiusKm")]
    #[validate(range(exclusive_min = 0.0, max = 2000.0))]
    pub radius_km: Option<f64>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

/// Engine-level request, with the seeker resolved from the auth context
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub seeker_id: String,
    pub mode: MatchMode,
    pub page: u32,
    pub limit: u32,
    pub session_seed: Option<String>,
    pub radius_km: Option<f64>,
}

impl MatchRequest {
    pub fn new(seeker_id: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            seeker_id: seeker_id.into(),
            mode,
            page: default_page(),
            limit: default_limit(),
            session_seed: None,
            radius_km: None,
        }
    }

    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = page.max(1);
        self.limit = limit.max(1);
        self
    }

    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.session_seed = Some(seed.into());
        self
    }

    pub fn with_radius(mut self, radius_km: f64) -> Self {
        self.radius_km = Some(radius_km);
        self
    }
}
