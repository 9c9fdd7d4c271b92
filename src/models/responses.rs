use serde::{Deserialize, Serialize};

use crate::models::domain::ScoredCandidate;

/// Response for all match discovery endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub matches: Vec<ScoredCandidate>,
    pub pagination: Pagination,
    pub match_info: MatchInfo,
    pub session_seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

impl MatchResponse {
    /// Empty page carrying a notice instead of matches
    pub fn with_notice(page: u32, limit: u32, notice: Notice) -> Self {
        Self {
            matches: Vec::new(),
            pagination: Pagination::new(0, page, limit),
            match_info: MatchInfo::default(),
            session_seed: None,
            notice: Some(notice),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub pages: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        let pages = total.div_ceil(limit as u64).min(u32::MAX as u64) as u32;
        Self {
            total,
            page,
            pages,
            limit,
        }
    }
}

/// How far the engine had to loosen the seeker's criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub match_level: u32,
    pub criteria_relaxed: bool,
    pub relaxed_criteria: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,
}

/// Explicit product message attached to an otherwise empty response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub kind: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
    #[serde(default)]
    pub retryable: bool,
}
