//! Vivah Match - match discovery engine for the Vivah matrimonial platform
//!
//! Turns a seeker's partner preferences into ranked, paginated candidate
//! lists across five discovery modes, relaxing criteria when the strict
//! pool is too small.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{EngineSettings, MatchEngine, MatchError};
pub use models::{MatchMode, MatchRequest, MatchResponse, PreferenceCriteria, Profile, ScoredCandidate, ScoringWeights};
