// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    age_on, Gender, GeoPoint, IncomeBand, MatchMode, PreferenceCriteria, Profile, ScoredCandidate,
    ScoringWeights, SourcingStrategy, SubscriptionTier,
};
pub use requests::{FindMatchesRequest, MatchQuery, MatchRequest};
pub use responses::{ErrorResponse, HealthResponse, MatchInfo, MatchResponse, Notice, Pagination};
