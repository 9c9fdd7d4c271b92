use std::time::Duration;
use thiserror::Error;

use crate::models::Gender;
use crate::services::StoreError;

/// Errors surfaced by the match discovery pipeline
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("seeker {0} has not saved partner preferences")]
    MissingPreferences(String),

    #[error("seeker {0} has no location on file")]
    MissingLocation(String),

    #[error("malformed session seed: {0}")]
    InvalidSeed(String),

    #[error("data layer did not answer within {0:?}")]
    DataLayerTimeout(Duration),

    #[error("data layer unavailable: {0}")]
    DataLayerUnavailable(String),

    #[error("seeker profile not found: {0}")]
    SeekerNotFound(String),

    #[error("no opposite-gender pool is defined for gender '{0}'")]
    UnsupportedGender(Gender),
}

impl MatchError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::MissingPreferences(_) => "missing_preferences",
            MatchError::MissingLocation(_) => "missing_location",
            MatchError::InvalidSeed(_) => "invalid_seed",
            MatchError::DataLayerTimeout(_) => "data_layer_timeout",
            MatchError::DataLayerUnavailable(_) => "data_layer_unavailable",
            MatchError::SeekerNotFound(_) => "seeker_not_found",
            MatchError::UnsupportedGender(_) => "unsupported_gender",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::DataLayerTimeout(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            MatchError::MissingPreferences(_) => 409,
            MatchError::MissingLocation(_) => 422,
            MatchError::InvalidSeed(_) => 400,
            MatchError::DataLayerTimeout(_) => 503,
            MatchError::DataLayerUnavailable(_) => 500,
            MatchError::SeekerNotFound(_) => 404,
            MatchError::UnsupportedGender(_) => 422,
        }
    }
}

impl From<StoreError> for MatchError {
    fn from(err: StoreError) -> Self {
        MatchError::DataLayerUnavailable(err.to_string())
    }
}

/// Run a store call under a deadline, mapping elapsed time to a retryable error
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, MatchError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(MatchError::from),
        Err(_) => Err(MatchError::DataLayerTimeout(timeout)),
    }
}
