use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

use crate::core::{MatchEngine, MatchError};
use crate::models::{
    ErrorResponse, FindMatchesRequest, HealthResponse, MatchMode, MatchQuery, MatchRequest, MatchResponse, Notice,
};
use crate::services::PostgresStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: MatchEngine,
    pub auth: Arc<JwtAuth>,
    /// Reported by the health endpoint when present
    pub database: Option<PostgresStore>,
}

/// Errors rendered by the HTTP layer
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("unknown match mode '{0}'")]
    UnknownMode(String),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Validation(_) => "validation_failed",
            ApiError::UnknownMode(_) => "unknown_mode",
            ApiError::Match(e) => e.kind(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) | ApiError::UnknownMode(_) => StatusCode::BAD_REQUEST,
            ApiError::Match(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let retryable = matches!(self, ApiError::Match(e) if e.is_retryable());

        HttpResponse::build(status).json(ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
            retryable,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// HS256 bearer-token verifier
pub struct JwtAuth {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Seeker id carried in the token's `sub` claim
    pub fn seeker_id(&self, token: &str) -> Result<String, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| ApiError::Unauthorized(format!("invalid bearer token: {}", e)))?;
        if data.claims.sub.trim().is_empty() {
            return Err(ApiError::Unauthorized("token has an empty subject".to_string()));
        }
        Ok(data.claims.sub)
    }
}

/// Seeker identity resolved from the `Authorization` header
#[derive(Debug, Clone)]
pub struct AuthenticatedSeeker(pub String);

impl FromRequest for AuthenticatedSeeker {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedSeeker, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Unauthorized("authentication is not configured".to_string()))?;

    let token = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    state.auth.seeker_id(token.trim()).map(AuthenticatedSeeker)
}

/// Mounted under `/matches`; `/find` must register before the `{mode}` catch-all
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/find", web::post().to(find_matches))
        .route("/{mode}", web::get().to(get_matches));
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let healthy = match &state.database {
        Some(database) => database.health_check().await.unwrap_or(false),
        None => true,
    };
    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// GET /api/v1/matches/{mode}?page&limit&sessionSeed&radiusKm
async fn get_matches(
    state: web::Data<AppState>,
    mode: web::Path<String>,
    query: web::Query<MatchQuery>,
    seeker: AuthenticatedSeeker,
) -> Result<HttpResponse, ApiError> {
    let mode = MatchMode::parse(&mode).ok_or_else(|| ApiError::UnknownMode(mode.into_inner()))?;
    query.validate().map_err(|e| ApiError::Validation(e.to_string()))?;

    let query = query.into_inner();
    let request = MatchRequest {
        seeker_id: seeker.0,
        mode,
        page: query.page,
        limit: query.limit,
        session_seed: query.session_seed,
        radius_km: query.radius_km,
    };
    discover(&state, request).await
}

/// POST /api/v1/matches/find
///
/// Request body:
/// ```json
/// { "mode": "best", "page": 1, "limit": 20, "sessionSeed": "abc123xyz", "radiusKm": 50 }
/// ```
async fn find_matches(
    state: web::Data<AppState>,
    body: web::Json<FindMatchesRequest>,
    seeker: AuthenticatedSeeker,
) -> Result<HttpResponse, ApiError> {
    if let Err(errors) = body.validate() {
        tracing::info!("Validation failed for find_matches request: {:?}", errors);
        return Err(ApiError::Validation(errors.to_string()));
    }

    let body = body.into_inner();
    let request = MatchRequest {
        seeker_id: seeker.0,
        mode: body.mode,
        page: body.page,
        limit: body.limit,
        session_seed: body.session_seed,
        radius_km: body.radius_km,
    };
    discover(&state, request).await
}

async fn discover(state: &AppState, request: MatchRequest) -> Result<HttpResponse, ApiError> {
    tracing::info!(
        "Finding {} matches for {} (page {}, limit {})",
        request.mode,
        request.seeker_id,
        request.page,
        request.limit
    );

    match state.engine.discover(&request).await {
        Ok(response) => {
            tracing::info!(
                "Returning {} matches for {} at level {}",
                response.matches.len(),
                request.seeker_id,
                response.match_info.match_level
            );
            Ok(HttpResponse::Ok().json(response))
        }
        Err(MatchError::MissingPreferences(seeker_id)) => {
            tracing::info!("Seeker {} has no saved preferences", seeker_id);
            Ok(HttpResponse::Ok().json(MatchResponse::with_notice(
                request.page,
                request.limit,
                Notice {
                    kind: "missing_preferences".to_string(),
                    message: "Save your partner preferences to see matches in this section".to_string(),
                },
            )))
        }
        Err(e) => {
            tracing::error!("Match discovery failed for {}: {}", request.seeker_id, e);
            Err(e.into())
        }
    }
}
