use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vivah_match::config::{LoggingSettings, Settings};
use vivah_match::core::MatchEngine;
use vivah_match::routes::{self, matches::{AppState, JwtAuth}};
use vivah_match::services::{CacheManager, CachedPreferenceStore, PostgresStore, SystemClock};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
    pub retryable: bool,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
        retryable: false,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("Query payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
        retryable: false,
    }
    .into()
}

/// LOG_LEVEL / LOG_FORMAT override the configured values; RUST_LOG wins over both
fn init_tracing(logging: &LoggingSettings) {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    init_tracing(&settings.logging);
    info!("Starting Vivah match discovery service...");

    let engine_settings = settings
        .matching
        .engine_settings()
        .map_err(|e| startup_error("Invalid matching configuration", e))?;

    let db_max_conn = settings.database.max_connections.unwrap_or(10);
    let db_min_conn = settings.database.min_connections.unwrap_or(1);
    let acquire_timeout = Duration::from_secs(settings.database.acquire_timeout_secs.unwrap_or(5));

    let postgres = PostgresStore::new(&settings.database.url, db_max_conn, db_min_conn, acquire_timeout)
        .await
        .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?;

    info!("PostgreSQL store initialized (max: {} connections)", db_max_conn);

    // Redis is optional; the preference cache degrades to L1-only
    let cache_ttl = settings.cache.ttl_secs.unwrap_or(300);
    let l1_cache_size = settings.cache.l1_cache_size.unwrap_or(10_000);
    let cache = match CacheManager::new(settings.cache.redis_url.as_deref(), l1_cache_size, cache_ttl).await {
        Ok(cache) => {
            info!(
                "Cache manager initialized (L1: {} entries, TTL: {}s, L2: {})",
                l1_cache_size,
                cache_ttl,
                cache.has_l2()
            );
            cache
        }
        Err(e) => {
            warn!("Failed to connect to Redis ({}), running with L1 cache only", e);
            CacheManager::in_memory(l1_cache_size, cache_ttl)
        }
    };

    let store = Arc::new(postgres.clone());
    let preferences = Arc::new(CachedPreferenceStore::new(store.clone(), Arc::new(cache)));

    let engine = MatchEngine::new(store.clone(), preferences, store.clone(), Arc::new(SystemClock))
        .with_audit(store)
        .with_weights(settings.scoring.weights)
        .with_settings(engine_settings);

    info!("Match engine initialized with weights: {:?}", settings.scoring.weights);

    let app_state = AppState {
        engine,
        auth: Arc::new(JwtAuth::new(&settings.auth.jwt_secret)),
        database: Some(postgres),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
