use chrono::FixedOffset;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::geo::GeoExpansionPolicy;
use crate::core::matcher::EngineSettings;
use crate::models::ScoringWeights;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    /// Redis L2; the preference cache runs L1-only without it
    pub redis_url: Option<String>,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    pub max_limit: u32,
    pub query_timeout_ms: u64,
    pub request_deadline_ms: u64,
    pub default_radius_km: f64,
    pub radius_growth_factor: f64,
    pub max_radius_expansions: u32,
    pub new_joiner_days: u32,
    /// Seekers' locale offset from UTC, in minutes
    pub utc_offset_minutes: i32,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            max_limit: 100,
            query_timeout_ms: 2_000,
            request_deadline_ms: 5_000,
            default_radius_km: 50.0,
            radius_growth_factor: 2.0,
            max_radius_expansions: 3,
            new_joiner_days: 7,
            utc_offset_minutes: 330,
        }
    }
}

impl MatchingSettings {
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let utc_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Message(format!("matching.utc_offset_minutes out of range: {}", self.utc_offset_minutes))
        })?;
        if !(self.default_radius_km > 0.0) {
            return Err(ConfigError::Message(
                "matching.default_radius_km must be positive".to_string(),
            ));
        }
        if self.radius_growth_factor <= 1.0 {
            return Err(ConfigError::Message(
                "matching.radius_growth_factor must be greater than 1".to_string(),
            ));
        }

        Ok(EngineSettings {
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            request_deadline: Duration::from_millis(self.request_deadline_ms),
            default_radius_km: self.default_radius_km,
            geo: GeoExpansionPolicy {
                growth_factor: self.radius_growth_factor,
                max_expansions: self.max_radius_expansions,
            },
            new_joiner_days: self.new_joiner_days,
            utc_offset,
            max_limit: self.max_limit,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: ScoringWeights,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

fn environment() -> Environment {
    // e.g., VIVAH__SERVER__PORT -> server.port
    Environment::with_prefix("VIVAH")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. config/default.toml
    /// 2. config/local.toml (development overrides)
    /// 3. Environment variables prefixed with VIVAH__
    /// 4. DATABASE_URL
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        with_database_override(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        settings.try_deserialize()
    }
}

/// DATABASE_URL wins over every file and VIVAH__ value
fn with_database_override(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}
