use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::core::distance::calculate_bounding_box;
use crate::core::predicate::Predicate;
use crate::models::{
    Gender, GeoPoint, IncomeBand, MatchMode, PreferenceCriteria, Profile, SubscriptionTier,
};
use crate::services::store::{
    CandidateQuery, ExclusionStore, PreferenceStore, ProfileStore, QueryOrder, ShownAudit, StoreError,
};

const PROFILE_COLUMNS: &str = "id, display_name, gender, birth_date, height_cm, religion, caste, \
    mother_tongue, marital_status, education, employment, income_min, income_max, manglik, state, \
    city, latitude, longitude, photo_url, subscription, is_active, is_complete, is_deleted, \
    last_active_at, created_at";

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: String,
    display_name: String,
    gender: String,
    birth_date: NaiveDate,
    height_cm: i16,
    religion: Option<String>,
    caste: Option<String>,
    mother_tongue: Option<String>,
    marital_status: Option<String>,
    education: Option<String>,
    employment: Option<String>,
    income_min: Option<i32>,
    income_max: Option<i32>,
    manglik: Option<String>,
    state: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    photo_url: Option<String>,
    subscription: String,
    is_active: bool,
    is_complete: bool,
    is_deleted: bool,
    last_active_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

fn income_band(min: Option<i32>, max: Option<i32>) -> Option<IncomeBand> {
    match (min, max) {
        (Some(min), Some(max)) => Some(IncomeBand::new(min.max(0) as u32, max.max(0) as u32)),
        (Some(min), None) => Some(IncomeBand::new(min.max(0) as u32, u32::MAX)),
        (None, Some(max)) => Some(IncomeBand::new(0, max.max(0) as u32)),
        (None, None) => None,
    }
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let height_cm = u16::try_from(row.height_cm)
            .map_err(|_| StoreError::InvalidRecord(format!("profile {} has height {}", row.id, row.height_cm)))?;
        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };

        Ok(Profile {
            display_name: row.display_name,
            gender: Gender::parse(&row.gender),
            birth_date: row.birth_date,
            height_cm,
            religion: row.religion,
            caste: row.caste,
            mother_tongue: row.mother_tongue,
            marital_status: row.marital_status,
            education: row.education,
            employment: row.employment,
            income: income_band(row.income_min, row.income_max),
            manglik: row.manglik,
            state: row.state,
            city: row.city,
            location,
            photo_url: row.photo_url,
            subscription: SubscriptionTier::parse(&row.subscription),
            is_active: row.is_active,
            is_complete: row.is_complete,
            is_deleted: row.is_deleted,
            last_active_at: row.last_active_at,
            created_at: row.created_at,
            id: row.id,
        })
    }
}

#[derive(Debug, FromRow)]
struct PreferenceRow {
    seeker_id: String,
    min_age: Option<i16>,
    max_age: Option<i16>,
    min_height_cm: Option<i16>,
    max_height_cm: Option<i16>,
    marital_status: Vec<String>,
    religion: Vec<String>,
    any_caste: bool,
    mother_tongue: Vec<String>,
    education: Vec<String>,
    employment: Vec<String>,
    income_min: Option<i32>,
    income_max: Option<i32>,
    manglik: Option<String>,
    states: Vec<String>,
    radius_km: Option<f64>,
}

impl From<PreferenceRow> for PreferenceCriteria {
    fn from(row: PreferenceRow) -> Self {
        let age = |v: Option<i16>| v.map(|a| a.clamp(0, u8::MAX as i16) as u8);
        let height = |v: Option<i16>| v.map(|h| h.max(0) as u16);

        PreferenceCriteria {
            seeker_id: row.seeker_id,
            min_age: age(row.min_age),
            max_age: age(row.max_age),
            min_height_cm: height(row.min_height_cm),
            max_height_cm: height(row.max_height_cm),
            marital_status: row.marital_status,
            religion: row.religion,
            any_caste: row.any_caste,
            mother_tongue: row.mother_tongue,
            education: row.education,
            employment: row.employment,
            income: income_band(row.income_min, row.income_max),
            manglik: row.manglik,
            states: row.states,
            radius_km: row.radius_km,
        }
    }
}

/// Push the great-circle distance in km between each row and `center`
fn push_distance(qb: &mut QueryBuilder<'_, Postgres>, center: GeoPoint) {
    qb.push("(6371.0 * 2 * asin(sqrt(power(sin(radians(latitude - ")
        .push_bind(center.latitude)
        .push(") / 2), 2) + cos(radians(")
        .push_bind(center.latitude)
        .push(")) * cos(radians(latitude)) * power(sin(radians(longitude - ")
        .push_bind(center.longitude)
        .push(") / 2), 2))))");
}

fn push_any(qb: &mut QueryBuilder<'_, Postgres>, column: &str, values: &Option<Vec<String>>) {
    if let Some(values) = values {
        let lowered: Vec<String> = values.iter().map(|v| v.to_lowercase()).collect();
        qb.push(format!(" AND lower(trim({})) = ANY(", column))
            .push_bind(lowered)
            .push(")");
    }
}

/// Translate a predicate into a WHERE clause. Mirrors [`Predicate::matches`].
fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    qb.push(" WHERE is_active AND is_complete AND NOT is_deleted AND id <> ")
        .push_bind(predicate.seeker_id.clone())
        .push(" AND gender = ")
        .push_bind(predicate.gender.as_str());

    if !predicate.excluded.is_empty() {
        let excluded: Vec<String> = predicate.excluded.iter().cloned().collect();
        qb.push(" AND NOT (id = ANY(").push_bind(excluded).push("))");
    }

    if let Some((earliest, latest)) = predicate.birth_date_bounds() {
        qb.push(" AND birth_date BETWEEN ")
            .push_bind(earliest)
            .push(" AND ")
            .push_bind(latest);
    }

    if let Some(height) = predicate.height_cm {
        qb.push(" AND height_cm BETWEEN ")
            .push_bind(height.min as i16)
            .push(" AND ")
            .push_bind(height.max as i16);
    }

    push_any(qb, "religion", &predicate.religion);
    push_any(qb, "mother_tongue", &predicate.mother_tongue);
    push_any(qb, "marital_status", &predicate.marital_status);
    push_any(qb, "education", &predicate.education);
    push_any(qb, "employment", &predicate.employment);
    push_any(qb, "state", &predicate.states);

    if let Some(caste) = &predicate.caste {
        qb.push(" AND lower(trim(caste)) = ").push_bind(caste.to_lowercase());
    }

    if let Some(manglik) = &predicate.manglik {
        qb.push(" AND lower(trim(manglik)) = ").push_bind(manglik.to_lowercase());
    }

    if let Some(band) = predicate.income {
        qb.push(" AND (income_min IS NOT NULL OR income_max IS NOT NULL) AND COALESCE(income_min, 0) <= ")
            .push_bind(band.max.min(i32::MAX as u32) as i32)
            .push(" AND COALESCE(income_max, 2147483647) >= ")
            .push_bind(band.min.min(i32::MAX as u32) as i32);
    }

    if let Some(near) = predicate.near {
        let bbox = calculate_bounding_box(near.center, near.radius_km);
        qb.push(" AND latitude BETWEEN ")
            .push_bind(bbox.min_lat)
            .push(" AND ")
            .push_bind(bbox.max_lat)
            .push(" AND longitude BETWEEN ")
            .push_bind(bbox.min_lon)
            .push(" AND ")
            .push_bind(bbox.max_lon)
            .push(" AND ");
        push_distance(qb, near.center);
        qb.push(" <= ").push_bind(near.radius_km);
    }

    if let Some(since) = predicate.joined_since() {
        qb.push(" AND created_at >= ").push_bind(since);
    }

    if predicate.premium_only {
        qb.push(" AND subscription = 'premium'");
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, order: &QueryOrder) {
    match order {
        QueryOrder::RecentlyActive => {
            qb.push(" ORDER BY last_active_at DESC NULLS LAST, id ASC");
        }
        QueryOrder::NewestFirst => {
            qb.push(" ORDER BY created_at DESC, id ASC");
        }
        QueryOrder::Nearest(center) => {
            qb.push(" ORDER BY ");
            push_distance(qb, *center);
            qb.push(" ASC NULLS LAST, id ASC");
        }
        QueryOrder::Seeded(seed) => {
            qb.push(" ORDER BY md5(")
                .push_bind(format!("{}:", seed))
                .push(" || id), id ASC");
        }
    }
}

/// PostgreSQL-backed implementation of every collaborator interface
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run pending migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let query = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);
        let row: Option<ProfileRow> = sqlx::query_as(&query).bind(id).fetch_optional(&self.pool).await?;
        row.map(Profile::try_from).transpose()
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM profiles");
        push_predicate(&mut qb, predicate);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        tracing::trace!("count {:?} -> {}", predicate.constraint_names(), count);
        Ok(count.max(0) as u64)
    }

    async fn fetch(&self, query: &CandidateQuery) -> Result<Vec<Profile>, StoreError> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM profiles", PROFILE_COLUMNS));
        push_predicate(&mut qb, &query.predicate);
        push_order(&mut qb, &query.order);
        qb.push(" LIMIT ").push_bind(query.limit as i64);

        let rows = qb.build_query_as::<ProfileRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Profile::try_from).collect()
    }
}

#[async_trait]
impl PreferenceStore for PostgresStore {
    async fn get_preferences(&self, seeker_id: &str) -> Result<Option<PreferenceCriteria>, StoreError> {
        let query = r#"
            SELECT seeker_id, min_age, max_age, min_height_cm, max_height_cm, marital_status,
                   religion, any_caste, mother_tongue, education, employment, income_min,
                   income_max, manglik, states, radius_km
            FROM partner_preferences
            WHERE seeker_id = $1
        "#;

        let row: Option<PreferenceRow> = sqlx::query_as(query)
            .bind(seeker_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(PreferenceCriteria::from))
    }
}

#[async_trait]
impl ExclusionStore for PostgresStore {
    /// Profiles the seeker liked or blocked, plus profiles that blocked the seeker
    async fn excluded_ids(&self, seeker_id: &str) -> Result<BTreeSet<String>, StoreError> {
        let query = r#"
            SELECT target_id AS id FROM profile_interactions WHERE seeker_id = $1
            UNION
            SELECT seeker_id AS id FROM profile_interactions WHERE target_id = $1 AND kind = 'blocked'
        "#;

        let ids: Vec<String> = sqlx::query_scalar(query).bind(seeker_id).fetch_all(&self.pool).await?;
        tracing::debug!("Seeker {} has {} excluded profiles", seeker_id, ids.len());
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl ShownAudit for PostgresStore {
    async fn record_shown(
        &self,
        seeker_id: &str,
        mode: MatchMode,
        profile_ids: &[String],
    ) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO shown_profiles (seeker_id, profile_id, mode)
            SELECT $1, unnest($2::text[]), $3
        "#;

        sqlx::query(query)
            .bind(seeker_id)
            .bind(profile_ids)
            .bind(mode.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
