use super::model::{EncodingChanges, EncodingFilter, EncodingJob, EncodingPage, EncodingRow, JobStatus, NewEncodingJob};
use crate::common::error::{EncodingError, Result};
use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Durable CRUD over encoding jobs. Every mutation is a single-record atomic
/// update; status changes are conditional (see [`EncodingChanges`]).
#[async_trait]
pub trait EncodingRepository: Send + Sync {
    async fn save(&self, job: NewEncodingJob) -> Result<EncodingJob>;

    async fn find_by_id(&self, id: Uuid) -> Result<EncodingJob>;

    /// Forward-only page sorted by id; `cursor` is an exclusive lower bound.
    async fn find(&self, filter: &EncodingFilter, cursor: Option<Uuid>, limit: i64) -> Result<EncodingPage>;

    async fn update_by_id(&self, id: Uuid, changes: EncodingChanges, upsert: bool) -> Result<EncodingJob>;

    /// Updates the first job (by id) matching `filter`.
    async fn update_by_filter(&self, filter: &EncodingFilter, changes: EncodingChanges) -> Result<EncodingJob>;
}

fn is_empty(filter: &EncodingFilter) -> bool {
    filter.user_id.is_none()
        && filter.foreign_id.is_none()
        && filter.third_party_encoder.is_none()
        && filter.status.is_none()
}

fn upsert_record(id: Uuid, changes: &EncodingChanges) -> Result<NewEncodingJob> {
    let user_id = changes
        .user_id
        .clone()
        .ok_or_else(|| EncodingError::Validation(format!("userId is required to create encoding {}", id)))?;

    Ok(NewEncodingJob {
        user_id,
        description: changes.description.clone().unwrap_or_default(),
        status: changes.status.unwrap_or(JobStatus::Submitted),
        foreign_id: changes.foreign_id.clone(),
        third_party_encoder: changes.third_party_encoder.clone().unwrap_or_default(),
    })
}

// --- POSTGRES ---

const COLUMNS: &str = "id, user_id, description, status, foreign_id, third_party_encoder, created_at, updated_at";

#[derive(Clone)]
pub struct PgEncodingRepository {
    pool: PgPool,
}

impl PgEncodingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert<'e, E: PgExecutor<'e>>(executor: E, id: Uuid, job: &NewEncodingJob) -> Result<EncodingJob> {
        let sql = format!(
            r#"
            INSERT INTO encodings (id, user_id, description, status, foreign_id, third_party_encoder)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                status = CASE
                    WHEN encoding_status_rank(EXCLUDED.status) > encoding_status_rank(encodings.status)
                    THEN EXCLUDED.status ELSE encodings.status END,
                foreign_id = COALESCE(encodings.foreign_id, EXCLUDED.foreign_id),
                updated_at = NOW()
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, EncodingRow>(&sql)
            .bind(id)
            .bind(&job.user_id)
            .bind(&job.description)
            .bind(job.status.as_str())
            .bind(&job.foreign_id)
            .bind(&job.third_party_encoder)
            .fetch_one(executor)
            .await?;

        into_job(row)
    }

    async fn update_row<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        changes: &EncodingChanges,
    ) -> Result<Option<EncodingJob>> {
        let sql = format!(
            r#"
            UPDATE encodings SET
                status = CASE
                    WHEN $2::text IS NOT NULL AND encoding_status_rank($2::text) > encoding_status_rank(status)
                    THEN $2::text ELSE status END,
                foreign_id = COALESCE(foreign_id, $3),
                description = COALESCE($4, description),
                third_party_encoder = COALESCE($5, third_party_encoder),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, EncodingRow>(&sql)
            .bind(id)
            .bind(changes.status.map(|s| s.as_str()))
            .bind(&changes.foreign_id)
            .bind(&changes.description)
            .bind(&changes.third_party_encoder)
            .fetch_optional(executor)
            .await?;

        row.map(into_job).transpose()
    }
}

fn into_job(row: EncodingRow) -> Result<EncodingJob> {
    EncodingJob::try_from(row).map_err(EncodingError::Internal)
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &EncodingFilter) {
    if let Some(user_id) = &filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(foreign_id) = &filter.foreign_id {
        query.push(" AND foreign_id = ").push_bind(foreign_id.clone());
    }
    if let Some(encoder) = &filter.third_party_encoder {
        query.push(" AND third_party_encoder = ").push_bind(encoder.clone());
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl EncodingRepository for PgEncodingRepository {
    async fn save(&self, job: NewEncodingJob) -> Result<EncodingJob> {
        Self::insert(&self.pool, Uuid::now_v7(), &job).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<EncodingJob> {
        let sql = format!("SELECT {COLUMNS} FROM encodings WHERE id = $1");
        let row = sqlx::query_as::<_, EncodingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EncodingError::not_found("encoding", id))?;

        into_job(row)
    }

    async fn find(&self, filter: &EncodingFilter, cursor: Option<Uuid>, limit: i64) -> Result<EncodingPage> {
        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM encodings WHERE TRUE"));
        push_filter(&mut query, filter);
        if let Some(cursor) = cursor {
            query.push(" AND id > ").push_bind(cursor);
        }
        query.push(" ORDER BY id ASC LIMIT ").push_bind(limit.max(0));

        let rows = query.build_query_as::<EncodingRow>().fetch_all(&self.pool).await?;
        let results = rows.into_iter().map(into_job).collect::<Result<Vec<_>>>()?;

        Ok(EncodingPage::new(results, cursor))
    }

    async fn update_by_id(&self, id: Uuid, changes: EncodingChanges, upsert: bool) -> Result<EncodingJob> {
        if let Some(job) = Self::update_row(&self.pool, id, &changes).await? {
            return Ok(job);
        }
        if !upsert {
            return Err(EncodingError::not_found("encoding", id));
        }

        Self::insert(&self.pool, id, &upsert_record(id, &changes)?).await
    }

    async fn update_by_filter(&self, filter: &EncodingFilter, changes: EncodingChanges) -> Result<EncodingJob> {
        if is_empty(filter) {
            return Err(EncodingError::Validation("update requires a non-empty filter".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT id FROM encodings WHERE TRUE");
        push_filter(&mut query, filter);
        query.push(" ORDER BY id ASC LIMIT 1 FOR UPDATE");

        let id = query
            .build_query_scalar::<Uuid>()
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EncodingError::not_found("encoding", describe(filter)))?;

        let job = Self::update_row(&mut *tx, id, &changes)
            .await?
            .ok_or_else(|| EncodingError::not_found("encoding", id))?;

        tx.commit().await?;
        Ok(job)
    }
}

fn describe(filter: &EncodingFilter) -> String {
    let mut parts = Vec::new();
    if let Some(v) = &filter.user_id {
        parts.push(format!("userId={}", v));
    }
    if let Some(v) = &filter.foreign_id {
        parts.push(format!("foreignId={}", v));
    }
    if let Some(v) = &filter.third_party_encoder {
        parts.push(format!("thirdPartyEncoder={}", v));
    }
    if let Some(v) = filter.status {
        parts.push(format!("status={}", v));
    }
    parts.join(",")
}

// --- IN-MEMORY ---

/// Process-local store; ids are UUIDv7 so map order is creation order.
#[derive(Default)]
pub struct MemoryEncodingRepository {
    jobs: RwLock<BTreeMap<Uuid, EncodingJob>>,
}

impl MemoryEncodingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(id: Uuid, job: NewEncodingJob) -> EncodingJob {
        let now = OffsetDateTime::now_utc();
        EncodingJob {
            id,
            user_id: job.user_id,
            description: job.description,
            status: job.status,
            foreign_id: job.foreign_id,
            third_party_encoder: job.third_party_encoder,
            created_at: now,
            updated_at: now,
        }
    }
}

// Mirrors the unique index on foreign_id.
fn ensure_foreign_id_free(jobs: &BTreeMap<Uuid, EncodingJob>, id: Uuid, foreign_id: Option<&str>) -> Result<()> {
    let Some(foreign_id) = foreign_id else {
        return Ok(());
    };
    if jobs.values().any(|job| job.id != id && job.foreign_id.as_deref() == Some(foreign_id)) {
        return Err(EncodingError::Conflict(format!("encoding already exists (foreign id {})", foreign_id)));
    }
    Ok(())
}

#[async_trait]
impl EncodingRepository for MemoryEncodingRepository {
    async fn save(&self, job: NewEncodingJob) -> Result<EncodingJob> {
        let mut jobs = self.jobs.write().await;
        let job = Self::create(Uuid::now_v7(), job);
        ensure_foreign_id_free(&jobs, job.id, job.foreign_id.as_deref())?;
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<EncodingJob> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| EncodingError::not_found("encoding", id))
    }

    async fn find(&self, filter: &EncodingFilter, cursor: Option<Uuid>, limit: i64) -> Result<EncodingPage> {
        let jobs = self.jobs.read().await;
        let results = jobs
            .values()
            .filter(|job| cursor.is_none_or(|c| job.id > c))
            .filter(|job| filter.matches(job))
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok(EncodingPage::new(results, cursor))
    }

    async fn update_by_id(&self, id: Uuid, changes: EncodingChanges, upsert: bool) -> Result<EncodingJob> {
        let mut jobs = self.jobs.write().await;
        let now = OffsetDateTime::now_utc();

        let settled = jobs.get(&id).is_some_and(|job| job.foreign_id.is_some());
        if !settled {
            ensure_foreign_id_free(&jobs, id, changes.foreign_id.as_deref())?;
        }

        if let Some(job) = jobs.get_mut(&id) {
            changes.apply_to(job, now);
            return Ok(job.clone());
        }
        if !upsert {
            return Err(EncodingError::not_found("encoding", id));
        }

        let job = Self::create(id, upsert_record(id, &changes)?);
        jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn update_by_filter(&self, filter: &EncodingFilter, changes: EncodingChanges) -> Result<EncodingJob> {
        if is_empty(filter) {
            return Err(EncodingError::Validation("update requires a non-empty filter".to_string()));
        }

        let mut jobs = self.jobs.write().await;
        let (id, settled) = jobs
            .values()
            .find(|job| filter.matches(job))
            .map(|job| (job.id, job.foreign_id.is_some()))
            .ok_or_else(|| EncodingError::not_found("encoding", describe(filter)))?;
        if !settled {
            ensure_foreign_id_free(&jobs, id, changes.foreign_id.as_deref())?;
        }

        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| EncodingError::not_found("encoding", id))?;
        changes.apply_to(job, OffsetDateTime::now_utc());
        Ok(job.clone())
    }
}
