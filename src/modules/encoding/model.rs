use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of an encoding job. Ordering is `SUBMITTED -> STARTED -> FINISHED | ERROR`;
/// the two terminal states are fixed points.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Started,
    Finished,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Started => "STARTED",
            JobStatus::Finished => "FINISHED",
            JobStatus::Error => "ERROR",
        }
    }

    // Must agree with encoding_status_rank() in the migrations.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Submitted => 0,
            JobStatus::Started => 1,
            JobStatus::Finished | JobStatus::Error => 2,
        }
    }

    /// Only strictly forward moves are accepted, so replays and stale
    /// deliveries collapse into no-ops.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(JobStatus::Submitted),
            "STARTED" => Ok(JobStatus::Started),
            "FINISHED" => Ok(JobStatus::Finished),
            "ERROR" => Ok(JobStatus::Error),
            other => Err(format!("Unknown encoding status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingJob {
    pub id: Uuid,
    pub user_id: String,
    pub description: String,
    pub status: JobStatus,
    pub foreign_id: Option<String>,
    pub third_party_encoder: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row shape of the `encodings` table; status is stored as text.
#[derive(Debug, FromRow)]
pub struct EncodingRow {
    pub id: Uuid,
    pub user_id: String,
    pub description: String,
    pub status: String,
    pub foreign_id: Option<String>,
    pub third_party_encoder: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<EncodingRow> for EncodingJob {
    type Error = String;

    fn try_from(row: EncodingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            description: row.description,
            status: row.status.parse()?,
            foreign_id: row.foreign_id,
            third_party_encoder: row.third_party_encoder,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewEncodingJob {
    pub user_id: String,
    pub description: String,
    pub status: JobStatus,
    pub foreign_id: Option<String>,
    pub third_party_encoder: String,
}

/// Exact-match predicate; unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct EncodingFilter {
    pub user_id: Option<String>,
    pub foreign_id: Option<String>,
    pub third_party_encoder: Option<String>,
    pub status: Option<JobStatus>,
}

impl EncodingFilter {
    pub fn by_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn by_foreign_id(foreign_id: impl Into<String>) -> Self {
        Self {
            foreign_id: Some(foreign_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, job: &EncodingJob) -> bool {
        self.user_id.as_ref().is_none_or(|v| *v == job.user_id)
            && self
                .foreign_id
                .as_ref()
                .is_none_or(|v| job.foreign_id.as_ref() == Some(v))
            && self
                .third_party_encoder
                .as_ref()
                .is_none_or(|v| *v == job.third_party_encoder)
            && self.status.is_none_or(|v| v == job.status)
    }
}

/// Partial update. `status` only applies when it moves the job forward and
/// `foreign_id` only when none is recorded yet; `user_id` is used solely when
/// an upsert has to create the record.
#[derive(Debug, Clone, Default)]
pub struct EncodingChanges {
    pub user_id: Option<String>,
    pub description: Option<String>,
    pub status: Option<JobStatus>,
    pub foreign_id: Option<String>,
    pub third_party_encoder: Option<String>,
}

impl EncodingChanges {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, job: &mut EncodingJob, now: OffsetDateTime) {
        if let Some(status) = self.status {
            if job.status.can_transition_to(status) {
                job.status = status;
            }
        }
        if job.foreign_id.is_none() {
            job.foreign_id = self.foreign_id.clone();
        }
        if let Some(description) = &self.description {
            job.description = description.clone();
        }
        if let Some(encoder) = &self.third_party_encoder {
            job.third_party_encoder = encoder.clone();
        }
        job.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct EncodingPage {
    pub results: Vec<EncodingJob>,
    pub prev_cursor: Option<Uuid>,
    pub curr_cursor: Option<Uuid>,
}

impl EncodingPage {
    pub fn new(results: Vec<EncodingJob>, cursor: Option<Uuid>) -> Self {
        let prev_cursor = cursor.and_then(|_| results.first().map(|j| j.id));
        let curr_cursor = results.last().map(|j| j.id);

        Self {
            results,
            prev_cursor,
            curr_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus, foreign_id: Option<&str>) -> EncodingJob {
        let now = OffsetDateTime::now_utc();
        EncodingJob {
            id: Uuid::now_v7(),
            user_id: "u1".into(),
            description: "a.mp4".into(),
            status,
            foreign_id: foreign_id.map(str::to_string),
            third_party_encoder: "bitMovin".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_only_moves_forward() {
        assert!(JobStatus::Submitted.can_transition_to(JobStatus::Started));
        assert!(JobStatus::Submitted.can_transition_to(JobStatus::Error));
        assert!(JobStatus::Started.can_transition_to(JobStatus::Finished));
        assert!(!JobStatus::Started.can_transition_to(JobStatus::Started));
        assert!(!JobStatus::Finished.can_transition_to(JobStatus::Started));
        assert!(!JobStatus::Finished.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Error.can_transition_to(JobStatus::Finished));
    }

    #[test]
    fn finished_then_started_stays_finished() {
        let mut j = job(JobStatus::Started, Some("f1"));
        let now = OffsetDateTime::now_utc();
        EncodingChanges::status(JobStatus::Finished).apply_to(&mut j, now);
        EncodingChanges::status(JobStatus::Started).apply_to(&mut j, now);
        assert_eq!(j.status, JobStatus::Finished);
    }

    #[test]
    fn foreign_id_is_written_once() {
        let mut j = job(JobStatus::Submitted, None);
        let now = OffsetDateTime::now_utc();
        let first = EncodingChanges {
            foreign_id: Some("remote-1".into()),
            status: Some(JobStatus::Started),
            ..EncodingChanges::default()
        };
        first.apply_to(&mut j, now);
        let second = EncodingChanges {
            foreign_id: Some("remote-2".into()),
            ..EncodingChanges::default()
        };
        second.apply_to(&mut j, now);
        assert_eq!(j.foreign_id.as_deref(), Some("remote-1"));
        assert_eq!(j.status, JobStatus::Started);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [JobStatus::Submitted, JobStatus::Started, JobStatus::Finished, JobStatus::Error] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("RUNNING".parse::<JobStatus>().is_err());
    }

    #[test]
    fn filter_matches_subset_of_fields() {
        let j = job(JobStatus::Started, Some("f1"));
        assert!(EncodingFilter::default().matches(&j));
        assert!(EncodingFilter::by_user("u1").matches(&j));
        assert!(!EncodingFilter::by_user("u2").matches(&j));
        assert!(EncodingFilter::by_foreign_id("f1").matches(&j));
        assert!(!EncodingFilter::by_foreign_id("f2").matches(&job(JobStatus::Submitted, None)));
        let f = EncodingFilter {
            status: Some(JobStatus::Finished),
            ..EncodingFilter::by_user("u1")
        };
        assert!(!f.matches(&j));
    }

    #[test]
    fn page_cursors() {
        let a = job(JobStatus::Submitted, None);
        let b = job(JobStatus::Submitted, None);
        let first = EncodingPage::new(vec![a.clone(), b.clone()], None);
        assert_eq!(first.prev_cursor, None);
        assert_eq!(first.curr_cursor, Some(b.id));

        let next = EncodingPage::new(vec![b.clone()], Some(a.id));
        assert_eq!(next.prev_cursor, Some(b.id));
        assert_eq!(next.curr_cursor, Some(b.id));

        let empty = EncodingPage::new(vec![], Some(b.id));
        assert_eq!(empty.prev_cursor, None);
        assert_eq!(empty.curr_cursor, None);
    }
}
