use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::polls::demographics::{
    AgeRange, DemographicField, DemographicRequirement, EmploymentStatus, Profile, ProfileUpdate,
};
use crate::polls::domain::{
    BallotRecord, Poll, PollDraft, PollFilter, PollId, PollOption, PollOptionId, PollStatus,
    UnknownLabel, UserId, Vote, VoteAnswerId, VoteId,
};
use crate::polls::repository::{
    PollRepository, ProfileRepository, RepositoryError, VoteRepository,
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const POLL_COLUMNS: &str = "id, title, description, poll_type, category, status, \
     max_selections, required_demographics, created_by, created_at, updated_at, closes_at";

const BALLOT_ANSWERS: &str =
    "SELECT option_id FROM vote_answers WHERE vote_id = $1 ORDER BY position ASC";

const PROFILE_COLUMNS: &str = "id, full_name, age_range, location, job_title, \
     occupation_category, employment_status, created_at, updated_at";

/// PostgreSQL-backed store. Uniqueness and cascades live in the schema; multi-row writes
/// run inside a transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_sqlx)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables, constraints, and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        info!("database schema up to date");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, RepositoryError> {
        self.pool.begin().await.map_err(map_sqlx)
    }
}

fn map_sqlx(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            RepositoryError::Conflict
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        _ => RepositoryError::Unavailable(err.to_string()),
    }
}

fn corrupt(err: UnknownLabel) -> RepositoryError {
    RepositoryError::Unavailable(format!("stored row is invalid: {err}"))
}

#[derive(FromRow)]
struct PollRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    poll_type: String,
    category: String,
    status: String,
    max_selections: Option<i32>,
    required_demographics: Vec<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closes_at: Option<DateTime<Utc>>,
}

impl TryFrom<PollRow> for Poll {
    type Error = RepositoryError;

    fn try_from(row: PollRow) -> Result<Self, Self::Error> {
        let fields = row
            .required_demographics
            .iter()
            .map(|field| field.parse::<DemographicField>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        Ok(Poll {
            id: PollId(row.id),
            title: row.title,
            description: row.description,
            poll_type: row.poll_type.parse().map_err(corrupt)?,
            category: row.category.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            max_selections: row.max_selections.and_then(|max| u32::try_from(max).ok()),
            required_demographics: DemographicRequirement::from_fields(fields),
            created_by: UserId(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
            closes_at: row.closes_at,
        })
    }
}

#[derive(FromRow)]
struct OptionRow {
    id: Uuid,
    poll_id: Uuid,
    option_text: String,
    created_at: DateTime<Utc>,
}

impl From<OptionRow> for PollOption {
    fn from(row: OptionRow) -> Self {
        PollOption {
            id: PollOptionId(row.id),
            poll_id: PollId(row.poll_id),
            option_text: row.option_text,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct VoteRow {
    id: Uuid,
    poll_id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Self {
        Vote {
            id: VoteId(row.id),
            poll_id: PollId(row.poll_id),
            user_id: UserId(row.user_id),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    full_name: Option<String>,
    age_range: Option<String>,
    location: Option<String>,
    job_title: Option<String>,
    occupation_category: Option<String>,
    employment_status: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RepositoryError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Profile {
            id: UserId(row.id),
            full_name: row.full_name,
            age_range: row
                .age_range
                .map(|value| value.parse::<AgeRange>())
                .transpose()
                .map_err(corrupt)?,
            location: row.location,
            job_title: row.job_title,
            occupation_category: row.occupation_category,
            employment_status: row
                .employment_status
                .map(|value| value.parse::<EmploymentStatus>())
                .transpose()
                .map_err(corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn demographic_labels(requirement: &DemographicRequirement) -> Vec<String> {
    requirement
        .fields()
        .iter()
        .map(|field| field.label().to_string())
        .collect()
}

fn max_selections_column(value: Option<u32>) -> Option<i32> {
    value.map(|max| i32::try_from(max).unwrap_or(i32::MAX))
}

#[async_trait]
impl PollRepository for PgStore {
    async fn list_polls(&self, filter: PollFilter) -> Result<Vec<Poll>, RepositoryError> {
        let sql = format!(
            "SELECT {POLL_COLUMNS} FROM polls \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL OR category = $2) \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, PollRow>(&sql)
            .bind(filter.status.map(|status| status.label()))
            .bind(filter.category.map(|category| category.label()))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.into_iter().map(Poll::try_from).collect()
    }

    async fn fetch_poll(&self, id: PollId) -> Result<Option<Poll>, RepositoryError> {
        let sql = format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = $1");
        let row = sqlx::query_as::<_, PollRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.map(Poll::try_from).transpose()
    }

    async fn poll_options(&self, id: PollId) -> Result<Vec<PollOption>, RepositoryError> {
        let rows = sqlx::query_as::<_, OptionRow>(
            "SELECT id, poll_id, option_text, created_at FROM poll_options \
             WHERE poll_id = $1 ORDER BY created_at ASC, position ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(PollOption::from).collect())
    }

    async fn insert_poll(&self, draft: PollDraft) -> Result<PollDraft, RepositoryError> {
        let mut tx = self.begin().await?;
        let poll = &draft.poll;

        sqlx::query(
            "INSERT INTO polls (id, title, description, poll_type, category, status, \
             max_selections, required_demographics, created_by, created_at, updated_at, closes_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(poll.id.0)
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(poll.poll_type.label())
        .bind(poll.category.label())
        .bind(poll.status.label())
        .bind(max_selections_column(poll.max_selections))
        .bind(demographic_labels(&poll.required_demographics))
        .bind(poll.created_by.0)
        .bind(poll.created_at)
        .bind(poll.updated_at)
        .bind(poll.closes_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        for (position, option) in draft.options.iter().enumerate() {
            sqlx::query(
                "INSERT INTO poll_options (id, poll_id, option_text, position, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(option.id.0)
            .bind(option.poll_id.0)
            .bind(&option.option_text)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(option.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(draft)
    }

    async fn update_poll(
        &self,
        poll: Poll,
        expected: PollStatus,
    ) -> Result<Poll, RepositoryError> {
        let result = sqlx::query(
            "UPDATE polls SET title = $2, description = $3, category = $4, status = $5, \
             max_selections = $6, required_demographics = $7, updated_at = $8, closes_at = $9 \
             WHERE id = $1 AND status = $10",
        )
        .bind(poll.id.0)
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(poll.category.label())
        .bind(poll.status.label())
        .bind(max_selections_column(poll.max_selections))
        .bind(demographic_labels(&poll.required_demographics))
        .bind(poll.updated_at)
        .bind(poll.closes_at)
        .bind(expected.label())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            let exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM polls WHERE id = $1)")
                    .bind(poll.id.0)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx)?;
            return Err(if exists {
                RepositoryError::Conflict
            } else {
                RepositoryError::NotFound
            });
        }
        Ok(poll)
    }

    async fn delete_poll(&self, id: PollId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl VoteRepository for PgStore {
    async fn record_vote(
        &self,
        vote: Vote,
        option_ids: &[PollOptionId],
    ) -> Result<Vote, RepositoryError> {
        let mut tx = self.begin().await?;

        // Holds off concurrent status changes until the vote commits.
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM polls WHERE id = $1 FOR SHARE",
        )
        .bind(vote.poll_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(RepositoryError::NotFound)?
        .parse::<PollStatus>()
        .map_err(corrupt)?;
        if status != PollStatus::Active {
            return Err(RepositoryError::PollNotActive(status));
        }

        sqlx::query("INSERT INTO votes (id, poll_id, user_id, created_at) VALUES ($1, $2, $3, $4)")
            .bind(vote.id.0)
            .bind(vote.poll_id.0)
            .bind(vote.user_id.0)
            .bind(vote.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        for (position, option_id) in option_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO vote_answers (id, vote_id, option_id, position, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(VoteAnswerId::new().0)
            .bind(vote.id.0)
            .bind(option_id.0)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(vote.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(vote)
    }

    async fn find_vote(
        &self,
        poll_id: PollId,
        user_id: UserId,
    ) -> Result<Option<BallotRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, VoteRow>(
            "SELECT id, poll_id, user_id, created_at FROM votes \
             WHERE poll_id = $1 AND user_id = $2",
        )
        .bind(poll_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let option_ids = sqlx::query_scalar::<_, Uuid>(BALLOT_ANSWERS)
            .bind(row.id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(Some(BallotRecord {
            vote: Vote::from(row),
            option_ids: option_ids.into_iter().map(PollOptionId).collect(),
        }))
    }

    async fn count_votes(&self, poll_id: PollId) -> Result<u64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM votes WHERE poll_id = $1")
            .bind(poll_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn answer_counts(
        &self,
        poll_id: PollId,
    ) -> Result<BTreeMap<PollOptionId, u64>, RepositoryError> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT a.option_id, COUNT(*) FROM vote_answers a \
             JOIN votes v ON v.id = a.vote_id \
             WHERE v.poll_id = $1 GROUP BY a.option_id",
        )
        .bind(poll_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|(option_id, count)| (PollOptionId(option_id), u64::try_from(count).unwrap_or(0)))
            .collect())
    }
}

#[async_trait]
impl ProfileRepository for PgStore {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, RepositoryError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.map(Profile::try_from).transpose()
    }

    async fn upsert_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<Profile, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.begin().await?;

        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1 FOR UPDATE");
        let existing = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let mut profile = match existing {
            Some(row) => Profile::try_from(row)?,
            None => Profile::empty(user_id, now),
        };
        update.apply(&mut profile, now);

        sqlx::query(
            "INSERT INTO profiles (id, full_name, age_range, location, job_title, \
             occupation_category, employment_status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name, \
             age_range = EXCLUDED.age_range, location = EXCLUDED.location, \
             job_title = EXCLUDED.job_title, occupation_category = EXCLUDED.occupation_category, \
             employment_status = EXCLUDED.employment_status, updated_at = EXCLUDED.updated_at",
        )
        .bind(profile.id.0)
        .bind(&profile.full_name)
        .bind(profile.age_range.map(|value| value.label()))
        .bind(&profile.location)
        .bind(&profile.job_title)
        .bind(&profile.occupation_category)
        .bind(profile.employment_status.map(|value| value.label()))
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_vote_uniqueness_and_cascades() {
        assert!(SCHEMA.contains("UNIQUE (poll_id, user_id)"));
        assert!(SCHEMA.matches("ON DELETE CASCADE").count() >= 4);
    }

    #[test]
    fn ballot_answers_keep_submission_order() {
        let answers_table = SCHEMA
            .split("CREATE TABLE IF NOT EXISTS vote_answers")
            .nth(1)
            .and_then(|rest| rest.split(");").next())
            .expect("vote_answers table declared");
        assert!(answers_table.contains("position INTEGER NOT NULL"));
        assert!(BALLOT_ANSWERS.ends_with("ORDER BY position ASC"));
    }

    #[test]
    fn poll_row_rejects_unknown_labels() {
        let now = Utc::now();
        let row = PollRow {
            id: Uuid::new_v4(),
            title: "Favourite editor".to_string(),
            description: None,
            poll_type: "ranked".to_string(),
            category: "social".to_string(),
            status: "active".to_string(),
            max_selections: None,
            required_demographics: Vec::new(),
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            closes_at: None,
        };

        assert!(matches!(
            Poll::try_from(row),
            Err(RepositoryError::Unavailable(message)) if message.contains("ranked")
        ));
    }

    #[test]
    fn poll_row_restores_required_fields_in_order() {
        let now = Utc::now();
        let row = PollRow {
            id: Uuid::new_v4(),
            title: "Commute survey".to_string(),
            description: Some("How do you get to work?".to_string()),
            poll_type: "multiple_choice".to_string(),
            category: "market_research".to_string(),
            status: "draft".to_string(),
            max_selections: Some(2),
            required_demographics: vec!["location".to_string(), "age_range".to_string()],
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            closes_at: None,
        };

        let poll = Poll::try_from(row).expect("valid row");
        assert_eq!(poll.max_selections, Some(2));
        assert_eq!(
            poll.required_demographics.fields(),
            &[DemographicField::Location, DemographicField::AgeRange]
        );
    }
}
