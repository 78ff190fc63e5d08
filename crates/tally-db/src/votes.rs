use crate::{datetime_from_db_text, datetime_to_db_text, DbError};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, Sqlite};
use tally_models::identity::Identity;

#[derive(Debug, Clone)]
pub struct VoteRow {
    pub id: i64,
    pub poll_id: i64,
    pub user_id: Option<i64>,
    pub option_id: i64,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for VoteRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            poll_id: row.try_get("poll_id")?,
            user_id: row.try_get("user_id")?,
            option_id: row.try_get("option_id")?,
            ip_address: row.try_get("ip_address")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn find_vote<'e, E>(
    executor: E,
    poll_id: i64,
    identity: &Identity,
) -> Result<Option<VoteRow>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let query = match identity {
        Identity::User(user_id) => sqlx::query_as::<_, VoteRow>(
            "SELECT id, poll_id, user_id, option_id, ip_address, created_at
             FROM votes WHERE poll_id = ?1 AND user_id = ?2",
        )
        .bind(poll_id)
        .bind(*user_id),
        Identity::Address(addr) => sqlx::query_as::<_, VoteRow>(
            "SELECT id, poll_id, user_id, option_id, ip_address, created_at
             FROM votes WHERE poll_id = ?1 AND user_id IS NULL AND ip_address = ?2",
        )
        .bind(poll_id)
        .bind(addr.clone()),
    };
    Ok(query.fetch_optional(executor).await?)
}

/// Append a ledger row, but only while the poll is active, unexpired at
/// `now`, and owns `option_id`. Returns `None` when the guard rejects the
/// insert. A second row for the same identity fails on the partial unique
/// indexes (see [`DbError::is_unique_violation`]).
pub async fn insert_vote_guarded<'e, E>(
    executor: E,
    poll_id: i64,
    option_id: i64,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<Option<VoteRow>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, VoteRow>(
        "INSERT INTO votes (poll_id, user_id, option_id, ip_address, created_at)
         SELECT ?1, ?2, ?3, ?4, ?5
         WHERE EXISTS (
             SELECT 1
             FROM poll_options o
             INNER JOIN polls p ON p.id = o.poll_id
             WHERE o.id = ?3
               AND o.poll_id = ?1
               AND p.is_active = 1
               AND (p.expires_at IS NULL OR p.expires_at > ?5)
         )
         RETURNING id, poll_id, user_id, option_id, ip_address, created_at",
    )
    .bind(poll_id)
    .bind(identity.user_id())
    .bind(option_id)
    .bind(identity.ip_address().map(str::to_string))
    .bind(datetime_to_db_text(now))
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

/// Bump an option's tally by one. Returns the number of rows touched, which
/// is 0 if the option vanished or belongs to another poll.
pub async fn increment_option_count<'e, E>(
    executor: E,
    poll_id: i64,
    option_id: i64,
) -> Result<u64, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE poll_options SET vote_count = vote_count + 1
         WHERE id = ?1 AND poll_id = ?2",
    )
    .bind(option_id)
    .bind(poll_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Number of ledger rows for a poll.
pub async fn count_votes_for_poll<'e, E>(executor: E, poll_id: i64) -> Result<i64, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM votes WHERE poll_id = ?1")
        .bind(poll_id)
        .fetch_one(executor)
        .await?;
    Ok(count)
}
