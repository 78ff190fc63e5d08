use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, Sqlite};

const POLL_COLUMNS: &str =
    "id, title, description, creator_id, expires_at, is_active, created_at";

#[derive(Debug, Clone)]
pub struct PollRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub creator_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for PollRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let expires_at_raw: Option<String> = row.try_get("expires_at")?;
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            creator_id: row.try_get("creator_id")?,
            expires_at: expires_at_raw
                .as_deref()
                .map(datetime_from_db_text)
                .transpose()?,
            is_active: row.try_get("is_active")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollOptionRow {
    pub id: i64,
    pub poll_id: i64,
    pub option_text: String,
    pub vote_count: i64,
}

/// A poll row annotated with the sum of its option counters.
#[derive(Debug, Clone)]
pub struct PollSummaryRow {
    pub poll: PollRow,
    pub total_votes: i64,
}

impl<'r> FromRow<'r, SqliteRow> for PollSummaryRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            poll: PollRow::from_row(row)?,
            total_votes: row.try_get("total_votes")?,
        })
    }
}

/// Poll and options read from a single SQLite snapshot.
#[derive(Debug, Clone)]
pub struct PollSnapshot {
    pub poll: PollRow,
    pub options: Vec<PollOptionRow>,
}

#[derive(Debug, Clone)]
pub struct NewPoll<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub creator_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub options: &'a [String],
    pub created_at: DateTime<Utc>,
}

/// Outcome of a write that only the poll's creator may perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedWrite<T> {
    Done(T),
    NotFound,
    NotOwner,
}

/// Insert the poll row and all of its options in one transaction.
pub async fn create_poll(pool: &DbPool, new_poll: NewPoll<'_>) -> Result<PollSnapshot, DbError> {
    let mut tx = pool.begin().await?;

    let poll = sqlx::query_as::<_, PollRow>(&format!(
        "INSERT INTO polls (title, description, creator_id, expires_at, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)
         RETURNING {POLL_COLUMNS}"
    ))
    .bind(new_poll.title)
    .bind(new_poll.description)
    .bind(new_poll.creator_id)
    .bind(new_poll.expires_at.map(datetime_to_db_text))
    .bind(datetime_to_db_text(new_poll.created_at))
    .fetch_one(&mut *tx)
    .await?;

    let mut options = Vec::with_capacity(new_poll.options.len());
    for text in new_poll.options {
        let option = sqlx::query_as::<_, PollOptionRow>(
            "INSERT INTO poll_options (poll_id, option_text, vote_count)
             VALUES (?1, ?2, 0)
             RETURNING id, poll_id, option_text, vote_count",
        )
        .bind(poll.id)
        .bind(text)
        .fetch_one(&mut *tx)
        .await?;
        options.push(option);
    }

    tx.commit().await?;
    Ok(PollSnapshot { poll, options })
}

pub async fn get_poll<'e, E>(executor: E, poll_id: i64) -> Result<Option<PollRow>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE id = ?1"
    ))
    .bind(poll_id)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

pub async fn get_option<'e, E>(executor: E, option_id: i64) -> Result<Option<PollOptionRow>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, PollOptionRow>(
        "SELECT id, poll_id, option_text, vote_count FROM poll_options WHERE id = ?1",
    )
    .bind(option_id)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

/// Options in creation order.
pub async fn get_poll_options<'e, E>(executor: E, poll_id: i64) -> Result<Vec<PollOptionRow>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, PollOptionRow>(
        "SELECT id, poll_id, option_text, vote_count
         FROM poll_options WHERE poll_id = ?1
         ORDER BY id",
    )
    .bind(poll_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Read the poll and its options inside one read transaction so no option
/// is observed mid-increment relative to another.
pub async fn get_poll_snapshot(pool: &DbPool, poll_id: i64) -> Result<Option<PollSnapshot>, DbError> {
    let mut tx = pool.begin().await?;
    let Some(poll) = get_poll(&mut *tx, poll_id).await? else {
        return Ok(None);
    };
    let options = get_poll_options(&mut *tx, poll_id).await?;
    tx.commit().await?;
    Ok(Some(PollSnapshot { poll, options }))
}

/// Newest first. Rows that fail to decode are logged and skipped so one bad
/// row does not hide the rest of the listing.
pub async fn list_polls_by_creator(
    pool: &DbPool,
    creator_id: i64,
) -> Result<Vec<PollSummaryRow>, DbError> {
    let rows: Vec<SqliteRow> = sqlx::query(
        "SELECT p.id, p.title, p.description, p.creator_id, p.expires_at, p.is_active, p.created_at,
                COALESCE(SUM(o.vote_count), 0) AS total_votes
         FROM polls p
         LEFT JOIN poll_options o ON o.poll_id = p.id
         WHERE p.creator_id = ?1
         GROUP BY p.id
         ORDER BY p.created_at DESC, p.id DESC",
    )
    .bind(creator_id)
    .fetch_all(pool)
    .await?;

    let summaries = rows
        .iter()
        .filter_map(|row| match PollSummaryRow::from_row(row) {
            Ok(summary) => Some(summary),
            Err(err) => {
                let id: Option<i64> = row.try_get("id").ok();
                tracing::warn!(poll_id = ?id, "skipping undecodable poll row: {err}");
                None
            }
        })
        .collect();
    Ok(summaries)
}

/// Delete a poll together with its options and ledger rows. The ownership
/// check and the delete share one transaction.
pub async fn delete_poll_owned(
    pool: &DbPool,
    poll_id: i64,
    requester_id: i64,
) -> Result<OwnedWrite<()>, DbError> {
    let mut tx = pool.begin().await?;
    match owner_of(&mut tx, poll_id).await? {
        None => return Ok(OwnedWrite::NotFound),
        Some(owner) if owner != requester_id => return Ok(OwnedWrite::NotOwner),
        Some(_) => {}
    }

    // Children first; must not depend on the foreign_keys pragma.
    sqlx::query("DELETE FROM votes WHERE poll_id = ?1")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM poll_options WHERE poll_id = ?1")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM polls WHERE id = ?1")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(OwnedWrite::Done(()))
}

pub async fn set_poll_active_owned(
    pool: &DbPool,
    poll_id: i64,
    requester_id: i64,
    is_active: bool,
) -> Result<OwnedWrite<PollRow>, DbError> {
    let mut tx = pool.begin().await?;
    match owner_of(&mut tx, poll_id).await? {
        None => return Ok(OwnedWrite::NotFound),
        Some(owner) if owner != requester_id => return Ok(OwnedWrite::NotOwner),
        Some(_) => {}
    }

    let row = sqlx::query_as::<_, PollRow>(&format!(
        "UPDATE polls SET is_active = ?2 WHERE id = ?1 RETURNING {POLL_COLUMNS}"
    ))
    .bind(poll_id)
    .bind(is_active)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(OwnedWrite::Done(row))
}

async fn owner_of(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    poll_id: i64,
) -> Result<Option<i64>, DbError> {
    let owner: Option<i64> = sqlx::query_scalar("SELECT creator_id FROM polls WHERE id = ?1")
        .bind(poll_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(owner)
}
