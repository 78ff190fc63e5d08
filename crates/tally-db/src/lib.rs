pub mod polls;
pub mod votes;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub type DbPool = sqlx::SqlitePool;

const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    /// True when the storage engine rejected a write on a UNIQUE index.
    pub fn is_unique_violation(&self) -> bool {
        let DbError::Sqlx(sqlx::Error::Database(db_err)) = self else {
            return false;
        };
        db_err.is_unique_violation()
    }
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    create_pool_with_busy_timeout(database_url, max_connections, DEFAULT_BUSY_TIMEOUT).await
}

/// `busy_timeout` bounds how long a connection waits for SQLite's write lock
/// before the statement fails with SQLITE_BUSY.
pub async fn create_pool_with_busy_timeout(
    database_url: &str,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("migrations: applied successfully");
    Ok(())
}

/// Cheap liveness check used by the health endpoint.
pub async fn ping(pool: &DbPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

pub fn datetime_to_db_text(value: DateTime<Utc>) -> String {
    value.format(DB_DATETIME_FORMAT).to_string()
}

pub fn datetime_from_db_text(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}


#[cfg(test)]
mod tests {
    use super::{create_pool, datetime_from_db_text, datetime_to_db_text, ping, run_migrations};
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn create_pool_supports_in_memory_sqlite() {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        let value: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query");
        assert_eq!(value, 1);
        ping(&pool).await.expect("ping");
    }

    #[tokio::test]
    async fn migrations_enforce_foreign_keys() {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        let err = sqlx::query(
            "INSERT INTO poll_options (poll_id, option_text) VALUES (999, 'orphan')",
        )
        .execute(&pool)
        .await
        .expect_err("orphan option must be rejected");
        assert!(matches!(err, sqlx::Error::Database(_)));
    }

    #[test]
    fn db_text_preserves_chronological_order() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 9, 9, 59, 59).unwrap();
        let later = earlier + Duration::milliseconds(1);
        let a = datetime_to_db_text(earlier);
        let b = datetime_to_db_text(later);
        assert!(a < b);
        assert_eq!(datetime_from_db_text(&a).unwrap(), earlier);
        assert_eq!(datetime_from_db_text(&b).unwrap(), later);
    }

    #[test]
    fn db_text_accepts_sqlite_and_rfc3339_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(datetime_from_db_text("2026-01-02 03:04:05").unwrap(), expected);
        assert_eq!(
            datetime_from_db_text("2026-01-02T03:04:05Z").unwrap(),
            expected
        );
        assert!(datetime_from_db_text("yesterday").is_err());
    }
}
