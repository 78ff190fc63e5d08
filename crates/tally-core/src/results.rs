use crate::eligibility::poll_status;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use tally_db::polls::{PollRow, PollSnapshot};
use tally_db::DbPool;
use tally_models::poll::{Poll, PollOption};

/// Read-only view of a poll's tallies. Trusts the option counters; the
/// ledger is only consulted by [`ResultAggregator::audit`].
#[derive(Clone)]
pub struct ResultAggregator {
    db: DbPool,
}

/// Counter total next to ledger size, read in one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyAudit {
    pub counted: i64,
    pub recorded: i64,
}

impl TallyAudit {
    pub fn is_consistent(&self) -> bool {
        self.counted == self.recorded
    }
}

impl ResultAggregator {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn compute_results(&self, poll_id: i64) -> Result<Poll, CoreError> {
        let snapshot = tally_db::polls::get_poll_snapshot(&self.db, poll_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        Ok(poll_from_snapshot(snapshot, Utc::now()))
    }

    pub async fn audit(&self, poll_id: i64) -> Result<TallyAudit, CoreError> {
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| CoreError::Database(e.into()))?;
        if tally_db::polls::get_poll(&mut *tx, poll_id).await?.is_none() {
            return Err(CoreError::NotFound);
        }
        let counted = tally_db::polls::get_poll_options(&mut *tx, poll_id)
            .await?
            .iter()
            .map(|o| o.vote_count)
            .sum();
        let recorded = tally_db::votes::count_votes_for_poll(&mut *tx, poll_id).await?;
        tx.commit().await.map_err(|e| CoreError::Database(e.into()))?;
        Ok(TallyAudit { counted, recorded })
    }
}

pub(crate) fn poll_from_snapshot(snapshot: PollSnapshot, now: DateTime<Utc>) -> Poll {
    let options: Vec<PollOption> = snapshot
        .options
        .into_iter()
        .map(|o| PollOption {
            id: o.id,
            text: o.option_text,
            vote_count: o.vote_count,
        })
        .collect();
    let total_votes = options.iter().map(|o| o.vote_count).sum();
    poll_from_row(snapshot.poll, options, total_votes, now)
}

pub(crate) fn poll_from_row(
    row: PollRow,
    options: Vec<PollOption>,
    total_votes: i64,
    now: DateTime<Utc>,
) -> Poll {
    let status = poll_status(&row, now);
    Poll {
        id: row.id,
        title: row.title,
        description: row.description,
        creator_id: row.creator_id,
        expires_at: row.expires_at,
        is_active: row.is_active,
        status,
        created_at: row.created_at,
        options,
        total_votes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_pool, seed_poll};
    use chrono::Duration;
    use tally_models::poll::PollStatus;

    #[tokio::test]
    async fn results_sum_option_counters() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["Red", "Blue"], None).await;
        sqlx::query("UPDATE poll_options SET vote_count = 4 WHERE id = ?1")
            .bind(poll.options[0].id)
            .execute(&pool)
            .await
            .unwrap();

        let results = ResultAggregator::new(pool).compute_results(poll.id).await.unwrap();
        assert_eq!(results.total_votes, 4);
        assert_eq!(results.options[0].vote_count, 4);
        assert_eq!(results.options[1].vote_count, 0);
    }

    #[tokio::test]
    async fn results_missing_poll_is_not_found() {
        let pool = memory_pool().await;
        let err = ResultAggregator::new(pool).compute_results(99).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[tokio::test]
    async fn status_is_recomputed_at_read_time() {
        let pool = memory_pool().await;
        let poll = seed_poll(
            &pool,
            1,
            &["A", "B"],
            Some(Utc::now() + Duration::milliseconds(150)),
        )
        .await;
        let aggregator = ResultAggregator::new(pool);
        assert_eq!(
            aggregator.compute_results(poll.id).await.unwrap().status,
            PollStatus::Active
        );
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        let later = aggregator.compute_results(poll.id).await.unwrap();
        assert_eq!(later.status, PollStatus::Expired);
        assert!(later.is_active);
    }

    #[tokio::test]
    async fn audit_detects_counter_drift() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        let aggregator = ResultAggregator::new(pool.clone());
        assert!(aggregator.audit(poll.id).await.unwrap().is_consistent());

        sqlx::query("UPDATE poll_options SET vote_count = 1 WHERE id = ?1")
            .bind(poll.options[1].id)
            .execute(&pool)
            .await
            .unwrap();
        let audit = aggregator.audit(poll.id).await.unwrap();
        assert_eq!(audit, TallyAudit { counted: 1, recorded: 0 });
        assert!(!audit.is_consistent());
    }
}
