use crate::eligibility::check_eligibility;
use crate::error::{read_fault, write_fault, CoreError};
use crate::observability;
use chrono::{DateTime, Utc};
use sqlx::Sqlite;
use std::time::Duration;
use tally_db::DbPool;
use tally_models::identity::Identity;
use tally_models::poll::VoteRecord;

/// Appends ledger rows and bumps option tallies as one unit of work.
///
/// The pre-flight eligibility read only narrows the race window. Exactly
/// one of several concurrent submissions for the same (poll, identity) can
/// commit because the ledger insert is checked by the partial unique
/// indexes; the losers see [`CoreError::DuplicateVote`] (or
/// [`CoreError::TransactionFailure`] if SQLite's lock wait ran out first).
#[derive(Clone)]
pub struct VoteRecorder {
    db: DbPool,
    deadline: Option<Duration>,
}

impl VoteRecorder {
    pub fn new(db: DbPool) -> Self {
        Self { db, deadline: None }
    }

    /// Bound the whole submission, lock waits included. On expiry the
    /// in-flight transaction is dropped and rolled back.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub async fn record_vote(
        &self,
        poll_id: i64,
        option_id: i64,
        identity: &Identity,
    ) -> Result<VoteRecord, CoreError> {
        let attempt = self.submit(poll_id, option_id, identity);
        let result = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, attempt).await {
                Ok(result) => result,
                Err(_) => Err(write_fault(
                    "record vote",
                    format!("deadline of {deadline:?} elapsed"),
                )),
            },
            None => attempt.await,
        };

        match &result {
            Ok(vote) => {
                observability::vote_committed();
                tracing::debug!(
                    poll_id,
                    option_id,
                    vote_id = vote.id,
                    identity = %identity,
                    "vote recorded"
                );
            }
            Err(err) => {
                observability::vote_rejected(err.code());
                tracing::debug!(poll_id, option_id, identity = %identity, "vote rejected: {err}");
            }
        }
        result
    }

    async fn submit(
        &self,
        poll_id: i64,
        option_id: i64,
        identity: &Identity,
    ) -> Result<VoteRecord, CoreError> {
        let now = Utc::now();
        let poll = tally_db::polls::get_poll(&self.db, poll_id)
            .await
            .map_err(|e| read_fault("load poll", e))?
            .ok_or(CoreError::NotFound)?;
        let option = tally_db::polls::get_option(&self.db, option_id)
            .await
            .map_err(|e| read_fault("load option", e))?
            .ok_or(CoreError::NotFound)?;
        let already_voted = tally_db::votes::find_vote(&self.db, poll_id, identity)
            .await
            .map_err(|e| read_fault("load existing vote", e))?
            .is_some();
        check_eligibility(&poll, &option, already_voted, now)?;

        self.commit_vote(poll_id, option_id, identity).await
    }

    /// The guarded insert is the first statement, so the transaction takes
    /// SQLite's write lock before it reads anything. Every early return
    /// drops `tx`, which rolls it back.
    async fn commit_vote(
        &self,
        poll_id: i64,
        option_id: i64,
        identity: &Identity,
    ) -> Result<VoteRecord, CoreError> {
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| write_fault("begin vote", e))?;
        let now = Utc::now();

        let inserted =
            match tally_db::votes::insert_vote_guarded(&mut *tx, poll_id, option_id, identity, now)
                .await
            {
                Ok(row) => row,
                Err(err) if err.is_unique_violation() => return Err(CoreError::DuplicateVote),
                Err(err) => return Err(write_fault("append vote", err)),
            };
        let Some(row) = inserted else {
            return Err(explain_rejection(&mut tx, poll_id, option_id, now).await);
        };

        let touched = tally_db::votes::increment_option_count(&mut *tx, poll_id, option_id)
            .await
            .map_err(|e| write_fault("increment tally", e))?;
        if touched != 1 {
            return Err(write_fault(
                "increment tally",
                format!("expected 1 option row, touched {touched}"),
            ));
        }

        tx.commit()
            .await
            .map_err(|e| write_fault("commit vote", e))?;

        Ok(VoteRecord {
            id: row.id,
            poll_id: row.poll_id,
            option_id: row.option_id,
            identity: identity.clone(),
            created_at: row.created_at,
        })
    }
}

/// The guarded insert declined to write. Re-read inside the same
/// transaction to report why.
async fn explain_rejection(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    poll_id: i64,
    option_id: i64,
    now: DateTime<Utc>,
) -> CoreError {
    let poll = match tally_db::polls::get_poll(&mut **tx, poll_id).await {
        Ok(Some(poll)) => poll,
        Ok(None) => return CoreError::NotFound,
        Err(err) => return write_fault("reload poll", err),
    };
    let option = match tally_db::polls::get_option(&mut **tx, option_id).await {
        Ok(Some(option)) => option,
        Ok(None) => return CoreError::NotFound,
        Err(err) => return write_fault("reload option", err),
    };
    match check_eligibility(&poll, &option, false, now) {
        Err(reason) => reason.into(),
        Ok(()) => write_fault("append vote", "guard rejected an eligible vote"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultAggregator;
    use crate::test_support::{file_pool, memory_pool, seed_poll};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    fn tally(poll: &tally_models::poll::Poll) -> Vec<i64> {
        poll.options.iter().map(|o| o.vote_count).collect()
    }

    #[tokio::test]
    async fn best_color_scenario() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["Red", "Blue"], None).await;
        let blue = poll.options[1].id;
        let recorder = VoteRecorder::new(pool.clone());
        let results = ResultAggregator::new(pool);
        let voter = Identity::User(1);

        recorder.record_vote(poll.id, blue, &voter).await.unwrap();
        let after_first = results.compute_results(poll.id).await.unwrap();
        assert_eq!(tally(&after_first), vec![0, 1]);
        assert_eq!(after_first.total_votes, 1);

        let err = recorder.record_vote(poll.id, blue, &voter).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateVote));
        let after_second = results.compute_results(poll.id).await.unwrap();
        assert_eq!(tally(&after_second), vec![0, 1]);
        assert_eq!(after_second.total_votes, 1);
    }

    #[tokio::test]
    async fn duplicate_on_other_option_does_not_move_any_tally() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        let recorder = VoteRecorder::new(pool.clone());
        let voter = Identity::Address("198.51.100.7".to_string());

        recorder.record_vote(poll.id, poll.options[0].id, &voter).await.unwrap();
        let err = recorder
            .record_vote(poll.id, poll.options[1].id, &voter)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateVote));

        let audit = ResultAggregator::new(pool).audit(poll.id).await.unwrap();
        assert_eq!(audit.counted, 1);
        assert!(audit.is_consistent());
    }

    #[tokio::test]
    async fn expired_poll_rejects_votes() {
        let pool = memory_pool().await;
        let poll = seed_poll(
            &pool,
            1,
            &["A", "B"],
            Some(Utc::now() - ChronoDuration::minutes(1)),
        )
        .await;
        assert!(poll.is_active);
        let err = VoteRecorder::new(pool)
            .record_vote(poll.id, poll.options[0].id, &Identity::User(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PollInactiveOrExpired));
    }

    #[tokio::test]
    async fn inactive_poll_rejects_votes() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        sqlx::query("UPDATE polls SET is_active = 0 WHERE id = ?1")
            .bind(poll.id)
            .execute(&pool)
            .await
            .unwrap();
        let err = VoteRecorder::new(pool)
            .record_vote(poll.id, poll.options[0].id, &Identity::User(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PollInactiveOrExpired));
    }

    #[tokio::test]
    async fn option_from_another_poll_is_invalid() {
        let pool = memory_pool().await;
        let first = seed_poll(&pool, 1, &["A", "B"], None).await;
        let second = seed_poll(&pool, 1, &["C", "D"], None).await;
        let err = VoteRecorder::new(pool.clone())
            .record_vote(first.id, second.options[0].id, &Identity::User(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOption));
        assert_eq!(
            tally_db::votes::count_votes_for_poll(&pool, first.id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn missing_poll_or_option_is_not_found() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        let recorder = VoteRecorder::new(pool);
        assert!(matches!(
            recorder.record_vote(999, poll.options[0].id, &Identity::User(1)).await,
            Err(CoreError::NotFound)
        ));
        assert!(matches!(
            recorder.record_vote(poll.id, 999, &Identity::User(1)).await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn guarded_insert_explains_a_poll_closed_after_preflight() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        sqlx::query("UPDATE polls SET is_active = 0 WHERE id = ?1")
            .bind(poll.id)
            .execute(&pool)
            .await
            .unwrap();

        // Skip the pre-flight read to exercise the in-transaction guard.
        let err = VoteRecorder::new(pool.clone())
            .commit_vote(poll.id, poll.options[0].id, &Identity::User(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PollInactiveOrExpired));
        let audit = ResultAggregator::new(pool).audit(poll.id).await.unwrap();
        assert_eq!(audit, crate::results::TallyAudit { counted: 0, recorded: 0 });
    }

    #[tokio::test]
    async fn unique_index_backstops_a_missed_preflight() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        let recorder = VoteRecorder::new(pool.clone());
        let voter = Identity::User(8);

        recorder.commit_vote(poll.id, poll.options[0].id, &voter).await.unwrap();
        let err = recorder
            .commit_vote(poll.id, poll.options[0].id, &voter)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateVote));
        let audit = ResultAggregator::new(pool).audit(poll.id).await.unwrap();
        assert_eq!(audit.counted, 1);
        assert!(audit.is_consistent());
    }

    #[tokio::test]
    async fn user_and_public_votes_do_not_collide() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        let recorder = VoteRecorder::new(pool.clone());

        recorder
            .record_vote(poll.id, poll.options[0].id, &Identity::User(1))
            .await
            .unwrap();
        recorder
            .record_vote(poll.id, poll.options[0].id, &Identity::Address("127.0.0.1".into()))
            .await
            .unwrap();

        let results = ResultAggregator::new(pool).compute_results(poll.id).await.unwrap();
        assert_eq!(results.total_votes, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_votes_commit_exactly_once() {
        let (_dir, pool) = file_pool(8).await;
        let poll = seed_poll(&pool, 1, &["Red", "Blue"], None).await;
        let (poll_id, option_id) = (poll.id, poll.options[0].id);
        let recorder = Arc::new(VoteRecorder::new(pool.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let recorder = Arc::clone(&recorder);
            handles.push(tokio::spawn(async move {
                recorder
                    .record_vote(poll_id, option_id, &Identity::User(42))
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.expect("task") {
                Ok(_) => successes += 1,
                Err(CoreError::DuplicateVote) | Err(CoreError::TransactionFailure) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(successes, 1);

        let aggregator = ResultAggregator::new(pool);
        let results = aggregator.compute_results(poll.id).await.unwrap();
        assert_eq!(tally(&results), vec![1, 0]);
        assert!(aggregator.audit(poll.id).await.unwrap().is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_voters_keep_tally_consistent() {
        let (_dir, pool) = file_pool(8).await;
        let poll = seed_poll(&pool, 1, &["Red", "Blue"], None).await;
        let poll_id = poll.id;
        let recorder = Arc::new(VoteRecorder::new(pool.clone()));

        let mut handles = Vec::new();
        for user_id in 0..24_i64 {
            let recorder = Arc::clone(&recorder);
            let option_id = poll.options[(user_id % 2) as usize].id;
            handles.push(tokio::spawn(async move {
                recorder
                    .record_vote(poll_id, option_id, &Identity::User(user_id))
                    .await
            }));
        }
        let mut committed = 0_i64;
        for handle in handles {
            match handle.await.expect("task") {
                Ok(_) => committed += 1,
                Err(CoreError::TransactionFailure) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        let audit = ResultAggregator::new(pool).audit(poll.id).await.unwrap();
        assert_eq!(audit.recorded, committed);
        assert!(audit.is_consistent());
    }

    #[tokio::test]
    async fn elapsed_deadline_is_a_transaction_failure() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        let recorder = VoteRecorder::new(pool.clone()).with_deadline(Duration::ZERO);

        // Hold the only connection so the submission cannot make progress.
        let held = pool.acquire().await.unwrap();
        let err = recorder
            .record_vote(poll.id, poll.options[0].id, &Identity::User(1))
            .await
            .unwrap_err();
        drop(held);

        assert!(matches!(err, CoreError::TransactionFailure));
        let audit = ResultAggregator::new(pool).audit(poll.id).await.unwrap();
        assert_eq!(audit.recorded, 0);
    }

    #[tokio::test]
    async fn storage_fault_before_the_transaction_is_a_transaction_failure() {
        let pool = memory_pool().await;
        let poll = seed_poll(&pool, 1, &["A", "B"], None).await;
        let recorder = VoteRecorder::new(pool.clone());
        pool.close().await;

        let err = recorder
            .record_vote(poll.id, poll.options[0].id, &Identity::User(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TransactionFailure));
    }
}
