pub mod auth;
pub mod eligibility;
pub mod error;
pub mod observability;
pub mod poll_store;
pub mod results;
pub mod vote_recorder;

use poll_store::PollStore;
use results::ResultAggregator;
use std::time::Duration;
use tally_db::DbPool;
use vote_recorder::VoteRecorder;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub polls: PollStore,
    pub votes: VoteRecorder,
    pub results: ResultAggregator,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    /// Take the public voter's address from `X-Forwarded-For` instead of the
    /// socket peer. Only safe behind a proxy that overwrites the header.
    pub trust_proxy: bool,
    /// Upper bound on a single vote submission. `None` waits for SQLite's
    /// busy timeout alone.
    pub vote_deadline: Option<Duration>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let mut votes = VoteRecorder::new(db.clone());
        if let Some(deadline) = config.vote_deadline {
            votes = votes.with_deadline(deadline);
        }
        Self {
            polls: PollStore::new(db.clone()),
            results: ResultAggregator::new(db.clone()),
            votes,
            db,
            config,
        }
    }
}
