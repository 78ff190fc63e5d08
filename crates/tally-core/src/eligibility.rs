//! Pure vote-gating rules. Advisory only: two concurrent callers can both
//! pass these checks, so the ledger's unique indexes have the final say.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use tally_db::polls::{PollOptionRow, PollRow};
use tally_models::poll::PollStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    PollInactiveOrExpired,
    InvalidOption,
    DuplicateVote,
}

impl From<Ineligible> for CoreError {
    fn from(reason: Ineligible) -> Self {
        match reason {
            Ineligible::PollInactiveOrExpired => CoreError::PollInactiveOrExpired,
            Ineligible::InvalidOption => CoreError::InvalidOption,
            Ineligible::DuplicateVote => CoreError::DuplicateVote,
        }
    }
}

pub fn poll_status(poll: &PollRow, now: DateTime<Utc>) -> PollStatus {
    PollStatus::derive(poll.is_active, poll.expires_at, now)
}

/// Checks run in order; the first failure wins.
pub fn check_eligibility(
    poll: &PollRow,
    option: &PollOptionRow,
    already_voted: bool,
    now: DateTime<Utc>,
) -> Result<(), Ineligible> {
    if !poll_status(poll, now).accepts_votes() {
        return Err(Ineligible::PollInactiveOrExpired);
    }
    if option.poll_id != poll.id {
        return Err(Ineligible::InvalidOption);
    }
    if already_voted {
        return Err(Ineligible::DuplicateVote);
    }
    Ok(())
}
