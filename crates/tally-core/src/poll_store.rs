use crate::error::{write_fault, CoreError};
use crate::results::{poll_from_row, poll_from_snapshot};
use chrono::{Datelike, Utc};
use tally_db::polls::{NewPoll, OwnedWrite};
use tally_db::DbPool;
use tally_models::poll::{CreatePollRequest, Poll};

const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 20;
const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_OPTION_LEN: usize = 200;
/// Stored timestamps compare as text, which only orders four-digit years.
const MAX_EXPIRY_YEAR: i32 = 9999;

/// Poll metadata CRUD. Multi-row writes run in one transaction each.
#[derive(Clone)]
pub struct PollStore {
    db: DbPool,
}

struct ValidatedPoll {
    title: String,
    description: String,
    options: Vec<String>,
}

fn validate_create_request(req: &CreatePollRequest) -> Result<ValidatedPoll, CoreError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(CoreError::InvalidInput("Title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::InvalidInput(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }

    let description = req.description.as_deref().unwrap_or("").trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(CoreError::InvalidInput(format!(
            "Description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }

    if let Some(expires_at) = req.expires_at {
        if expires_at.year() > MAX_EXPIRY_YEAR {
            return Err(CoreError::InvalidInput(format!(
                "Expiry must be no later than the year {MAX_EXPIRY_YEAR}"
            )));
        }
    }

    if req.options.len() < MIN_OPTIONS {
        return Err(CoreError::InvalidInput(format!(
            "A poll needs at least {MIN_OPTIONS} options"
        )));
    }
    if req.options.len() > MAX_OPTIONS {
        return Err(CoreError::InvalidInput(format!(
            "A poll can have at most {MAX_OPTIONS} options"
        )));
    }
    let mut options = Vec::with_capacity(req.options.len());
    for raw in &req.options {
        let text = raw.trim();
        if text.is_empty() || text.chars().count() > MAX_OPTION_LEN {
            return Err(CoreError::InvalidInput(format!(
                "Option text must be between 1 and {MAX_OPTION_LEN} characters"
            )));
        }
        options.push(text.to_string());
    }

    Ok(ValidatedPoll {
        title: title.to_string(),
        description: description.to_string(),
        options,
    })
}

impl PollStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn create_poll(
        &self,
        creator_id: i64,
        req: &CreatePollRequest,
    ) -> Result<Poll, CoreError> {
        let validated = validate_create_request(req)?;
        let now = Utc::now();
        let snapshot = tally_db::polls::create_poll(
            &self.db,
            NewPoll {
                title: &validated.title,
                description: &validated.description,
                creator_id,
                expires_at: req.expires_at,
                options: &validated.options,
                created_at: now,
            },
        )
        .await
        .map_err(|e| write_fault("create poll", e))?;

        tracing::info!(
            poll_id = snapshot.poll.id,
            creator_id,
            options = snapshot.options.len(),
            "poll created"
        );
        Ok(poll_from_snapshot(snapshot, now))
    }

    pub async fn get_poll(&self, poll_id: i64) -> Result<Poll, CoreError> {
        let snapshot = tally_db::polls::get_poll_snapshot(&self.db, poll_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        Ok(poll_from_snapshot(snapshot, Utc::now()))
    }

    /// Newest first, each annotated with its total. Options are omitted.
    pub async fn list_polls_by_creator(&self, creator_id: i64) -> Result<Vec<Poll>, CoreError> {
        let now = Utc::now();
        let rows = tally_db::polls::list_polls_by_creator(&self.db, creator_id).await?;
        Ok(rows
            .into_iter()
            .map(|summary| poll_from_row(summary.poll, Vec::new(), summary.total_votes, now))
            .collect())
    }

    /// Removes the poll, its options and every ledger row, or nothing.
    pub async fn delete_poll(&self, poll_id: i64, requester_id: i64) -> Result<(), CoreError> {
        let outcome = tally_db::polls::delete_poll_owned(&self.db, poll_id, requester_id)
            .await
            .map_err(|e| write_fault("delete poll", e))?;
        match outcome {
            OwnedWrite::Done(()) => {
                tracing::info!(poll_id, requester_id, "poll deleted");
                Ok(())
            }
            OwnedWrite::NotFound => Err(CoreError::NotFound),
            OwnedWrite::NotOwner => Err(CoreError::PermissionDenied),
        }
    }

    /// Close or reopen a poll. Creator only.
    pub async fn set_poll_active(
        &self,
        poll_id: i64,
        requester_id: i64,
        is_active: bool,
    ) -> Result<Poll, CoreError> {
        let outcome =
            tally_db::polls::set_poll_active_owned(&self.db, poll_id, requester_id, is_active)
                .await
                .map_err(|e| write_fault("set poll active", e))?;
        match outcome {
            OwnedWrite::Done(_) => {
                tracing::info!(poll_id, is_active, "poll activity changed");
                self.get_poll(poll_id).await
            }
            OwnedWrite::NotFound => Err(CoreError::NotFound),
            OwnedWrite::NotOwner => Err(CoreError::PermissionDenied),
        }
    }
}
