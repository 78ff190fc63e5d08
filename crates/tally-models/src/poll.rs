use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived lifecycle state of a poll. Never stored; recomputed on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Active,
    Inactive,
    Expired,
}

impl PollStatus {
    /// `expires_at == now` already counts as expired.
    pub fn derive(is_active: bool, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if !is_active {
            return PollStatus::Inactive;
        }
        match expires_at {
            Some(deadline) if deadline <= now => PollStatus::Expired,
            _ => PollStatus::Active,
        }
    }

    pub fn accepts_votes(self) -> bool {
        self == PollStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub creator_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub status: PollStatus,
    pub created_at: DateTime<Utc>,
    /// Empty in list responses.
    #[serde(default)]
    pub options: Vec<PollOption>,
    pub total_votes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: i64,
    pub text: String,
    pub vote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: i64,
    pub poll_id: i64,
    pub option_id: i64,
    pub identity: crate::identity::Identity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub options: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPollActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub poll_id: i64,
    pub option_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteAck {
    pub message: String,
    pub poll_id: i64,
    pub option_id: i64,
}
