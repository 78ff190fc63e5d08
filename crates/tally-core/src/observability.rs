use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

const REASON_FALLBACK: &str = "OTHER";
const MAX_REASON_LEN: usize = 64;
const MAX_REASON_KEYS: usize = 32;

static VOTES_COMMITTED: AtomicU64 = AtomicU64::new(0);
static UNITS_ABORTED: AtomicU64 = AtomicU64::new(0);
static VOTES_REJECTED_BY_REASON: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

fn rejected_by_reason() -> &'static Mutex<HashMap<String, u64>> {
    VOTES_REJECTED_BY_REASON.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_rejected_by_reason() -> std::sync::MutexGuard<'static, HashMap<String, u64>> {
    match rejected_by_reason().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn normalize_reason(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_REASON_LEN {
        return REASON_FALLBACK.to_string();
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
    {
        return REASON_FALLBACK.to_string();
    }
    trimmed.to_string()
}

pub fn vote_committed() {
    VOTES_COMMITTED.fetch_add(1, Ordering::Relaxed);
}

pub fn unit_of_work_aborted() {
    UNITS_ABORTED.fetch_add(1, Ordering::Relaxed);
}

pub fn vote_rejected(reason: &str) {
    let mut normalized = normalize_reason(reason);
    let mut by_reason = lock_rejected_by_reason();
    if !by_reason.contains_key(&normalized) && by_reason.len() >= MAX_REASON_KEYS {
        normalized = REASON_FALLBACK.to_string();
    }
    let entry = by_reason.entry(normalized).or_insert(0);
    *entry = entry.saturating_add(1);
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct VoteMetricsSnapshot {
    pub votes_committed: u64,
    pub units_aborted: u64,
    pub votes_rejected: Vec<(String, u64)>,
}

pub fn vote_metrics_snapshot() -> VoteMetricsSnapshot {
    let mut votes_rejected: Vec<(String, u64)> = lock_rejected_by_reason()
        .iter()
        .map(|(reason, count)| (reason.clone(), *count))
        .collect();
    votes_rejected.sort_by(|a, b| a.0.cmp(&b.0));

    VoteMetricsSnapshot {
        votes_committed: VOTES_COMMITTED.load(Ordering::Relaxed),
        units_aborted: UNITS_ABORTED.load(Ordering::Relaxed),
        votes_rejected,
    }
}
