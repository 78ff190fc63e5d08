use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is casting a vote. Authenticated and public submissions live in
/// separate deduplication namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identity {
    User(i64),
    Address(String),
}

impl Identity {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::User(id) => Some(*id),
            Identity::Address(_) => None,
        }
    }

    pub fn ip_address(&self) -> Option<&str> {
        match self {
            Identity::User(_) => None,
            Identity::Address(addr) => Some(addr.as_str()),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => write!(f, "user:{id}"),
            Identity::Address(addr) => write!(f, "ip:{addr}"),
        }
    }
}
