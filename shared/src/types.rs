//! Actor and role types shared across the wire protocol and the server

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connected-party role
///
/// Every authenticated session carries exactly one role; the broadcaster
/// auto-joins each session to its role channel at connect time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Restaurant,
    Partner,
    Operator,
}

impl Role {
    /// Channel-name segment for this role (`role:{segment}`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Restaurant => "restaurant",
            Role::Partner => "partner",
            Role::Operator => "operator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who requested a state transition
///
/// Recorded on every transition for audit purposes; operator actors may
/// additionally use the override path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    /// Subject id (customer/restaurant/partner/operator id)
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            role: Role::Operator,
        }
    }
}
