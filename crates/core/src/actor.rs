//! Who performed an action.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{AdminId, UserId};

/// The principal behind a state change or ledger mutation.
///
/// Recorded on order status changes (`changed_by`) and transaction records
/// (`actor`), so the audit trail always names a responsible party.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(UserId),
    Admin(AdminId),
    /// Automated workflow (orchestrator, compensation).
    System,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Actor::User(id) => Some(*id),
            _ => None,
        }
    }

    /// Fail unless the actor is an admin.
    pub fn require_admin(&self) -> Result<AdminId, DomainError> {
        match self {
            Actor::Admin(id) => Ok(*id),
            other => Err(DomainError::permission_denied(format!(
                "{other} is not an admin"
            ))),
        }
    }

    /// Admins and the system may act on anything; users only on what they own.
    pub fn may_act_for(&self, owner: UserId) -> bool {
        match self {
            Actor::User(id) => *id == owner,
            Actor::Admin(_) | Actor::System => true,
        }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{id}"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}
