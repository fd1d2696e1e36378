use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use printforge_core::UserId;

use crate::event::Event;

/// Outbound notification derived from a committed domain event.
///
/// Formatting for a concrete channel (webhook, email, push) happens outside the
/// core; this only carries the facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    /// Event name, e.g. "generation.job.completed".
    pub topic: String,
    pub event_version: u32,
    /// User the notification concerns.
    pub user_id: UserId,
    /// Order id, job id, ...
    pub subject_id: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl Notification {
    /// Build a notification from a typed event.
    ///
    /// Serialization failures degrade to a `null` payload: a notification must
    /// never be the reason a committed transition fails.
    pub fn from_event<E>(user_id: UserId, subject_id: impl Into<String>, event: &E) -> Self
    where
        E: Event + Serialize,
    {
        Self {
            notification_id: Uuid::now_v7(),
            topic: event.event_type().to_string(),
            event_version: event.version(),
            user_id,
            subject_id: subject_id.into(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event).unwrap_or(JsonValue::Null),
        }
    }
}
