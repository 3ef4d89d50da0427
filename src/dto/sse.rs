use serde::Serialize;
use utoipa::ToSchema;

use crate::mention::{ContentRef, EntityRef};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
    /// Entity the event concerns; filtered streams skip events about other targets.
    pub target: Option<EntityRef>,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            id: None,
            data: serde_json::to_string(payload)?,
            target: None,
        })
    }

    /// Attach an SSE event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Scope the event to one mentioned entity.
    pub fn about(mut self, target: EntityRef) -> Self {
        self.target = Some(target);
        self
    }

    /// Whether a subscriber filtering on `filter` should receive this event.
    pub fn matches(&self, filter: Option<EntityRef>) -> bool {
        match (filter, self.target) {
            (None, _) | (_, None) => true,
            (Some(wanted), Some(target)) => wanted == target,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    /// Entity the stream is filtered on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<EntityRef>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Broadcast for every newly stored mention.
pub struct MentionEvent {
    /// Stored mention id.
    pub mention_id: i64,
    /// Entity that was mentioned.
    pub mentioned: EntityRef,
    /// Content containing the mention.
    pub mentionable: ContentRef,
    /// Author of the content.
    pub author_id: i64,
    /// Token as written.
    pub mention_text: String,
    /// Text around the token.
    pub context: Option<String>,
    /// RFC 3339 timestamp.
    pub mentioned_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mention::EntityKind;

    #[test]
    fn unscoped_events_reach_every_subscriber() {
        let team = EntityRef::new(EntityKind::Team, 1);
        let other = EntityRef::new(EntityKind::Team, 2);
        let event = ServerEvent::json(Some("status".to_string()), &SystemStatus { degraded: false })
            .unwrap();
        assert!(event.matches(None));
        assert!(event.matches(Some(team)));

        let scoped = event.about(team);
        assert!(scoped.matches(Some(team)));
        assert!(!scoped.matches(Some(other)));
        assert!(scoped.matches(None));
    }
}
