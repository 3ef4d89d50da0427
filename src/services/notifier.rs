use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::MentionEntity,
    dto::{
        format_system_time,
        sse::{MentionEvent, ServerEvent},
    },
    state::SharedState,
};

pub(crate) const EVENT_MENTION: &str = "mention";

/// Message emitted by the resolver for every newly stored mention.
#[derive(Debug, Clone)]
pub struct MentionNotification {
    /// Row that was just inserted.
    pub mention: MentionEntity,
}

/// Queue a notification without waiting. A full or closed channel drops it with a warning.
pub fn enqueue(state: &SharedState, mention: &MentionEntity) -> bool {
    let notification = MentionNotification {
        mention: mention.clone(),
    };
    match state.notifications().try_send(notification) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            warn!(
                mention_id = dropped.mention.id,
                "notification channel full; dropping mention notification"
            );
            false
        }
        Err(TrySendError::Closed(dropped)) => {
            warn!(
                mention_id = dropped.mention.id,
                "notifier stopped; dropping mention notification"
            );
            false
        }
    }
}

/// Drain the notification channel until every sender is gone.
pub async fn run(state: SharedState, mut receiver: mpsc::Receiver<MentionNotification>) {
    while let Some(notification) = receiver.recv().await {
        dispatch(&state, &notification.mention);
    }
    info!("notification channel closed; notifier stopped");
}

fn dispatch(state: &SharedState, mention: &MentionEntity) {
    info!(
        mention_id = mention.id,
        mentioned = %mention.mentioned,
        mentionable = %mention.mentionable,
        author_id = mention.author_id,
        "new mention"
    );

    let payload = MentionEvent {
        mention_id: mention.id,
        mentioned: mention.mentioned,
        mentionable: mention.mentionable,
        author_id: mention.author_id,
        mention_text: mention.mention_text.clone(),
        context: mention.context.clone(),
        mentioned_at: format_system_time(mention.mentioned_at),
    };

    match ServerEvent::json(Some(EVENT_MENTION.to_string()), &payload) {
        Ok(event) => state.mention_sse().broadcast(
            event
                .with_id(Uuid::new_v4().to_string())
                .about(mention.mentioned),
        ),
        Err(err) => warn!(error = %err, "failed to serialise mention event"),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::store::memory::MemoryStore,
        mention::{ContentKind, ContentRef, EntityKind, EntityRef},
        state::AppState,
    };

    fn mention(id: i64) -> MentionEntity {
        MentionEntity {
            id,
            mentionable: ContentRef::new(ContentKind::ForumPost, 3),
            mentioned: EntityRef::new(EntityKind::Player, 8),
            author_id: 1,
            mention_text: "@player:shroud".into(),
            context: Some("gg @player:shroud".into()),
            is_read: false,
            mentioned_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn notifications_are_broadcast_as_mention_events() {
        let (state, receiver) =
            AppState::with_store(AppConfig::default(), Arc::new(MemoryStore::new())).await;
        let mut events = state.mention_sse().subscribe();
        tokio::spawn(run(state.clone(), receiver));

        assert!(enqueue(&state, &mention(5)));

        let event = events.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_MENTION));
        assert!(event.id.is_some());
        assert_eq!(event.target, Some(EntityRef::new(EntityKind::Player, 8)));
        let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(body["mention_id"], 5);
        assert_eq!(body["mentioned"]["kind"], "player");
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let mut config = AppConfig::default();
        config.mentions.notification_buffer = 1;
        let (state, _receiver) = AppState::new(config);

        assert!(enqueue(&state, &mention(1)));
        assert!(!enqueue(&state, &mention(2)));
    }
}
