use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::sse::{Handshake, ServerEvent, SystemStatus},
    mention::EntityRef,
    state::SharedState,
};

const STREAM_NAME: &str = "mentions";
const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Subscribe to the mention stream.
pub fn subscribe(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.mention_sse().subscribe()
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    if let Some(id) = payload.id {
        event = event.id(id);
    }
    event
}

/// Handshake sent to one client right after it connects.
pub fn handshake(state: &SharedState, target: Option<EntityRef>) -> Option<ServerEvent> {
    let message = match target {
        Some(target) => format!("Subscribed to mentions of {target}"),
        None => "Subscribed to all mentions".to_string(),
    };
    let payload = Handshake {
        stream: STREAM_NAME.to_string(),
        message,
        degraded: state.is_degraded(),
        target,
    };
    match ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to serialise SSE handshake");
            None
        }
    }
}

/// Convert a broadcast receiver into an SSE response, forwarding the events that match
/// `filter` until the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    first: Option<ServerEvent>,
    filter: Option<EntityRef>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        if let Some(first) = first
            && tx.send(Ok(to_event(first))).await.is_err()
        {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if !payload.matches(filter) {
                                continue;
                            }
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Skip lagged messages but keep the stream alive.
                            warn!(skipped, "mention SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        match filter {
            Some(target) => info!(target = %target, "mention SSE stream disconnected"),
            None => info!("mention SSE stream disconnected"),
        }
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Broadcast degraded-mode transitions to every connected client until the state is dropped.
pub async fn forward_system_status(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        match ServerEvent::json(
            Some(EVENT_SYSTEM_STATUS.to_string()),
            &SystemStatus { degraded },
        ) {
            Ok(event) => state.mention_sse().broadcast(event),
            Err(err) => warn!(error = %err, "failed to serialise system status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::store::memory::MemoryStore, mention::EntityKind, state::AppState,
    };

    #[tokio::test]
    async fn handshake_reports_filter_and_mode() {
        let (state, _rx) = AppState::new(AppConfig::default());
        let target = EntityRef::new(EntityKind::Team, 3);

        let event = handshake(&state, Some(target)).unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_HANDSHAKE));
        let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(body["degraded"], true);
        assert_eq!(body["target"]["kind"], "team");
        assert_eq!(body["target"]["id"], 3);
    }

    #[tokio::test]
    async fn degraded_transitions_reach_subscribers() {
        let (state, _rx) = AppState::new(AppConfig::default());
        let mut events = subscribe(&state);
        tokio::spawn(forward_system_status(state.clone()));
        tokio::task::yield_now().await;

        state.install_store(Arc::new(MemoryStore::new())).await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_SYSTEM_STATUS));
        let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(body["degraded"], false);
    }
}
