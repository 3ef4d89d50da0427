use std::convert::Infallible;

use axum::{
    Router,
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    dto::mention::SseQuery, error::AppError, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/mentions",
    tag = "sse",
    params(SseQuery),
    responses((status = 200, description = "Mention SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream newly stored mentions, optionally only those of one entity.
pub async fn mention_stream(
    State(state): State<SharedState>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let filter = query.target()?;
    let receiver = sse_service::subscribe(&state);
    match filter {
        Some(target) => info!(target = %target, "new filtered mention SSE connection"),
        None => info!("new mention SSE connection"),
    }
    let handshake = sse_service::handshake(&state, filter);
    Ok(sse_service::to_sse_stream(receiver, handshake, filter))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/mentions", get(mention_stream))
}
