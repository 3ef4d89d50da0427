use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        common::ApiResponse,
        content::{ContentView, CreateContentRequest, UpdateContentRequest},
        mention::MentionLinkView,
    },
    error::AppError,
    mention::{ContentKind, ContentRef},
    services::{content_service, mention_service},
    state::SharedState,
};

/// News, comments and forum entries; mentions are stored as a side effect of writes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/content/{kind}", post(create_content))
        .route(
            "/content/{kind}/{id}",
            get(get_content).put(update_content).delete(delete_content),
        )
        .route("/content/{kind}/{id}/mentions", get(content_mentions))
}

/// Create content and store the mentions found in its body.
#[utoipa::path(
    post,
    path = "/content/{kind}",
    tag = "content",
    params(("kind" = ContentKind, Path, description = "Kind of content to create")),
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Content created", body = ContentView),
        (status = 400, description = "Unknown author or parent")
    )
)]
pub async fn create_content(
    State(state): State<SharedState>,
    Path(kind): Path<ContentKind>,
    Valid(Json(payload)): Valid<Json<CreateContentRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<ContentView>>), AppError> {
    let view = content_service::create_content(&state, kind, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// Fetch content with resolved mentions rendered as links.
#[utoipa::path(
    get,
    path = "/content/{kind}/{id}",
    tag = "content",
    params(
        ("kind" = ContentKind, Path, description = "Kind of content"),
        ("id" = i64, Path, description = "Content identifier")
    ),
    responses(
        (status = 200, description = "Rendered content", body = ContentView),
        (status = 404, description = "Unknown content")
    )
)]
pub async fn get_content(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(ContentKind, i64)>,
) -> Result<Json<ApiResponse<ContentView>>, AppError> {
    let view = content_service::get_content(&state, ContentRef::new(kind, id)).await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// Edit content and re-synchronise its mentions.
#[utoipa::path(
    put,
    path = "/content/{kind}/{id}",
    tag = "content",
    params(
        ("kind" = ContentKind, Path, description = "Kind of content"),
        ("id" = i64, Path, description = "Content identifier")
    ),
    request_body = UpdateContentRequest,
    responses(
        (status = 200, description = "Content updated", body = ContentView),
        (status = 404, description = "Unknown content")
    )
)]
pub async fn update_content(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(ContentKind, i64)>,
    Valid(Json(payload)): Valid<Json<UpdateContentRequest>>,
) -> Result<Json<ApiResponse<ContentView>>, AppError> {
    let view = content_service::update_content(&state, ContentRef::new(kind, id), payload).await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// Delete content together with its mentions.
#[utoipa::path(
    delete,
    path = "/content/{kind}/{id}",
    tag = "content",
    params(
        ("kind" = ContentKind, Path, description = "Kind of content"),
        ("id" = i64, Path, description = "Content identifier")
    ),
    responses(
        (status = 204, description = "Content deleted"),
        (status = 404, description = "Unknown content")
    )
)]
pub async fn delete_content(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(ContentKind, i64)>,
) -> Result<StatusCode, AppError> {
    content_service::delete_content(&state, ContentRef::new(kind, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resolved mention links of one content item.
#[utoipa::path(
    get,
    path = "/content/{kind}/{id}/mentions",
    tag = "mentions",
    params(
        ("kind" = ContentKind, Path, description = "Kind of content"),
        ("id" = i64, Path, description = "Content identifier")
    ),
    responses(
        (status = 200, description = "Mention links", body = [MentionLinkView]),
        (status = 404, description = "Unknown content")
    )
)]
pub async fn content_mentions(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(ContentKind, i64)>,
) -> Result<Json<ApiResponse<Vec<MentionLinkView>>>, AppError> {
    let links = mention_service::content_mentions(&state, ContentRef::new(kind, id)).await?;
    Ok(Json(ApiResponse::ok(links)))
}
