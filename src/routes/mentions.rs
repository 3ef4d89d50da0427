use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        common::ApiResponse,
        mention::{
            PopularQuery, PreviewRequest, PreviewView, ReadReceipt, SearchQuery, SuggestionView,
        },
    },
    error::AppError,
    services::{mention_service, search_service},
    state::SharedState,
};

/// Mention autocomplete, preview and read receipts.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/mentions/search", get(search))
        .route("/mentions/popular", get(popular))
        .route("/mentions/preview", post(preview))
        .route("/mentions/{id}/read", patch(mark_read))
}

/// Autocomplete directory entities for the text typed after `@`.
#[utoipa::path(
    get,
    path = "/mentions/search",
    tag = "mentions",
    params(SearchQuery),
    responses((status = 200, description = "Suggestions", body = [SuggestionView]))
)]
pub async fn search(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<SearchQuery>>,
) -> Result<Json<ApiResponse<Vec<SuggestionView>>>, AppError> {
    let results = search_service::search(&state, query).await?;
    Ok(Json(ApiResponse::ok(results)))
}

/// Entities mentioned most over the popularity window.
#[utoipa::path(
    get,
    path = "/mentions/popular",
    tag = "mentions",
    params(PopularQuery),
    responses((status = 200, description = "Popular entities", body = [SuggestionView]))
)]
pub async fn popular(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<PopularQuery>>,
) -> Result<Json<ApiResponse<Vec<SuggestionView>>>, AppError> {
    let results = search_service::popular(&state, query.limit).await?;
    Ok(Json(ApiResponse::ok(results)))
}

/// Extract, resolve and render text without storing anything.
#[utoipa::path(
    post,
    path = "/mentions/preview",
    tag = "mentions",
    request_body = PreviewRequest,
    responses((status = 200, description = "Preview", body = PreviewView))
)]
pub async fn preview(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PreviewRequest>>,
) -> Result<Json<ApiResponse<PreviewView>>, AppError> {
    let view = mention_service::preview(&state, &payload.text).await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// Mark a mention as read.
#[utoipa::path(
    patch,
    path = "/mentions/{id}/read",
    tag = "mentions",
    params(("id" = i64, Path, description = "Mention identifier")),
    responses(
        (status = 200, description = "Mention marked read", body = ReadReceipt),
        (status = 404, description = "Unknown mention")
    )
)]
pub async fn mark_read(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ReadReceipt>>, AppError> {
    let receipt = mention_service::mark_read(&state, id).await?;
    Ok(Json(ApiResponse::ok(receipt)))
}
