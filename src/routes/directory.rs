use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        common::{ApiResponse, PageQuery, Paginated},
        directory::{CreatePlayerRequest, CreateTeamRequest, CreateUserRequest, EntityView},
        mention::{MentionCountsView, MentionView},
    },
    error::AppError,
    mention::{EntityKind, EntityRef},
    services::{directory_service, mention_service},
    state::SharedState,
};

/// Directory registration, profiles and per-entity mention feeds.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/mentions", get(user_mentions))
        .route("/users/{id}/mentions/counts", get(user_mention_counts))
        .route("/teams", post(create_team))
        .route("/teams/{id}", get(get_team))
        .route("/teams/{id}/mentions", get(team_mentions))
        .route("/teams/{id}/mentions/counts", get(team_mention_counts))
        .route("/players", post(create_player))
        .route("/players/{id}", get(get_player))
        .route("/players/{id}/mentions", get(player_mentions))
        .route("/players/{id}/mentions/counts", get(player_mention_counts))
}

type Created<T> = (StatusCode, Json<ApiResponse<T>>);

async fn entity(
    state: &SharedState,
    kind: EntityKind,
    id: i64,
) -> Result<Json<ApiResponse<EntityView>>, AppError> {
    let view = directory_service::get_entity(state, EntityRef::new(kind, id)).await?;
    Ok(Json(ApiResponse::ok(view)))
}

async fn mentions(
    state: &SharedState,
    kind: EntityKind,
    id: i64,
    query: PageQuery,
) -> Result<Json<Paginated<MentionView>>, AppError> {
    let page = query.resolve(&state.config().pagination);
    let feed = mention_service::list_mentions_of(state, EntityRef::new(kind, id), page).await?;
    Ok(Json(feed))
}

async fn counts(
    state: &SharedState,
    kind: EntityKind,
    id: i64,
) -> Result<Json<ApiResponse<MentionCountsView>>, AppError> {
    let counts = mention_service::mention_counts(state, EntityRef::new(kind, id)).await?;
    Ok(Json(ApiResponse::ok(counts)))
}

/// Register a platform user.
#[utoipa::path(
    post,
    path = "/users",
    tag = "directory",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User registered", body = EntityView),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn create_user(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateUserRequest>>,
) -> Result<Created<EntityView>, AppError> {
    let view = directory_service::register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// Register an esports team.
#[utoipa::path(
    post,
    path = "/teams",
    tag = "directory",
    request_body = CreateTeamRequest,
    responses(
        (status = 201, description = "Team registered", body = EntityView),
        (status = 409, description = "Name or tag already taken")
    )
)]
pub async fn create_team(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateTeamRequest>>,
) -> Result<Created<EntityView>, AppError> {
    let view = directory_service::register_team(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// Register a professional player.
#[utoipa::path(
    post,
    path = "/players",
    tag = "directory",
    request_body = CreatePlayerRequest,
    responses(
        (status = 201, description = "Player registered", body = EntityView),
        (status = 400, description = "Unknown team"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn create_player(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreatePlayerRequest>>,
) -> Result<Created<EntityView>, AppError> {
    let view = directory_service::register_player(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// Fetch a user profile.
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "directory",
    params(("id" = i64, Path, description = "User identifier")),
    responses(
        (status = 200, description = "User", body = EntityView),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<EntityView>>, AppError> {
    entity(&state, EntityKind::User, id).await
}

/// Fetch a team profile.
#[utoipa::path(
    get,
    path = "/teams/{id}",
    tag = "directory",
    params(("id" = i64, Path, description = "Team identifier")),
    responses(
        (status = 200, description = "Team", body = EntityView),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn get_team(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<EntityView>>, AppError> {
    entity(&state, EntityKind::Team, id).await
}

/// Fetch a player profile.
#[utoipa::path(
    get,
    path = "/players/{id}",
    tag = "directory",
    params(("id" = i64, Path, description = "Player identifier")),
    responses(
        (status = 200, description = "Player", body = EntityView),
        (status = 404, description = "Unknown player")
    )
)]
pub async fn get_player(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<EntityView>>, AppError> {
    entity(&state, EntityKind::Player, id).await
}

/// Newest mentions of a user.
#[utoipa::path(
    get,
    path = "/users/{id}/mentions",
    tag = "mentions",
    params(("id" = i64, Path, description = "User identifier"), PageQuery),
    responses((status = 200, description = "Paginated mentions", body = [MentionView]))
)]
pub async fn user_mentions(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Valid(Query(query)): Valid<Query<PageQuery>>,
) -> Result<Json<Paginated<MentionView>>, AppError> {
    mentions(&state, EntityKind::User, id, query).await
}

/// Newest mentions of a team.
#[utoipa::path(
    get,
    path = "/teams/{id}/mentions",
    tag = "mentions",
    params(("id" = i64, Path, description = "Team identifier"), PageQuery),
    responses((status = 200, description = "Paginated mentions", body = [MentionView]))
)]
pub async fn team_mentions(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Valid(Query(query)): Valid<Query<PageQuery>>,
) -> Result<Json<Paginated<MentionView>>, AppError> {
    mentions(&state, EntityKind::Team, id, query).await
}

/// Newest mentions of a player.
#[utoipa::path(
    get,
    path = "/players/{id}/mentions",
    tag = "mentions",
    params(("id" = i64, Path, description = "Player identifier"), PageQuery),
    responses((status = 200, description = "Paginated mentions", body = [MentionView]))
)]
pub async fn player_mentions(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Valid(Query(query)): Valid<Query<PageQuery>>,
) -> Result<Json<Paginated<MentionView>>, AppError> {
    mentions(&state, EntityKind::Player, id, query).await
}

/// Total and unread mentions of a user.
#[utoipa::path(
    get,
    path = "/users/{id}/mentions/counts",
    tag = "mentions",
    params(("id" = i64, Path, description = "User identifier")),
    responses((status = 200, description = "Mention counts", body = MentionCountsView))
)]
pub async fn user_mention_counts(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MentionCountsView>>, AppError> {
    counts(&state, EntityKind::User, id).await
}

/// Total and unread mentions of a team.
#[utoipa::path(
    get,
    path = "/teams/{id}/mentions/counts",
    tag = "mentions",
    params(("id" = i64, Path, description = "Team identifier")),
    responses((status = 200, description = "Mention counts", body = MentionCountsView))
)]
pub async fn team_mention_counts(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MentionCountsView>>, AppError> {
    counts(&state, EntityKind::Team, id).await
}

/// Total and unread mentions of a player.
#[utoipa::path(
    get,
    path = "/players/{id}/mentions/counts",
    tag = "mentions",
    params(("id" = i64, Path, description = "Player identifier")),
    responses((status = 200, description = "Mention counts", body = MentionCountsView))
)]
pub async fn player_mention_counts(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MentionCountsView>>, AppError> {
    counts(&state, EntityKind::Player, id).await
}
