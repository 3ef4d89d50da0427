use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the esports mention service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::mention_stream,
        crate::routes::directory::create_user,
        crate::routes::directory::create_team,
        crate::routes::directory::create_player,
        crate::routes::directory::get_user,
        crate::routes::directory::get_team,
        crate::routes::directory::get_player,
        crate::routes::directory::user_mentions,
        crate::routes::directory::team_mentions,
        crate::routes::directory::player_mentions,
        crate::routes::directory::user_mention_counts,
        crate::routes::directory::team_mention_counts,
        crate::routes::directory::player_mention_counts,
        crate::routes::content::create_content,
        crate::routes::content::get_content,
        crate::routes::content::update_content,
        crate::routes::content::delete_content,
        crate::routes::content::content_mentions,
        crate::routes::mentions::search,
        crate::routes::mentions::popular,
        crate::routes::mentions::preview,
        crate::routes::mentions::mark_read,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::Pagination,
            crate::dto::directory::CreateUserRequest,
            crate::dto::directory::CreateTeamRequest,
            crate::dto::directory::CreatePlayerRequest,
            crate::dto::directory::EntityView,
            crate::dto::content::CreateContentRequest,
            crate::dto::content::UpdateContentRequest,
            crate::dto::content::ContentView,
            crate::dto::mention::MentionView,
            crate::dto::mention::MentionCountsView,
            crate::dto::mention::MentionLinkView,
            crate::dto::mention::SuggestionView,
            crate::dto::mention::PreviewRequest,
            crate::dto::mention::PreviewView,
            crate::dto::mention::ReadReceipt,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::MentionEvent,
            crate::dao::models::UserStatus,
            crate::mention::EntityKind,
            crate::mention::EntityRef,
            crate::mention::ContentKind,
            crate::mention::ContentRef,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "directory", description = "Users, teams and players that can be mentioned"),
        (name = "content", description = "News, comments and forum entries containing mentions"),
        (name = "mentions", description = "Mention feeds, autocomplete and previews"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse/mentions",
            "/users/{id}/mentions",
            "/content/{kind}/{id}",
            "/mentions/{id}/read",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
