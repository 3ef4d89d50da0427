//! Requests and views of the users, teams and players directory.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{DirectoryEntity, UserStatus},
    dto::{format_system_time, validation::validate_handle},
    mention::EntityKind,
};

/// Payload registering a platform user.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(custom(function = "validate_handle"))]
    pub name: String,
    #[validate(url)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
}

/// Payload registering an esports team.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateTeamRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Tag written in `@team:` tokens.
    #[validate(custom(function = "validate_handle"))]
    pub short_name: String,
    #[validate(url)]
    pub logo: Option<String>,
    #[validate(length(max = 64))]
    pub region: Option<String>,
}

/// Payload registering a professional player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreatePlayerRequest {
    /// In-game name written in `@player:` tokens.
    #[validate(custom(function = "validate_handle"))]
    pub username: String,
    #[validate(length(min = 1, max = 255))]
    pub real_name: Option<String>,
    #[validate(url)]
    pub avatar: Option<String>,
    #[validate(length(max = 64))]
    pub role: Option<String>,
    pub team_id: Option<i64>,
}

/// Public projection of any directory row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntityView {
    pub kind: EntityKind,
    pub id: i64,
    pub handle: String,
    pub display_name: String,
    pub avatar: Option<String>,
    /// Token that mentions this entity.
    pub mention_text: String,
    /// Canonical profile URL.
    pub url: String,
    pub created_at: String,
}

impl EntityView {
    pub fn from_entity(entity: &DirectoryEntity, base_url: &str) -> Self {
        let target = entity.target();
        Self {
            kind: target.kind,
            id: target.id,
            handle: entity.handle().to_owned(),
            display_name: entity.display_name().to_owned(),
            avatar: entity.avatar().map(str::to_owned),
            mention_text: target.kind.mention_text(entity.handle()),
            url: format!("{base_url}{}", target.profile_path()),
            created_at: format_system_time(entity.created_at()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::TeamEntity;

    #[test]
    fn team_view_mentions_the_short_name() {
        let team = DirectoryEntity::Team(TeamEntity {
            id: 4,
            name: "Team SoloMid".into(),
            short_name: "tsm".into(),
            logo: None,
            region: Some("NA".into()),
            created_at: SystemTime::UNIX_EPOCH,
        });

        let view = EntityView::from_entity(&team, "https://esports.example");
        assert_eq!(view.mention_text, "@team:tsm");
        assert_eq!(view.display_name, "Team SoloMid");
        assert_eq!(view.url, "https://esports.example/teams/4");
        assert_eq!(view.created_at, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn handles_with_punctuation_are_rejected() {
        let request = CreateTeamRequest {
            name: "Cloud9".into(),
            short_name: "c9!".into(),
            logo: None,
            region: None,
        };
        assert!(request.validate().is_err());
    }
}
