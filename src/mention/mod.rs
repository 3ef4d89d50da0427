//! Mention tokens and the typed references they point to.
//!
//! A mention links a piece of content (the *mentionable* side, see [`ContentRef`]) to a
//! directory entity (the *mentioned* side, see [`EntityRef`]). Both sides are tagged
//! unions over a closed set of kinds so handling a new kind is a compile error until
//! every match is updated.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Token scanning over free text.
pub mod extractor;
/// Rewriting tokens into profile links.
pub mod renderer;

pub use extractor::{Token, extract_tokens, unique_tokens};
pub use renderer::{MentionLink, render_mentions};

/// Tag that names no known kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown kind `{0}`")]
pub struct UnknownKind(pub String);

/// Kinds of directory entities a token can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Registered platform user, mentioned as `@name`.
    User,
    /// Esports team, mentioned as `@team:slug`.
    Team,
    /// Professional player, mentioned as `@player:slug`.
    Player,
}

impl EntityKind {
    /// All kinds, in the order search results are grouped.
    pub const ALL: [EntityKind; 3] = [EntityKind::User, EntityKind::Team, EntityKind::Player];

    /// Lowercase tag used in JSON, CSS classes and storage keys.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Team => "team",
            EntityKind::Player => "player",
        }
    }

    /// Path segment of the canonical profile URL.
    pub fn path_segment(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Team => "teams",
            EntityKind::Player => "players",
        }
    }

    /// Prefix written before the identifier in a token (`@`, `@team:`, `@player:`).
    pub fn token_prefix(self) -> &'static str {
        match self {
            EntityKind::User => "@",
            EntityKind::Team => "@team:",
            EntityKind::Player => "@player:",
        }
    }

    /// Build the token that mentions `handle`.
    pub fn mention_text(self, handle: &str) -> String {
        format!("{}{handle}", self.token_prefix())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownKind(value.to_owned()))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polymorphic reference to a user, team or player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct EntityRef {
    /// Kind of the referenced entity.
    pub kind: EntityKind,
    /// Identifier inside the kind's table.
    pub id: i64,
}

impl EntityRef {
    /// Construct a reference.
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Canonical profile path, e.g. `/teams/3`.
    pub fn profile_path(&self) -> String {
        format!("/{}/{}", self.kind.path_segment(), self.id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Kinds of content that may contain mention tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// News article.
    News,
    /// Comment below a news article.
    NewsComment,
    /// Opening post of a forum thread.
    ForumThread,
    /// Reply inside a forum thread.
    ForumPost,
    /// Comment on a match page.
    MatchComment,
}

impl ContentKind {
    /// All kinds.
    pub const ALL: [ContentKind; 5] = [
        ContentKind::News,
        ContentKind::NewsComment,
        ContentKind::ForumThread,
        ContentKind::ForumPost,
        ContentKind::MatchComment,
    ];

    /// Lowercase tag used in JSON and storage keys.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::News => "news",
            ContentKind::NewsComment => "news_comment",
            ContentKind::ForumThread => "forum_thread",
            ContentKind::ForumPost => "forum_post",
            ContentKind::MatchComment => "match_comment",
        }
    }

    /// Content kind the `parent_id` must point at, if the parent is stored content.
    ///
    /// Match comments hang off matches, which live outside this service, so their
    /// parent is required but not checked.
    pub fn parent_kind(self) -> Option<ContentKind> {
        match self {
            ContentKind::NewsComment => Some(ContentKind::News),
            ContentKind::ForumPost => Some(ContentKind::ForumThread),
            ContentKind::News | ContentKind::ForumThread | ContentKind::MatchComment => None,
        }
    }

    /// Whether content of this kind must carry a `parent_id`.
    pub fn requires_parent(self) -> bool {
        matches!(
            self,
            ContentKind::NewsComment | ContentKind::ForumPost | ContentKind::MatchComment
        )
    }

    /// Human label used when the content has no title of its own.
    pub fn label(self) -> &'static str {
        match self {
            ContentKind::News => "News Article",
            ContentKind::NewsComment => "News Comment",
            ContentKind::ForumThread => "Forum Thread",
            ContentKind::ForumPost => "Forum Reply",
            ContentKind::MatchComment => "Match Comment",
        }
    }
}

impl FromStr for ContentKind {
    type Err = UnknownKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ContentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownKind(value.to_owned()))
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polymorphic reference to a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct ContentRef {
    /// Kind of the owning content.
    pub kind: ContentKind,
    /// Identifier of the owning content.
    pub id: i64,
}

impl ContentRef {
    /// Construct a reference.
    pub fn new(kind: ContentKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_paths_follow_kind() {
        assert_eq!(EntityRef::new(EntityKind::User, 7).profile_path(), "/users/7");
        assert_eq!(EntityRef::new(EntityKind::Team, 3).profile_path(), "/teams/3");
        assert_eq!(
            EntityRef::new(EntityKind::Player, 12).profile_path(),
            "/players/12"
        );
    }

    #[test]
    fn mention_text_uses_kind_prefix() {
        assert_eq!(EntityKind::User.mention_text("alice"), "@alice");
        assert_eq!(EntityKind::Team.mention_text("tsm"), "@team:tsm");
        assert_eq!(EntityKind::Player.mention_text("shroud"), "@player:shroud");
    }

    #[test]
    fn kinds_parse_from_their_tags() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
        assert_eq!("team".parse::<EntityKind>().unwrap(), EntityKind::Team);
        assert!("teams".parse::<EntityKind>().is_err());
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&ContentKind::MatchComment).unwrap(),
            "\"match_comment\""
        );
        let kind: EntityKind = serde_json::from_str("\"player\"").unwrap();
        assert_eq!(kind, EntityKind::Player);
    }
}
