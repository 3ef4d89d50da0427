//! Requests and views of the mention endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::{MentionCounts, MentionEntity},
    dto::{directory::EntityView, format_system_time},
    error::ServiceError,
    mention::{ContentKind, ContentRef, EntityKind, EntityRef, MentionLink, Token},
};

/// Resolved token of a piece of content.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MentionLinkView {
    pub mention_text: String,
    pub target: EntityRef,
    pub display_name: String,
    /// Canonical profile URL of the target.
    pub url: String,
}

impl MentionLinkView {
    pub fn from_link(link: &MentionLink, base_url: &str) -> Self {
        Self {
            mention_text: link.mention_text.clone(),
            target: link.target,
            display_name: link.display_name.clone(),
            url: format!("{base_url}{}", link.target.profile_path()),
        }
    }
}

/// Author of the content holding a mention.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthorView {
    pub id: i64,
    /// `"Unknown"` when the user no longer exists.
    pub name: String,
}

/// Short description of the content holding a mention.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ContentSummary {
    pub kind: ContentKind,
    pub id: i64,
    pub title: String,
    pub url: String,
}

/// One row of an entity's mention feed.
#[derive(Debug, Serialize, ToSchema)]
pub struct MentionView {
    pub id: i64,
    pub mentionable: ContentRef,
    pub mentioned: EntityRef,
    pub mention_text: String,
    pub context: Option<String>,
    pub is_read: bool,
    pub mentioned_at: String,
    pub author: AuthorView,
    /// `null` when the owning content is gone.
    pub content: Option<ContentSummary>,
}

impl MentionView {
    pub fn new(mention: &MentionEntity, author: AuthorView, content: Option<ContentSummary>) -> Self {
        Self {
            id: mention.id,
            mentionable: mention.mentionable,
            mentioned: mention.mentioned,
            mention_text: mention.mention_text.clone(),
            context: mention.context.clone(),
            is_read: mention.is_read,
            mentioned_at: format_system_time(mention.mentioned_at),
            author,
            content,
        }
    }
}

/// Total and unread mentions of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct MentionCountsView {
    pub target: EntityRef,
    pub total: u64,
    pub unread: u64,
}

impl MentionCountsView {
    pub fn new(target: EntityRef, counts: MentionCounts) -> Self {
        Self {
            target,
            total: counts.total,
            unread: counts.unread,
        }
    }
}

/// Acknowledgement of `PATCH /mentions/{id}/read`.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ReadReceipt {
    pub id: i64,
    pub is_read: bool,
}

/// Directory kinds an autocomplete query covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    #[default]
    All,
    User,
    Team,
    Player,
}

impl SearchKind {
    /// Directory tables to query, in display order.
    pub fn kinds(self) -> Vec<EntityKind> {
        match self {
            SearchKind::All => EntityKind::ALL.to_vec(),
            SearchKind::User => vec![EntityKind::User],
            SearchKind::Team => vec![EntityKind::Team],
            SearchKind::Player => vec![EntityKind::Player],
        }
    }
}

/// `GET /mentions/search` query string.
#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
pub struct SearchQuery {
    /// Text typed after `@`; empty falls back to popular entities.
    #[serde(default)]
    #[validate(length(max = 100))]
    pub q: String,
    /// `all`, `user`, `team` or `player`.
    #[serde(default, rename = "type")]
    pub kind: SearchKind,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

/// `GET /mentions/popular` query string.
#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
pub struct PopularQuery {
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

/// Autocomplete entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SuggestionView {
    #[serde(flatten)]
    pub entity: EntityView,
    /// Mentions inside the popularity window, for popular suggestions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention_count: Option<u64>,
}

/// Text to run through extraction, resolution and rendering without storing anything.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PreviewRequest {
    #[validate(length(min = 1, max = 20000))]
    pub text: String,
}

/// Extracted token with the entity it resolved to, if any.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenView {
    pub raw: String,
    pub kind: EntityKind,
    pub identifier: String,
    /// Byte offset of `@` in the text.
    pub offset: usize,
    pub resolved: Option<EntityRef>,
}

impl TokenView {
    pub fn new(token: &Token, resolved: Option<EntityRef>) -> Self {
        Self {
            raw: token.raw.clone(),
            kind: token.kind,
            identifier: token.identifier.clone(),
            offset: token.offset,
            resolved,
        }
    }
}

/// Result of a mention preview.
#[derive(Debug, Serialize, ToSchema)]
pub struct PreviewView {
    /// Every token in text order, duplicates included.
    pub tokens: Vec<TokenView>,
    /// Distinct resolved targets.
    pub links: Vec<MentionLinkView>,
    pub rendered: String,
}

/// `GET /sse/mentions` query string; `kind` and `id` narrow the stream to one entity.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SseQuery {
    pub kind: Option<EntityKind>,
    pub id: Option<i64>,
}

impl SseQuery {
    /// Target filter; `kind` and `id` must be given together.
    pub fn target(&self) -> Result<Option<EntityRef>, ServiceError> {
        match (self.kind, self.id) {
            (Some(kind), Some(id)) => Ok(Some(EntityRef::new(kind, id))),
            (None, None) => Ok(None),
            _ => Err(ServiceError::InvalidInput(
                "`kind` and `id` must be provided together".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_type_defaults_to_all() {
        let query: SearchQuery = serde_json::from_str(r#"{"q":"ts"}"#).unwrap();
        assert_eq!(query.kind, SearchKind::All);
        assert_eq!(query.kind.kinds().len(), 3);

        let query: SearchQuery = serde_json::from_str(r#"{"q":"ts","type":"team"}"#).unwrap();
        assert_eq!(query.kind.kinds(), vec![EntityKind::Team]);
    }

    #[test]
    fn sse_filter_needs_both_parts() {
        let full = SseQuery {
            kind: Some(EntityKind::Player),
            id: Some(3),
        };
        assert_eq!(
            full.target().unwrap(),
            Some(EntityRef::new(EntityKind::Player, 3))
        );
        assert_eq!(SseQuery::default().target().unwrap(), None);

        let partial = SseQuery {
            kind: None,
            id: Some(3),
        };
        assert!(partial.target().is_err());
    }

    #[test]
    fn search_limit_is_bounded() {
        let query = SearchQuery {
            limit: Some(51),
            ..SearchQuery::default()
        };
        assert!(query.validate().is_err());
    }
}
